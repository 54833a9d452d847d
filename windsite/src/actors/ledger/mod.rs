//! LedgerActor - single mutation authority for per-session progress records.
//!
//! One actor serializes every write to the `StreamingMessage` records, with
//! atomic persistence (temp + rename) so terminal records survive restart.
//! The ledger is a UX convenience layer, not the system of record for
//! results: callers treat write failures as best-effort (log and discard).
//!
//! ## Invariants
//!
//! - A record's `thought_steps` list only grows or has existing entries
//!   patched in place; entries are never removed.
//! - `response_complete` transitions false -> true exactly once per run;
//!   after that the record is frozen and repeat reads are identical.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use shared_types::{StreamingMessage, ThoughtStatus, ThoughtStep};
use tokio::fs;

#[derive(Debug, Default)]
pub struct LedgerActor;

#[derive(Debug, Clone)]
pub struct LedgerArguments {
    /// Directory holding one JSON snapshot per session.
    pub data_dir: PathBuf,
}

pub struct LedgerState {
    data_dir: PathBuf,
    sessions: HashMap<String, StreamingMessage>,
}

/// Patch applied to an existing thought step. `None` fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub status: Option<ThoughtStatus>,
    pub duration_ms: Option<u64>,
    pub result_summary: Option<String>,
}

#[derive(Debug)]
pub enum LedgerMsg {
    /// Start a fresh record for a session's new run.
    BeginRun {
        session_id: String,
        run_id: String,
        reply: RpcReplyPort<Result<(), LedgerError>>,
    },
    /// Append the next thought step; `step.index` must be the current length.
    AppendStep {
        session_id: String,
        step: ThoughtStep,
        reply: RpcReplyPort<Result<(), LedgerError>>,
    },
    /// Patch an existing step's status/duration/summary.
    UpdateStep {
        session_id: String,
        index: u32,
        patch: StepPatch,
        reply: RpcReplyPort<Result<(), LedgerError>>,
    },
    /// Mark the run complete and freeze the record. Idempotent.
    FinalizeRun {
        session_id: String,
        result_artifacts: Option<serde_json::Value>,
        reply: RpcReplyPort<Result<(), LedgerError>>,
    },
    /// Current record for a session, if any.
    GetMessage {
        session_id: String,
        reply: RpcReplyPort<Option<StreamingMessage>>,
    },
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("no record for session: {0}")]
    SessionNotFound(String),
    #[error("no step {index} in session {session_id}")]
    StepNotFound { session_id: String, index: u32 },
    #[error("non-monotonic step index: expected {expected}, got {got}")]
    NonMonotonicIndex { expected: u32, got: u32 },
    #[error("run already finalized for session: {0}")]
    RunFinalized(String),
    #[error("failed to persist ledger record: {0}")]
    Persist(String),
}

impl LedgerActor {
    fn snapshot_path(data_dir: &std::path::Path, session_id: &str) -> PathBuf {
        // Session ids come from clients; keep the filename tame.
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        data_dir.join(format!("{safe}.json"))
    }

    async fn persist(state: &LedgerState, session_id: &str) -> Result<(), LedgerError> {
        let message = state
            .sessions
            .get(session_id)
            .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))?;
        let path = Self::snapshot_path(&state.data_dir, session_id);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(message)
            .map_err(|e| LedgerError::Persist(e.to_string()))?;
        fs::write(&tmp, payload)
            .await
            .map_err(|e| LedgerError::Persist(e.to_string()))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| LedgerError::Persist(e.to_string()))?;
        Ok(())
    }

    async fn load_existing(data_dir: &std::path::Path) -> HashMap<String, StreamingMessage> {
        let mut sessions = HashMap::new();
        let Ok(mut entries) = fs::read_dir(data_dir).await else {
            return sessions;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<StreamingMessage>(&bytes) {
                    Ok(message) => {
                        sessions.insert(message.session_id.clone(), message);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable ledger snapshot");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable ledger snapshot");
                }
            }
        }
        sessions
    }

    fn handle_begin_run(state: &mut LedgerState, session_id: String, run_id: String) {
        let message = StreamingMessage {
            session_id: session_id.clone(),
            run_id,
            thought_steps: Vec::new(),
            response_complete: false,
            updated_at: Utc::now(),
            result_artifacts: None,
        };
        state.sessions.insert(session_id, message);
    }

    fn handle_append_step(
        state: &mut LedgerState,
        session_id: &str,
        step: ThoughtStep,
    ) -> Result<(), LedgerError> {
        let message = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))?;
        if message.response_complete {
            return Err(LedgerError::RunFinalized(session_id.to_string()));
        }
        let expected = message.thought_steps.len() as u32;
        if step.index != expected {
            return Err(LedgerError::NonMonotonicIndex {
                expected,
                got: step.index,
            });
        }
        message.thought_steps.push(step);
        message.updated_at = Utc::now();
        Ok(())
    }

    fn handle_update_step(
        state: &mut LedgerState,
        session_id: &str,
        index: u32,
        patch: StepPatch,
    ) -> Result<(), LedgerError> {
        let message = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))?;
        if message.response_complete {
            return Err(LedgerError::RunFinalized(session_id.to_string()));
        }
        let step = message
            .thought_steps
            .iter_mut()
            .find(|s| s.index == index)
            .ok_or_else(|| LedgerError::StepNotFound {
                session_id: session_id.to_string(),
                index,
            })?;
        if let Some(status) = patch.status {
            step.status = status;
        }
        if let Some(duration_ms) = patch.duration_ms {
            step.duration_ms = Some(duration_ms);
        }
        if let Some(result_summary) = patch.result_summary {
            step.result_summary = Some(result_summary);
        }
        message.updated_at = Utc::now();
        Ok(())
    }

    /// Finalize freezes the record. Already-finalized runs are a no-op so
    /// repeat finalization (or a crashed-and-retried caller) cannot disturb
    /// terminal content.
    fn handle_finalize(
        state: &mut LedgerState,
        session_id: &str,
        result_artifacts: Option<serde_json::Value>,
    ) -> Result<bool, LedgerError> {
        let message = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))?;
        if message.response_complete {
            return Ok(false);
        }
        if result_artifacts.is_some() {
            message.result_artifacts = result_artifacts;
        }
        message.response_complete = true;
        message.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl Actor for LedgerActor {
    type Msg = LedgerMsg;
    type State = LedgerState;
    type Arguments = LedgerArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        fs::create_dir_all(&args.data_dir)
            .await
            .map_err(|e| ActorProcessingErr::from(e.to_string()))?;
        let sessions = Self::load_existing(&args.data_dir).await;
        tracing::info!(
            actor_id = %myself.get_id(),
            data_dir = %args.data_dir.display(),
            restored = sessions.len(),
            "LedgerActor starting"
        );
        Ok(LedgerState {
            data_dir: args.data_dir,
            sessions,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            LedgerMsg::BeginRun {
                session_id,
                run_id,
                reply,
            } => {
                Self::handle_begin_run(state, session_id.clone(), run_id);
                let result = Self::persist(state, &session_id).await;
                let _ = reply.send(result);
            }
            LedgerMsg::AppendStep {
                session_id,
                step,
                reply,
            } => {
                let mut result = Self::handle_append_step(state, &session_id, step);
                if result.is_ok() {
                    result = Self::persist(state, &session_id).await;
                }
                let _ = reply.send(result);
            }
            LedgerMsg::UpdateStep {
                session_id,
                index,
                patch,
                reply,
            } => {
                let mut result = Self::handle_update_step(state, &session_id, index, patch);
                if result.is_ok() {
                    result = Self::persist(state, &session_id).await;
                }
                let _ = reply.send(result);
            }
            LedgerMsg::FinalizeRun {
                session_id,
                result_artifacts,
                reply,
            } => {
                let result = match Self::handle_finalize(state, &session_id, result_artifacts) {
                    Ok(true) => Self::persist(state, &session_id).await,
                    Ok(false) => Ok(()),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            LedgerMsg::GetMessage { session_id, reply } => {
                let _ = reply.send(state.sessions.get(&session_id).cloned());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ractor::call;

    fn step(index: u32, action: &str) -> ThoughtStep {
        ThoughtStep {
            index,
            action: action.to_string(),
            reasoning: format!("running {action}"),
            status: ThoughtStatus::InProgress,
            started_at: Utc::now(),
            duration_ms: None,
            result_summary: None,
        }
    }

    async fn spawn_ledger(dir: &std::path::Path) -> ActorRef<LedgerMsg> {
        let (ledger, _handle) = Actor::spawn(
            None,
            LedgerActor,
            LedgerArguments {
                data_dir: dir.to_path_buf(),
            },
        )
        .await
        .expect("spawn ledger");
        ledger
    }

    #[tokio::test]
    async fn test_append_update_finalize_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = spawn_ledger(dir.path()).await;

        call!(ledger, |reply| LedgerMsg::BeginRun {
            session_id: "s1".to_string(),
            run_id: "r1".to_string(),
            reply,
        })
        .unwrap()
        .unwrap();

        call!(ledger, |reply| LedgerMsg::AppendStep {
            session_id: "s1".to_string(),
            step: step(0, "classify_intent"),
            reply,
        })
        .unwrap()
        .unwrap();

        call!(ledger, |reply| LedgerMsg::UpdateStep {
            session_id: "s1".to_string(),
            index: 0,
            patch: StepPatch {
                status: Some(ThoughtStatus::Complete),
                duration_ms: Some(12),
                result_summary: Some("terrain_analysis".to_string()),
            },
            reply,
        })
        .unwrap()
        .unwrap();

        call!(ledger, |reply| LedgerMsg::FinalizeRun {
            session_id: "s1".to_string(),
            result_artifacts: Some(serde_json::json!({"ok": true})),
            reply,
        })
        .unwrap()
        .unwrap();

        let message = call!(ledger, |reply| LedgerMsg::GetMessage {
            session_id: "s1".to_string(),
            reply,
        })
        .unwrap()
        .expect("record exists");
        assert!(message.response_complete);
        assert_eq!(message.thought_steps.len(), 1);
        assert_eq!(message.thought_steps[0].status, ThoughtStatus::Complete);
    }

    #[tokio::test]
    async fn test_non_monotonic_append_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = spawn_ledger(dir.path()).await;

        call!(ledger, |reply| LedgerMsg::BeginRun {
            session_id: "s1".to_string(),
            run_id: "r1".to_string(),
            reply,
        })
        .unwrap()
        .unwrap();

        let err = call!(ledger, |reply| LedgerMsg::AppendStep {
            session_id: "s1".to_string(),
            step: step(3, "skipped ahead"),
            reply,
        })
        .unwrap()
        .unwrap_err();
        assert_eq!(err, LedgerError::NonMonotonicIndex { expected: 0, got: 3 });
    }

    #[tokio::test]
    async fn test_finalized_record_is_frozen_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = spawn_ledger(dir.path()).await;

        call!(ledger, |reply| LedgerMsg::BeginRun {
            session_id: "s1".to_string(),
            run_id: "r1".to_string(),
            reply,
        })
        .unwrap()
        .unwrap();
        call!(ledger, |reply| LedgerMsg::AppendStep {
            session_id: "s1".to_string(),
            step: step(0, "classify_intent"),
            reply,
        })
        .unwrap()
        .unwrap();
        call!(ledger, |reply| LedgerMsg::FinalizeRun {
            session_id: "s1".to_string(),
            result_artifacts: None,
            reply,
        })
        .unwrap()
        .unwrap();

        let first = call!(ledger, |reply| LedgerMsg::GetMessage {
            session_id: "s1".to_string(),
            reply,
        })
        .unwrap()
        .unwrap();

        // Repeat finalize is a no-op; appends are rejected.
        call!(ledger, |reply| LedgerMsg::FinalizeRun {
            session_id: "s1".to_string(),
            result_artifacts: Some(serde_json::json!({"late": true})),
            reply,
        })
        .unwrap()
        .unwrap();
        let err = call!(ledger, |reply| LedgerMsg::AppendStep {
            session_id: "s1".to_string(),
            step: step(1, "late step"),
            reply,
        })
        .unwrap()
        .unwrap_err();
        assert_eq!(err, LedgerError::RunFinalized("s1".to_string()));

        let second = call!(ledger, |reply| LedgerMsg::GetMessage {
            session_id: "s1".to_string(),
            reply,
        })
        .unwrap()
        .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_snapshots_survive_actor_respawn() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = spawn_ledger(dir.path()).await;
            call!(ledger, |reply| LedgerMsg::BeginRun {
                session_id: "s1".to_string(),
                run_id: "r1".to_string(),
                reply,
            })
            .unwrap()
            .unwrap();
            call!(ledger, |reply| LedgerMsg::AppendStep {
                session_id: "s1".to_string(),
                step: step(0, "classify_intent"),
                reply,
            })
            .unwrap()
            .unwrap();
            call!(ledger, |reply| LedgerMsg::FinalizeRun {
                session_id: "s1".to_string(),
                result_artifacts: None,
                reply,
            })
            .unwrap()
            .unwrap();
            ledger.stop(None);
        }

        let ledger = spawn_ledger(dir.path()).await;
        let restored = call!(ledger, |reply| LedgerMsg::GetMessage {
            session_id: "s1".to_string(),
            reply,
        })
        .unwrap()
        .expect("restored record");
        assert!(restored.response_complete);
        assert_eq!(restored.run_id, "r1");
    }

    #[tokio::test]
    async fn test_new_run_resets_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = spawn_ledger(dir.path()).await;

        for run in ["r1", "r2"] {
            call!(ledger, |reply| LedgerMsg::BeginRun {
                session_id: "s1".to_string(),
                run_id: run.to_string(),
                reply,
            })
            .unwrap()
            .unwrap();
        }

        let message = call!(ledger, |reply| LedgerMsg::GetMessage {
            session_id: "s1".to_string(),
            reply,
        })
        .unwrap()
        .unwrap();
        assert_eq!(message.run_id, "r2");
        assert!(message.thought_steps.is_empty());
        assert!(!message.response_complete);
    }
}
