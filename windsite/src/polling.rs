//! Client-side progress polling.
//!
//! The API is poll-only: a submitter reads the session's ledger record on an
//! interval until `response_complete` flips. Terminal records are frozen, so
//! two reads after completion return identical content and a poller can stop
//! on the first terminal read without losing anything.

use std::time::Duration;

use async_trait::async_trait;
use ractor::ActorRef;
use shared_types::StreamingMessage;
use thiserror::Error;

use crate::actors::ledger::LedgerMsg;

/// Anything that can produce the current progress record for a session.
#[async_trait]
pub trait ProgressSource: Send + Sync {
    async fn fetch(&self, session_id: &str) -> Option<StreamingMessage>;
}

/// Reads progress directly from the ledger actor.
pub struct LedgerProgressSource {
    ledger: ActorRef<LedgerMsg>,
}

impl LedgerProgressSource {
    pub fn new(ledger: ActorRef<LedgerMsg>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl ProgressSource for LedgerProgressSource {
    async fn fetch(&self, session_id: &str) -> Option<StreamingMessage> {
        ractor::call!(self.ledger, |reply| LedgerMsg::GetMessage {
            session_id: session_id.to_string(),
            reply,
        })
        .ok()
        .flatten()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PollingError {
    #[error("run did not complete within {attempts} polls")]
    Timeout {
        attempts: u32,
        /// Most recent record observed, if any poll returned one.
        last_seen: Option<StreamingMessage>,
    },
}

pub struct PollingClient {
    interval: Duration,
    max_attempts: u32,
}

impl Default for PollingClient {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_attempts: 100,
        }
    }
}

impl PollingClient {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Poll until the session's record is terminal.
    ///
    /// A missing record counts as an attempt rather than an error; the
    /// submission may still be in flight to the ledger on the first polls.
    pub async fn wait_for_completion(
        &self,
        source: &dyn ProgressSource,
        session_id: &str,
    ) -> Result<StreamingMessage, PollingError> {
        let mut last_seen: Option<StreamingMessage> = None;
        for attempt in 0..self.max_attempts {
            if let Some(message) = source.fetch(session_id).await {
                if message.response_complete {
                    return Ok(message);
                }
                last_seen = Some(message);
            }
            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        Err(PollingError::Timeout {
            attempts: self.max_attempts,
            last_seen,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedSource {
        complete_after: u32,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(complete_after: u32) -> Self {
            Self {
                complete_after,
                calls: AtomicU32::new(0),
            }
        }

        fn message(&self, complete: bool) -> StreamingMessage {
            StreamingMessage {
                session_id: "s1".to_string(),
                run_id: "r1".to_string(),
                thought_steps: vec![],
                response_complete: complete,
                updated_at: Utc::now(),
                result_artifacts: None,
            }
        }
    }

    #[async_trait]
    impl ProgressSource for ScriptedSource {
        async fn fetch(&self, _session_id: &str) -> Option<StreamingMessage> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Some(self.message(call >= self.complete_after))
        }
    }

    #[tokio::test]
    async fn stops_on_first_terminal_read() {
        let source = ScriptedSource::new(2);
        let client = PollingClient::new(Duration::from_millis(1), 10);
        let message = client
            .wait_for_completion(&source, "s1")
            .await
            .expect("should complete");
        assert!(message.response_complete);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_when_never_terminal() {
        let source = ScriptedSource::new(u32::MAX);
        let client = PollingClient::new(Duration::from_millis(1), 5);
        let err = client
            .wait_for_completion(&source, "s1")
            .await
            .expect_err("should time out");
        match err {
            PollingError::Timeout {
                attempts,
                last_seen,
            } => {
                assert_eq!(attempts, 5);
                assert!(last_seen.is_some());
            }
        }
    }

    #[tokio::test]
    async fn missing_record_counts_as_attempt() {
        struct EmptySource;
        #[async_trait]
        impl ProgressSource for EmptySource {
            async fn fetch(&self, _session_id: &str) -> Option<StreamingMessage> {
                None
            }
        }
        let client = PollingClient::new(Duration::from_millis(1), 3);
        let err = client
            .wait_for_completion(&EmptySource, "missing")
            .await
            .expect_err("should time out");
        assert!(matches!(
            err,
            PollingError::Timeout {
                attempts: 3,
                last_seen: None
            }
        ));
    }
}
