//! OrchestratorActor - the workflow state machine.
//!
//! Receives submissions, classifies them into intents, dispatches to the
//! right tool worker with merged project context, handles retry/fallback,
//! merges results back into context, and finalizes the progress ledger.
//!
//! ## State Machine
//!
//! ```text
//! RECEIVED -> VALIDATING -> DISPATCHING -> {SUCCESS | PARTIAL_FAILURE | FAILURE} -> COMPLETE
//! ```
//!
//! COMPLETE is always reached exactly once, even on failure: every run ends
//! with the session's `StreamingMessage` finalized.
//!
//! Dispatch runs inside a spawned task so one session's slow worker never
//! blocks another session's submission; results come back to the actor as a
//! `RunFinished` self-message, keeping `ProjectContext` mutation exclusively
//! on the actor's message loop.

pub mod actor;
pub mod protocol;
mod run;

pub use actor::{OrchestratorActor, OrchestratorArguments, RunConfig};
pub use protocol::{OrchestratorError, OrchestratorMsg, RunOutcome, RunStatus};
