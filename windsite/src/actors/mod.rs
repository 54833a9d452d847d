pub mod ledger;
pub mod orchestrator;
