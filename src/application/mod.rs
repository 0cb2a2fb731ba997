pub mod orchestrator;
pub mod processor;
pub mod renewal;
pub mod triggers;
