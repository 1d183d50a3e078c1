pub mod orchestrator;
pub mod rate_limit;
pub mod reaper;
pub mod store;
