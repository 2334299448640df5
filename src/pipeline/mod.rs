pub mod matcher;
pub mod orchestrator;

pub use matcher::{NewsMatcher, TickerSubstringMatcher};
pub use orchestrator::{CycleOrchestrator, CycleSummary};
