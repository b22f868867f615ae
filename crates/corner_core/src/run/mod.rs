//! Run plans and the orchestrator that executes them

pub mod config;
pub mod orchestrator;

#[cfg(test)]
mod tests;

pub use config::{CornerCaseRef, RunConfiguration, RunEntry, ValidatedEntry};
pub use orchestrator::{RunPhase, ScenarioRunOrchestrator};
pub use crate::trigger::Sequencing;
