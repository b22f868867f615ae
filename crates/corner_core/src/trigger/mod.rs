//! Trigger conditions, scenario instances and the per-tick engine

pub mod condition;
pub mod engine;
pub mod instance;

pub use condition::{ComparisonOp, Condition, EvalContext, Evaluation};
pub use engine::{Sequencing, TickReport, TriggerEngine};
pub use instance::{AbortReason, InstanceId, InstanceState, ResolutionCause, ScenarioInstance};
