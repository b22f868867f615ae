//! Scenario instance lifecycle
//!
//! Pending → Armed → Active → Resolved
//!               ↘        ↘
//!                Aborted   Aborted

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::condition::Condition;
use crate::catalog::{CornerCaseDefinition, CornerCaseId, ResolvedParams};
use crate::choreography::ActorHandle;
use crate::geometry::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "inst-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceState {
    Pending,
    Armed,
    Active,
    Resolved,
    Aborted,
}

impl InstanceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceState::Resolved | InstanceState::Aborted)
    }

    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, next),
            (Pending, Armed) | (Pending, Aborted) | (Armed, Active) | (Armed, Aborted) | (Active, Resolved) | (Active, Aborted)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Armed => "armed",
            InstanceState::Active => "active",
            InstanceState::Resolved => "resolved",
            InstanceState::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionCause {
    CompletionMet,
    /// Active longer than the configured safety limit
    SafetyTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    ActorSpawnTimeout { attempts: u32 },
    RunStopped,
    RunTimeLimit,
    PreconditionViolated(String),
    SimulatorFailure(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AbortReason::ActorSpawnTimeout { attempts } => write!(f, "actor spawn timed out after {} attempts", attempts),
            AbortReason::RunStopped => f.write_str("run stopped"),
            AbortReason::RunTimeLimit => f.write_str("run time limit reached"),
            AbortReason::PreconditionViolated(why) => write!(f, "precondition violated: {}", why),
            AbortReason::SimulatorFailure(why) => write!(f, "simulator failure: {}", why),
        }
    }
}

/// Runtime instantiation of one run entry
#[derive(Debug, Clone)]
pub struct ScenarioInstance {
    pub id: InstanceId,
    /// Position in the run configuration
    pub entry: usize,
    pub definition: Arc<CornerCaseDefinition>,
    pub params: ResolvedParams,
    pub anchor: Location,
    pub trigger: Condition,
    pub completion: Condition,

    state: InstanceState,
    /// Trigger latch ("already fired")
    pub(crate) fired: bool,
    pub(crate) deferred_logged: bool,
    pub(crate) spawn_attempts: u32,
    pub(crate) spawn_started_at: Option<f64>,
    pub(crate) next_spawn_frame: u64,
    pub(crate) teardown: Option<AbortReason>,

    pub armed_at: Option<f64>,
    pub triggered_at: Option<f64>,
    pub activated_at: Option<f64>,
    pub ended_at: Option<f64>,
    pub handles: Vec<ActorHandle>,
    pub resolution: Option<ResolutionCause>,
    pub abort_reason: Option<AbortReason>,
}

impl ScenarioInstance {
    pub fn new(
        id: InstanceId,
        entry: usize,
        definition: Arc<CornerCaseDefinition>,
        params: ResolvedParams,
        anchor: Location,
        trigger: Condition,
        completion: Condition,
    ) -> Self {
        Self {
            id,
            entry,
            definition,
            params,
            anchor,
            trigger,
            completion,
            state: InstanceState::Pending,
            fired: false,
            deferred_logged: false,
            spawn_attempts: 0,
            spawn_started_at: None,
            next_spawn_frame: 0,
            teardown: None,
            armed_at: None,
            triggered_at: None,
            activated_at: None,
            ended_at: None,
            handles: Vec::new(),
            resolution: None,
            abort_reason: None,
        }
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn corner_case(&self) -> CornerCaseId {
        self.definition.id
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn spawn_attempts(&self) -> u32 {
        self.spawn_attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Active, or mid-way through spawning its actors
    pub fn holds_slot(&self) -> bool {
        self.state == InstanceState::Active || (self.state == InstanceState::Armed && self.spawn_attempts > 0)
    }

    pub fn teardown_requested(&self) -> bool {
        self.teardown.is_some()
    }

    /// Apply a lifecycle transition; illegal transitions are refused.
    pub(crate) fn transition(&mut self, next: InstanceState) -> bool {
        if !self.state.can_transition_to(next) {
            #[cfg(feature = "strict_contracts")]
            panic!("{}: illegal transition {} -> {}", self.id, self.state.name(), next.name());

            #[cfg(not(feature = "strict_contracts"))]
            {
                warn!(instance = %self.id, from = self.state.name(), to = next.name(), "illegal transition ignored");
                return false;
            }
        }
        self.state = next;
        true
    }
}
