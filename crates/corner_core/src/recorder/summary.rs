//! Per-instance summaries derived from a finished record

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{AssessmentEvent, AssessmentRecord};
use crate::catalog::CornerCaseId;
use crate::trigger::{AbortReason, InstanceId, InstanceState, ResolutionCause};
use crate::world::ActorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Resolved without the ego hitting any of the instance's actors
    Passed,
    /// Ego collided with one of the instance's actors
    Failed,
    Aborted,
    /// No terminal event in the record (evicted or run still going)
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub instance: InstanceId,
    pub corner_case: Option<CornerCaseId>,
    pub triggered_at: Option<f64>,
    pub activated_at: Option<f64>,
    pub ended_at: Option<f64>,
    pub actors: Vec<ActorId>,
    pub collisions: usize,
    pub control_samples: usize,
    pub final_state: Option<InstanceState>,
    pub resolution: Option<ResolutionCause>,
    pub abort_reason: Option<AbortReason>,
    pub verdict: Verdict,
}

impl InstanceSummary {
    fn new(instance: InstanceId) -> Self {
        Self {
            instance,
            corner_case: None,
            triggered_at: None,
            activated_at: None,
            ended_at: None,
            actors: Vec::new(),
            collisions: 0,
            control_samples: 0,
            final_state: None,
            resolution: None,
            abort_reason: None,
            verdict: Verdict::Incomplete,
        }
    }
}

impl AssessmentRecord {
    /// One summary per instance that appears in the record, in id order
    pub fn summarize(&self) -> Vec<InstanceSummary> {
        let mut summaries: BTreeMap<InstanceId, InstanceSummary> = BTreeMap::new();

        for entry in &self.entries {
            let Some(instance) = entry.instance else {
                continue;
            };
            let s = summaries.entry(instance).or_insert_with(|| InstanceSummary::new(instance));

            match &entry.event {
                AssessmentEvent::Armed { corner_case, .. } => s.corner_case = Some(*corner_case),
                AssessmentEvent::TriggerFired { corner_case, .. } => {
                    s.corner_case = Some(*corner_case);
                    s.triggered_at.get_or_insert(entry.sim_time);
                }
                AssessmentEvent::Activated { actors } => {
                    s.activated_at = Some(entry.sim_time);
                    s.actors = actors.clone();
                }
                AssessmentEvent::Collision { .. } => s.collisions += 1,
                AssessmentEvent::ControlSample(_) => s.control_samples += 1,
                AssessmentEvent::Resolved { cause, .. } => {
                    s.ended_at = Some(entry.sim_time);
                    s.final_state = Some(InstanceState::Resolved);
                    s.resolution = Some(*cause);
                }
                AssessmentEvent::Aborted { reason } => {
                    s.ended_at = Some(entry.sim_time);
                    s.final_state = Some(InstanceState::Aborted);
                    s.abort_reason = Some(reason.clone());
                }
                _ => {}
            }
        }

        summaries
            .into_values()
            .map(|mut s| {
                s.verdict = match s.final_state {
                    Some(InstanceState::Aborted) => Verdict::Aborted,
                    _ if s.collisions > 0 => Verdict::Failed,
                    Some(InstanceState::Resolved) => Verdict::Passed,
                    _ => Verdict::Incomplete,
                };
                s
            })
            .collect()
    }
}
