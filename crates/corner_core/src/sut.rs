//! System-under-test adapter
//!
//! 매 tick마다 현재 월드 스냅샷과 활성 corner case 정보를 외부 제어 모델에 넘기고,
//! 모델이 돌려준 제어값을 기록한다. The model is pulled by the orchestrator;
//! it never drives the simulation clock itself.

use serde::{Deserialize, Serialize};

use crate::catalog::{CornerCaseId, TaxonomyCategory};
use crate::trigger::InstanceId;
use crate::world::WorldSnapshot;

/// One control action produced by the model under test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ControlSample {
    /// 0.0 - 1.0
    pub throttle: f64,
    /// -1.0 (left) - 1.0 (right)
    pub steer: f64,
    /// 0.0 - 1.0
    pub brake: f64,
}

impl ControlSample {
    pub fn new(throttle: f64, steer: f64, brake: f64) -> Self {
        Self { throttle, steer, brake }
    }

    /// Clamp into the valid ranges; NaN becomes 0
    pub fn clamped(self) -> Self {
        fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(lo, hi)
            }
        }
        Self {
            throttle: clamp(self.throttle, 0.0, 1.0),
            steer: clamp(self.steer, -1.0, 1.0),
            brake: clamp(self.brake, 0.0, 1.0),
        }
    }
}

/// What the model is told about a currently Active corner case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveCaseView {
    pub instance: InstanceId,
    pub corner_case: CornerCaseId,
    pub category: TaxonomyCategory,
    pub activated_at: f64,
}

/// Per-tick input to the control model
#[derive(Debug, Clone, Copy)]
pub struct SutFrame<'a> {
    pub snapshot: &'a WorldSnapshot,
    pub active: &'a [ActiveCaseView],
}

impl SutFrame<'_> {
    pub fn any_active(&self) -> bool {
        !self.active.is_empty()
    }
}

/// Pull-based control model adapter
pub trait ControlModel {
    /// `None` = no action this tick (nothing is recorded or forwarded)
    fn control(&mut self, frame: &SutFrame<'_>) -> Option<ControlSample>;
}

impl<F> ControlModel for F
where
    F: FnMut(&SutFrame<'_>) -> Option<ControlSample>,
{
    fn control(&mut self, frame: &SutFrame<'_>) -> Option<ControlSample> {
        self(frame)
    }
}

/// Brakes fully whenever a corner case is active, otherwise keeps cruising
#[derive(Debug, Clone, Copy, Default)]
pub struct CautiousBrakeModel;

impl ControlModel for CautiousBrakeModel {
    fn control(&mut self, frame: &SutFrame<'_>) -> Option<ControlSample> {
        if frame.any_active() {
            Some(ControlSample::new(0.0, 0.0, 1.0))
        } else {
            Some(ControlSample::new(0.3, 0.0, 0.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::loc;
    use crate::world::ActorState;

    #[test]
    fn test_clamped() {
        let sample = ControlSample::new(1.7, -3.0, f64::NAN).clamped();
        assert_eq!(sample, ControlSample::new(1.0, -1.0, 0.0));
        assert_eq!(ControlSample::default().clamped(), ControlSample::default());
    }

    #[test]
    fn test_closure_model() {
        let snapshot = WorldSnapshot::new(0, 0.0, ActorState::at(loc(0.0, 0.0, 0.0)));
        let mut calls = 0;
        fn model_of<F: FnMut(&SutFrame<'_>) -> Option<ControlSample>>(f: F) -> F {
            f
        }
        let mut model = model_of(|frame| {
            calls += 1;
            frame.any_active().then(ControlSample::default)
        });
        assert_eq!(model.control(&SutFrame { snapshot: &snapshot, active: &[] }), None);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_cautious_model_brakes_when_active() {
        let snapshot = WorldSnapshot::new(0, 0.0, ActorState::at(loc(0.0, 0.0, 0.0)));
        let view = ActiveCaseView {
            instance: InstanceId(1),
            corner_case: CornerCaseId(12),
            category: TaxonomyCategory::BehaviorAnomaly,
            activated_at: 0.0,
        };
        let active = [view];
        let sample = CautiousBrakeModel.control(&SutFrame { snapshot: &snapshot, active: &active }).unwrap();
        assert_eq!(sample.brake, 1.0);
    }
}
