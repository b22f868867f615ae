//! Trigger Engine
//!
//! 인스턴스 상태 머신을 틱 단위로 진행시킨다. 한 틱의 처리 순서:
//!
//! 1. teardown 요청된 인스턴스 정리 (stop / 시간 제한)
//! 2. Pending → Armed (Concurrent: 전부, Sequential: 앞 인스턴스가 끝난 경우 다음 하나)
//! 3. Active 인스턴스 (id 순): 충돌 기록 → 스크립트 tick → 완료 조건 평가
//! 4. Armed 인스턴스 (catalog id, instance id 순): 트리거 평가 → 슬롯 확인 → 스폰
//!
//! Active instances evaluate completion before any Armed instance may take
//! the slot, so a deferred instance activates on the very tick its blocker
//! resolves.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::condition::{Condition, EvalContext};
use super::instance::{AbortReason, InstanceId, InstanceState, ResolutionCause, ScenarioInstance};
use crate::catalog::{CornerCaseDefinition, ResolvedParams};
use crate::choreography::ActorChoreographer;
use crate::config::TriggerConfig;
use crate::error::{ChoreographyError, SimulatorError};
use crate::geometry::Location;
use crate::recorder::AssessmentEvent;
use crate::simulator::Simulator;
use crate::world::WorldSnapshot;

/// How run entries are armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sequencing {
    /// Every entry armed on the first step
    #[default]
    Concurrent,
    /// Next entry armed once every earlier one is Resolved/Aborted
    Sequential,
}

/// Events produced by one engine pass, in emission order
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub events: Vec<(Option<InstanceId>, AssessmentEvent)>,
}

impl TickReport {
    fn push(&mut self, instance: InstanceId, event: AssessmentEvent) {
        self.events.push((Some(instance), event));
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events.iter().filter(|(_, e)| e.kind() == kind).count()
    }
}

/// Fatal simulator error carried by a choreography failure, if any
fn fatal_source(err: &ChoreographyError) -> Option<SimulatorError> {
    match err {
        ChoreographyError::ActorSpawn { source, .. } if source.is_fatal() => Some(source.clone()),
        ChoreographyError::Simulator(e) if e.is_fatal() => Some(e.clone()),
        _ => None,
    }
}

pub struct TriggerEngine {
    config: TriggerConfig,
    allow_overlap: bool,
    sequencing: Sequencing,
    /// Kept in id order
    instances: Vec<ScenarioInstance>,
    next_id: u32,
}

impl TriggerEngine {
    pub fn new(config: TriggerConfig, allow_overlap: bool, sequencing: Sequencing) -> Self {
        Self { config, allow_overlap, sequencing, instances: Vec::new(), next_id: 1 }
    }

    pub fn allows_overlap(&self) -> bool {
        self.allow_overlap
    }

    /// Register a Pending instance. Ids are handed out in scheduling order.
    pub fn schedule(
        &mut self,
        entry: usize,
        definition: Arc<CornerCaseDefinition>,
        params: ResolvedParams,
        anchor: Location,
        trigger: Condition,
        completion: Condition,
    ) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        debug!(instance = %id, corner_case = %definition.id, "scheduled");
        self.instances.push(ScenarioInstance::new(id, entry, definition, params, anchor, trigger, completion));
        id
    }

    pub fn instances(&self) -> &[ScenarioInstance] {
        &self.instances
    }

    pub fn instance(&self, id: InstanceId) -> Option<&ScenarioInstance> {
        self.instances.iter().find(|i| i.id == id)
    }

    pub fn active_ids(&self) -> Vec<InstanceId> {
        self.instances.iter().filter(|i| i.state() == InstanceState::Active).map(|i| i.id).collect()
    }

    /// All instances Resolved/Aborted (an empty schedule is complete)
    pub fn is_complete(&self) -> bool {
        self.instances.iter().all(ScenarioInstance::is_terminal)
    }

    pub fn teardown_pending(&self) -> bool {
        self.instances.iter().any(|i| !i.is_terminal() && i.teardown_requested())
    }

    /// Mark every live instance for teardown. Handles are released on the
    /// next `tick` or `drain`, never here.
    pub fn request_teardown(&mut self, reason: AbortReason) -> usize {
        let mut marked = 0;
        for inst in self.instances.iter_mut().filter(|i| !i.is_terminal() && i.teardown.is_none()) {
            inst.teardown = Some(reason.clone());
            marked += 1;
        }
        if marked > 0 {
            info!(marked, reason = %reason, "teardown requested");
        }
        marked
    }

    /// Teardown pass only: abort marked instances and release their actors.
    pub fn drain<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        choreo: &mut ActorChoreographer,
        now: f64,
    ) -> Result<TickReport, SimulatorError> {
        let mut report = TickReport::default();
        self.teardown_marked(sim, choreo, now, false, &mut report)?;
        Ok(report)
    }

    /// Abort everything still live, ignoring simulator errors. Used once the
    /// connection is gone and releases can no longer be acknowledged.
    pub fn abort_all<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        choreo: &mut ActorChoreographer,
        reason: AbortReason,
        now: f64,
    ) -> TickReport {
        self.request_teardown(reason);
        let mut report = TickReport::default();
        // best effort: errors are logged inside, never returned
        let _ = self.teardown_marked(sim, choreo, now, true, &mut report);
        report
    }

    /// One engine pass over `snapshot`
    pub fn tick<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        choreo: &mut ActorChoreographer,
        snapshot: &WorldSnapshot,
    ) -> Result<TickReport, SimulatorError> {
        let now = snapshot.sim_time;
        let mut report = TickReport::default();

        self.teardown_marked(sim, choreo, now, false, &mut report)?;
        self.arm_pending(now, &mut report);
        self.update_active(sim, choreo, snapshot, &mut report)?;
        self.evaluate_armed(sim, choreo, snapshot, &mut report)?;

        Ok(report)
    }

    // ========================================================================
    // Phases
    // ========================================================================

    fn teardown_marked<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        choreo: &mut ActorChoreographer,
        now: f64,
        best_effort: bool,
        report: &mut TickReport,
    ) -> Result<(), SimulatorError> {
        let mut first_fatal = None;

        for inst in self.instances.iter_mut().filter(|i| !i.is_terminal()) {
            let Some(reason) = inst.teardown.clone() else {
                continue;
            };

            match choreo.deactivate(sim, inst.id) {
                Ok(released) if released > 0 => debug!(instance = %inst.id, released, "released on teardown"),
                Ok(_) => {}
                Err(err) => match fatal_source(&err) {
                    Some(fatal) if !best_effort => {
                        first_fatal.get_or_insert(fatal);
                    }
                    _ => warn!(instance = %inst.id, error = %err, "teardown release failed"),
                },
            }

            inst.transition(InstanceState::Aborted);
            inst.ended_at = Some(now);
            inst.handles.clear();
            inst.abort_reason = Some(reason.clone());
            info!(instance = %inst.id, reason = %reason, "aborted");
            report.push(inst.id, AssessmentEvent::Aborted { reason });
        }

        match first_fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn arm_pending(&mut self, now: f64, report: &mut TickReport) {
        match self.sequencing {
            Sequencing::Concurrent => {
                for inst in self.instances.iter_mut().filter(|i| i.state() == InstanceState::Pending) {
                    Self::arm(inst, now, report);
                }
            }
            Sequencing::Sequential => {
                let Some(next) = self.instances.iter().position(|i| !i.is_terminal()) else {
                    return;
                };
                if self.instances[next].state() == InstanceState::Pending {
                    Self::arm(&mut self.instances[next], now, report);
                }
            }
        }
    }

    fn arm(inst: &mut ScenarioInstance, now: f64, report: &mut TickReport) {
        if inst.transition(InstanceState::Armed) {
            inst.armed_at = Some(now);
            debug!(instance = %inst.id, corner_case = %inst.corner_case(), "armed");
            report.push(
                inst.id,
                AssessmentEvent::Armed { corner_case: inst.corner_case(), slug: inst.definition.slug.clone() },
            );
        }
    }

    fn update_active<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        choreo: &mut ActorChoreographer,
        snapshot: &WorldSnapshot,
        report: &mut TickReport,
    ) -> Result<(), SimulatorError> {
        let now = snapshot.sim_time;
        let max_active = self.config.max_active_seconds;

        for inst in self.instances.iter_mut().filter(|i| i.state() == InstanceState::Active) {
            for collision in &snapshot.collisions {
                if inst.handles.iter().any(|h| h.actor == collision.other) {
                    info!(instance = %inst.id, actor = %collision.other, intensity = collision.intensity, "ego collision");
                    report.push(
                        inst.id,
                        AssessmentEvent::Collision { actor: collision.other, intensity: collision.intensity },
                    );
                }
            }

            if let Err(err) = choreo.tick(sim, inst.id, snapshot) {
                if let Some(fatal) = fatal_source(&err) {
                    return Err(fatal);
                }
                warn!(instance = %inst.id, error = %err, "script tick failed");
            }

            let activated_at = inst.activated_at.unwrap_or(now);
            let ctx = EvalContext::new(snapshot).with_activation(Some(activated_at), &inst.handles);
            let cause = if inst.completion.is_satisfied(&ctx) {
                ResolutionCause::CompletionMet
            } else if now - activated_at >= max_active {
                warn!(instance = %inst.id, active_for = now - activated_at, "completion never held, resolving on safety timeout");
                ResolutionCause::SafetyTimeout
            } else {
                continue;
            };

            let actors: Vec<_> = inst.handles.iter().map(|h| h.actor).collect();
            if let Err(err) = choreo.deactivate(sim, inst.id) {
                if let Some(fatal) = fatal_source(&err) {
                    return Err(fatal);
                }
                warn!(instance = %inst.id, error = %err, "release after resolution failed");
            }

            inst.transition(InstanceState::Resolved);
            inst.ended_at = Some(now);
            inst.resolution = Some(cause);
            inst.handles.clear();
            info!(instance = %inst.id, corner_case = %inst.corner_case(), cause = ?cause, "resolved");
            report.push(inst.id, AssessmentEvent::Resolved { cause, actors });
        }
        Ok(())
    }

    fn evaluate_armed<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        choreo: &mut ActorChoreographer,
        snapshot: &WorldSnapshot,
        report: &mut TickReport,
    ) -> Result<(), SimulatorError> {
        let now = snapshot.sim_time;
        let frame = snapshot.frame;

        // catalog order breaks same-tick ties
        let mut order: Vec<usize> = (0..self.instances.len())
            .filter(|&i| self.instances[i].state() == InstanceState::Armed)
            .collect();
        order.sort_by_key(|&i| (self.instances[i].corner_case(), self.instances[i].id));

        for idx in order {
            {
                let inst = &mut self.instances[idx];
                if inst.teardown_requested() {
                    continue;
                }
                if !inst.fired {
                    let eval = inst.trigger.evaluate(&EvalContext::new(snapshot));
                    if !eval.satisfied {
                        continue;
                    }
                    inst.fired = true;
                    inst.triggered_at = Some(now);
                    info!(instance = %inst.id, corner_case = %inst.corner_case(), diagnostic = ?eval.diagnostic, "trigger fired");
                    report.push(
                        inst.id,
                        AssessmentEvent::TriggerFired { corner_case: inst.corner_case(), diagnostic: eval.diagnostic },
                    );
                }
            }

            if !self.allow_overlap {
                let me = self.instances[idx].id;
                let blocker = self.instances.iter().find(|o| o.id != me && o.holds_slot()).map(|o| o.id);
                if let Some(blocking) = blocker {
                    let inst = &mut self.instances[idx];
                    if !inst.deferred_logged {
                        inst.deferred_logged = true;
                        info!(instance = %me, blocking = %blocking, "deferred, slot taken");
                        report.push(me, AssessmentEvent::Deferred { blocking });
                    }
                    continue;
                }
            }

            if frame < self.instances[idx].next_spawn_frame {
                continue;
            }
            self.attempt_spawn(idx, sim, choreo, snapshot, report)?;
        }
        Ok(())
    }

    fn attempt_spawn<S: Simulator + ?Sized>(
        &mut self,
        idx: usize,
        sim: &mut S,
        choreo: &mut ActorChoreographer,
        snapshot: &WorldSnapshot,
        report: &mut TickReport,
    ) -> Result<(), SimulatorError> {
        let now = snapshot.sim_time;
        let config = &self.config;
        let inst = &mut self.instances[idx];

        inst.spawn_attempts += 1;
        let attempt = inst.spawn_attempts;
        let started = *inst.spawn_started_at.get_or_insert(now);

        match choreo.activate(sim, inst, snapshot) {
            Ok(handles) => {
                inst.transition(InstanceState::Active);
                inst.activated_at = Some(now);
                for handle in &handles {
                    report.push(
                        inst.id,
                        AssessmentEvent::ActorSpawned {
                            actor: handle.actor,
                            role: handle.role.clone(),
                            blueprint: handle.blueprint.clone(),
                        },
                    );
                }
                let actors = handles.iter().map(|h| h.actor).collect();
                inst.handles = handles;
                info!(instance = %inst.id, corner_case = %inst.corner_case(), attempt, "activated");
                report.push(inst.id, AssessmentEvent::Activated { actors });
                Ok(())
            }
            Err(err) => {
                if let Some(fatal) = fatal_source(&err) {
                    return Err(fatal);
                }
                warn!(instance = %inst.id, attempt, error = %err, "spawn attempt failed");
                report.push(inst.id, AssessmentEvent::SpawnFailed { attempt, reason: err.to_string() });

                let grace_expired = now - started >= config.spawn_grace_period_s;
                if attempt >= config.max_spawn_attempts || grace_expired {
                    let reason = AbortReason::ActorSpawnTimeout { attempts: attempt };
                    inst.transition(InstanceState::Aborted);
                    inst.ended_at = Some(now);
                    inst.abort_reason = Some(reason.clone());
                    warn!(instance = %inst.id, attempts = attempt, grace_expired, "giving up on spawn");
                    report.push(inst.id, AssessmentEvent::ActorSpawnTimeout { attempts: attempt });
                    report.push(inst.id, AssessmentEvent::Aborted { reason });
                } else {
                    inst.next_spawn_frame = snapshot.frame + config.spawn_backoff_ticks.max(1);
                }
                Ok(())
            }
        }
    }
}
