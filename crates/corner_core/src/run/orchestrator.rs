//! Scenario Run Orchestrator
//!
//! 런 수명 주기 (start → step … → stop/완료) 를 소유한다. 시뮬레이션 시간을
//! 진행시키는 것은 오직 `step()` 뿐이다.
//!
//! ## 한 step의 순서
//! 1. 제어 모델에 현재 스냅샷 제공 → 제어값 기록/전달
//! 2. 시뮬레이터 한 틱 진행
//! 3. 실행 시간 제한 확인
//! 4. Trigger Engine 틱 (teardown → arm → active → armed)
//! 5. 이벤트 기록, 완료 여부 판단

use tracing::{debug, error, info, warn};

use super::config::RunConfiguration;
use crate::catalog::Catalog;
use crate::choreography::ActorChoreographer;
use crate::config::EngineConfig;
use crate::environment::{EnvironmentController, EnvironmentSettings, WeatherPreset};
use crate::error::{EnvironmentError, RunError, SimulatorError};
use crate::recorder::{
    AssessmentEvent, AssessmentRecord, AssessmentRecorder, RecordDestination, RecorderOverflowWarning,
};
use crate::simulator::Simulator;
use crate::sut::{ActiveCaseView, ControlModel, SutFrame};
use crate::trigger::{AbortReason, InstanceId, InstanceState, ScenarioInstance, TickReport, TriggerEngine};
use crate::world::WorldSnapshot;

/// Run lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    /// Stop requested; the next step or drain releases everything
    Stopping,
    Finished,
}

impl RunPhase {
    pub fn name(self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Stopping => "stopping",
            RunPhase::Finished => "finished",
        }
    }
}

fn environment_error(err: EnvironmentError) -> RunError {
    match err {
        EnvironmentError::Simulator(sim) if sim.is_fatal() => RunError::Fatal(sim),
        other => RunError::Environment(other),
    }
}

pub struct ScenarioRunOrchestrator<S: Simulator> {
    config: EngineConfig,
    catalog: Catalog,
    sim: S,
    environment: EnvironmentController,
    engine: TriggerEngine,
    choreo: ActorChoreographer,
    recorder: AssessmentRecorder,
    control: Option<Box<dyn ControlModel>>,
    destination: Option<Box<dyn RecordDestination>>,
    phase: RunPhase,
    run: Option<RunConfiguration>,
    snapshot: Option<WorldSnapshot>,
    overflow: Option<RecorderOverflowWarning>,
    /// Consecutive advances the simulator did not acknowledge
    advance_timeouts: u32,
}

impl<S: Simulator> ScenarioRunOrchestrator<S> {
    pub fn new(sim: S, catalog: Catalog, config: EngineConfig) -> Self {
        Self {
            environment: EnvironmentController::new(config.environment.clone()),
            engine: TriggerEngine::new(config.trigger.clone(), false, Default::default()),
            choreo: ActorChoreographer::new(config.simulator.spawn_timeout(), 0),
            recorder: AssessmentRecorder::new(config.recorder.capacity, 0),
            config,
            catalog,
            sim,
            control: None,
            destination: None,
            phase: RunPhase::Idle,
            run: None,
            snapshot: None,
            overflow: None,
            advance_timeouts: 0,
        }
    }

    /// Control model polled once per step
    pub fn with_control_model(mut self, model: impl ControlModel + 'static) -> Self {
        self.control = Some(Box::new(model));
        self
    }

    /// Destination flushed automatically when the run ends
    pub fn with_destination(mut self, destination: impl RecordDestination + 'static) -> Self {
        self.destination = Some(Box::new(destination));
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn run_configuration(&self) -> Option<&RunConfiguration> {
        self.run.as_ref()
    }

    pub fn record(&self) -> &AssessmentRecord {
        self.recorder.record()
    }

    pub fn into_record(self) -> AssessmentRecord {
        self.recorder.into_record()
    }

    pub fn instances(&self) -> &[ScenarioInstance] {
        self.engine.instances()
    }

    pub fn instance(&self, id: InstanceId) -> Option<&ScenarioInstance> {
        self.engine.instance(id)
    }

    pub fn simulator(&self) -> &S {
        &self.sim
    }

    pub fn simulator_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    pub fn environment(&self) -> &EnvironmentController {
        &self.environment
    }

    pub fn held_handle_count(&self) -> usize {
        self.choreo.held_handle_count()
    }

    /// Latest overflow warning raised by the recorder, if any
    pub fn overflow_warning(&self) -> Option<RecorderOverflowWarning> {
        self.overflow
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Validate the plan, apply world conditions and schedule every entry.
    pub fn start(&mut self, run: RunConfiguration) -> Result<(), RunError> {
        if self.phase != RunPhase::Idle {
            return Err(RunError::InvalidPhase { operation: "start", phase: self.phase.name() });
        }

        let entries = run.validate(&self.catalog)?;
        let weather = WeatherPreset::from_id(run.weather_preset)?;
        self.environment.validate_traffic_density(run.traffic_density)?;

        let sim_delta = self.sim.fixed_delta_seconds();
        if !self.config.simulator.matches_step(sim_delta) {
            return Err(RunError::Validation(format!(
                "simulator steps {}s but the engine is configured for {}s",
                sim_delta, self.config.simulator.fixed_delta_seconds
            )));
        }

        if !self.sim.is_connected() {
            self.sim.connect().map_err(RunError::Fatal)?;
        }

        let settings = EnvironmentSettings {
            weather,
            time_of_day: run.time_of_day,
            traffic_density: run.traffic_density,
        };
        self.environment.apply(&mut self.sim, &settings).map_err(environment_error)?;

        self.engine = TriggerEngine::new(self.config.trigger.clone(), run.allow_overlap, run.sequencing);
        self.choreo = ActorChoreographer::new(self.config.simulator.spawn_timeout(), run.seed);
        self.recorder = AssessmentRecorder::new(self.config.recorder.capacity, run.seed);
        self.overflow = None;
        self.advance_timeouts = 0;

        for (index, entry) in entries.into_iter().enumerate() {
            self.engine.schedule(index, entry.definition, entry.params, entry.anchor, entry.trigger, entry.completion);
        }

        let snapshot = self.sim.snapshot().map_err(RunError::Fatal)?;
        self.snapshot = Some(snapshot);
        self.observe(
            None,
            AssessmentEvent::RunStarted {
                weather,
                time_of_day: run.time_of_day,
                traffic_density: run.traffic_density,
                instances: self.engine.instances().len(),
            },
        );

        info!(
            seed = run.seed,
            weather = ?weather,
            time_of_day = ?run.time_of_day,
            entries = run.entries.len(),
            "run started"
        );
        self.run = Some(run);
        self.phase = RunPhase::Running;
        Ok(())
    }

    /// Advance exactly one simulation tick. Returns `true` once the run is
    /// complete.
    pub fn step(&mut self) -> Result<bool, RunError> {
        match self.phase {
            RunPhase::Idle => return Err(RunError::InvalidPhase { operation: "step", phase: self.phase.name() }),
            RunPhase::Finished => return Ok(true),
            RunPhase::Stopping => {
                self.drain()?;
                return Ok(true);
            }
            RunPhase::Running => {}
        }

        if let Err(err) = self.pull_control() {
            return Err(self.fail(err));
        }

        let snapshot = match self.sim.advance() {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_fatal() => return Err(self.fail(err)),
            Err(err) => {
                self.advance_timeouts += 1;
                let limit = self.config.simulator.max_advance_retries;
                if self.advance_timeouts > limit {
                    error!(attempts = self.advance_timeouts, limit, "simulator stopped acknowledging advances");
                    return Err(self.fail(err));
                }
                warn!(error = %err, attempt = self.advance_timeouts, limit, "advance not acknowledged, retrying next step");
                return Ok(false);
            }
        };
        self.advance_timeouts = 0;

        if snapshot.sim_time >= self.config.limits.max_run_seconds && !self.engine.is_complete() {
            warn!(sim_time = snapshot.sim_time, limit = self.config.limits.max_run_seconds, "run time limit reached");
            self.engine.request_teardown(AbortReason::RunTimeLimit);
        }

        let report = self.engine.tick(&mut self.sim, &mut self.choreo, &snapshot);
        self.snapshot = Some(snapshot);
        match report {
            Ok(report) => self.observe_report(report),
            Err(err) => return Err(self.fail(err)),
        }

        if self.engine.is_complete() {
            self.finish()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Cooperative stop: mark every live instance for teardown. Handles are
    /// released by the next `step()` or `drain()`.
    pub fn request_stop(&mut self) -> Result<(), RunError> {
        match self.phase {
            RunPhase::Running => {
                let marked = self.engine.request_teardown(AbortReason::RunStopped);
                self.observe(None, AssessmentEvent::RunStopped);
                info!(marked, "stop requested");
                self.phase = RunPhase::Stopping;
                Ok(())
            }
            RunPhase::Stopping | RunPhase::Finished => Ok(()),
            RunPhase::Idle => Err(RunError::InvalidPhase { operation: "stop", phase: self.phase.name() }),
        }
    }

    /// Explicit teardown pass after `request_stop`
    pub fn drain(&mut self) -> Result<(), RunError> {
        if self.phase != RunPhase::Stopping {
            return Ok(());
        }
        let now = self.now();
        match self.engine.drain(&mut self.sim, &mut self.choreo, now) {
            Ok(report) => self.observe_report(report),
            Err(err) => return Err(self.fail(err)),
        }
        self.finish()
    }

    /// Abort all Active/Armed instances, release their actors and flush the
    /// record to the configured destination.
    pub fn stop(&mut self) -> Result<(), RunError> {
        self.request_stop()?;
        self.drain()
    }

    /// Export the record to `destination` in the configured format
    pub fn flush(&self, destination: &mut dyn RecordDestination) -> Result<usize, RunError> {
        Ok(self.recorder.flush(destination, self.config.recorder.format)?)
    }

    /// Step until the run completes
    pub fn run_to_completion(&mut self) -> Result<&AssessmentRecord, RunError> {
        while !self.step()? {}
        Ok(self.recorder.record())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn now(&self) -> f64 {
        self.snapshot.as_ref().map(|s| s.sim_time).unwrap_or(0.0)
    }

    fn observe(&mut self, instance: Option<InstanceId>, event: AssessmentEvent) {
        let (sim_time, frame) = self.snapshot.as_ref().map(|s| (s.sim_time, s.frame)).unwrap_or((0.0, 0));
        if let Some(warning) = self.recorder.observe(sim_time, frame, instance, event) {
            self.overflow = Some(warning);
        }
    }

    fn observe_report(&mut self, report: TickReport) {
        for (instance, event) in report.events {
            self.observe(instance, event);
        }
    }

    fn active_views(&self) -> Vec<ActiveCaseView> {
        self.engine
            .instances()
            .iter()
            .filter(|i| i.state() == InstanceState::Active)
            .map(|i| ActiveCaseView {
                instance: i.id,
                corner_case: i.corner_case(),
                category: i.definition.category(),
                activated_at: i.activated_at.unwrap_or(0.0),
            })
            .collect()
    }

    /// Show the model the current tick; record its answer against every
    /// Active instance and forward it to the ego.
    fn pull_control(&mut self) -> Result<(), SimulatorError> {
        let Some(snapshot) = self.snapshot.clone() else {
            return Ok(());
        };
        let active = self.active_views();
        let Some(model) = self.control.as_mut() else {
            return Ok(());
        };
        let Some(sample) = model.control(&SutFrame { snapshot: &snapshot, active: &active }) else {
            return Ok(());
        };

        let sample = sample.clamped();
        for view in &active {
            self.observe(Some(view.instance), AssessmentEvent::ControlSample(sample));
        }
        match self.sim.apply_ego_control(&sample) {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                debug!(error = %err, "control sample not applied");
                Ok(())
            }
        }
    }

    fn finish(&mut self) -> Result<(), RunError> {
        let resolved = self.engine.instances().iter().filter(|i| i.state() == InstanceState::Resolved).count();
        let aborted = self.engine.instances().iter().filter(|i| i.state() == InstanceState::Aborted).count();
        self.observe(None, AssessmentEvent::RunCompleted { resolved, aborted });
        self.phase = RunPhase::Finished;
        info!(resolved, aborted, entries = self.recorder.record().len(), "run finished");
        self.flush_configured()
    }

    fn flush_configured(&mut self) -> Result<(), RunError> {
        if let Some(destination) = self.destination.as_mut() {
            self.recorder.flush(&mut **destination, self.config.recorder.format)?;
        }
        Ok(())
    }

    /// Fatal simulator failure: abort everything still live, keep the record
    /// consistent up to this point and flush what is buffered.
    fn fail(&mut self, err: SimulatorError) -> RunError {
        error!(error = %err, "fatal simulator failure, stopping run");
        let now = self.now();
        let report = self.engine.abort_all(
            &mut self.sim,
            &mut self.choreo,
            AbortReason::SimulatorFailure(err.to_string()),
            now,
        );
        self.observe_report(report);
        self.observe(None, AssessmentEvent::RunStopped);
        self.phase = RunPhase::Finished;
        if let Err(flush_err) = self.flush_configured() {
            error!(error = %flush_err, "flush after fatal failure failed");
        }
        RunError::Fatal(err)
    }
}
