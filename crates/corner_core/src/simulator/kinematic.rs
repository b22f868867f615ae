//! KinematicSimulator - deterministic in-process simulator double
//!
//! 실제 시뮬레이터 없이 엔진을 돌리기 위한 단순 운동학 월드.
//! - ego: 일정 속도 직진 (autopilot) 또는 ControlSample 적용
//! - actors: 명령받은 속도로 이동, 충격량은 질량으로 나눠 속도에 반영
//! - collision: ego 반경 안에 들어온 actor 1회 보고, 보행자/동물은 제거
//!
//! [`FaultPlan`] injects spawn rejections, acknowledgement timeouts and
//! connection loss so the engine's failure paths can be exercised.

use fxhash::FxHashSet;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{ActorCommand, Simulator, SpawnRequest};
use crate::environment::WeatherParameters;
use crate::error::SimulatorError;
use crate::geometry::{forward_from_yaw, planar_distance, Location};
use crate::sut::ControlSample;
use crate::world::{ActorId, ActorKind, ActorState, CollisionReport, WorldSnapshot};

/// Default ego collision radius (meters)
pub const DEFAULT_COLLISION_RADIUS_M: f64 = 1.5;

const FIRST_ACTOR_ID: u32 = 1_000;

/// Injected failures
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Every spawn is rejected
    pub reject_all_spawns: bool,
    /// Spawns of these blueprints are always rejected
    pub reject_spawn_blueprints: Vec<String>,
    /// The next N spawn calls time out
    pub spawn_timeouts: u32,
    /// The next N weather/traffic applies time out
    pub environment_timeouts: u32,
    /// The next N advance calls go unacknowledged (`u32::MAX` = never recovers)
    pub advance_timeouts: u32,
    /// Connection drops when advancing into this frame
    pub lose_connection_at_frame: Option<u64>,
}

/// Call counters for assertions
#[derive(Debug, Clone, Default)]
pub struct SimStats {
    pub spawn_calls: u32,
    pub spawned: Vec<ActorId>,
    pub despawned: Vec<ActorId>,
    pub commands: Vec<(ActorId, ActorCommand)>,
    pub weather_applies: u32,
    pub traffic_applies: u32,
    pub ego_controls: u32,
}

#[derive(Debug, Clone)]
struct SimActor {
    state: ActorState,
    kind: ActorKind,
    physics: bool,
}

impl SimActor {
    fn mass_kg(&self) -> f64 {
        match self.kind {
            ActorKind::Prop => 10.0,
            ActorKind::Animal => 20.0,
            ActorKind::Pedestrian => 70.0,
            ActorKind::Bicycle => 90.0,
            ActorKind::Vehicle => 1_500.0,
        }
    }

    fn moves(&self) -> bool {
        self.kind != ActorKind::Prop || self.physics
    }
}

#[derive(Debug, Clone)]
pub struct KinematicSimulator {
    connected: bool,
    dt: f64,
    frame: u64,
    sim_time: f64,
    ego: ActorState,
    autopilot: bool,
    actors: BTreeMap<ActorId, SimActor>,
    next_actor: u32,
    weather: Option<WeatherParameters>,
    traffic_density: Option<f64>,
    collision_radius: f64,
    collided: FxHashSet<ActorId>,
    last_collisions: Vec<CollisionReport>,
    faults: FaultPlan,
    stats: SimStats,
}

impl KinematicSimulator {
    pub fn new(fixed_delta_seconds: f64) -> Self {
        Self {
            connected: false,
            dt: fixed_delta_seconds,
            frame: 0,
            sim_time: 0.0,
            ego: ActorState::at(Location::zeros()),
            autopilot: true,
            actors: BTreeMap::new(),
            next_actor: FIRST_ACTOR_ID,
            weather: None,
            traffic_density: None,
            collision_radius: DEFAULT_COLLISION_RADIUS_M,
            collided: FxHashSet::default(),
            last_collisions: Vec::new(),
            faults: FaultPlan::default(),
            stats: SimStats::default(),
        }
    }

    /// Ego placed at `location`, heading `yaw_deg`, cruising at `speed` m/s
    pub fn with_ego(mut self, location: Location, yaw_deg: f64, speed: f64) -> Self {
        self.ego = ActorState { location, velocity: forward_from_yaw(yaw_deg) * speed, yaw_deg };
        self
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// Ego follows control samples instead of cruising
    pub fn with_manual_control(mut self) -> Self {
        self.autopilot = false;
        self
    }

    pub fn with_collision_radius(mut self, radius: f64) -> Self {
        self.collision_radius = radius;
        self
    }

    pub fn faults_mut(&mut self) -> &mut FaultPlan {
        &mut self.faults
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn weather(&self) -> Option<&WeatherParameters> {
        self.weather.as_ref()
    }

    pub fn traffic_density(&self) -> Option<f64> {
        self.traffic_density
    }

    pub fn live_actor_ids(&self) -> Vec<ActorId> {
        self.actors.keys().copied().collect()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn ensure_connected(&self) -> Result<(), SimulatorError> {
        if self.connected {
            Ok(())
        } else {
            Err(SimulatorError::NotConnected)
        }
    }

    fn take_environment_timeout(&mut self, operation: &'static str, timeout: Duration) -> Result<(), SimulatorError> {
        if self.faults.environment_timeouts > 0 {
            self.faults.environment_timeouts -= 1;
            return Err(SimulatorError::Timeout { operation, timeout_ms: timeout.as_millis() as u64 });
        }
        Ok(())
    }

    fn detect_collisions(&mut self) {
        self.last_collisions.clear();
        let ego_location = self.ego.location;
        let ego_speed = self.ego.speed();

        let hits: Vec<(ActorId, bool)> = self
            .actors
            .iter()
            .filter(|(id, actor)| {
                !self.collided.contains(id)
                    && planar_distance(&actor.state.location, &ego_location) <= self.collision_radius
            })
            .map(|(id, actor)| (*id, actor.kind.is_vulnerable()))
            .collect();

        for (id, vulnerable) in hits {
            self.collided.insert(id);
            self.last_collisions.push(CollisionReport { other: id, intensity: ego_speed });
            if vulnerable {
                // 보행자/동물은 충돌 시 월드에서 사라짐
                self.actors.remove(&id);
            }
        }
    }
}

impl Simulator for KinematicSimulator {
    fn connect(&mut self) -> Result<(), SimulatorError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn fixed_delta_seconds(&self) -> f64 {
        self.dt
    }

    fn snapshot(&self) -> Result<WorldSnapshot, SimulatorError> {
        self.ensure_connected()?;
        let mut snapshot = WorldSnapshot::new(self.frame, self.sim_time, self.ego);
        snapshot.actors = self.actors.iter().map(|(id, actor)| (*id, actor.state)).collect();
        snapshot.collisions = self.last_collisions.clone();
        Ok(snapshot)
    }

    fn set_weather(
        &mut self,
        weather: &WeatherParameters,
        timeout: Duration,
    ) -> Result<(), SimulatorError> {
        self.ensure_connected()?;
        self.take_environment_timeout("set_weather", timeout)?;
        self.weather = Some(*weather);
        self.stats.weather_applies += 1;
        Ok(())
    }

    fn set_traffic_density(
        &mut self,
        density: f64,
        timeout: Duration,
    ) -> Result<(), SimulatorError> {
        self.ensure_connected()?;
        self.take_environment_timeout("set_traffic_density", timeout)?;
        self.traffic_density = Some(density);
        self.stats.traffic_applies += 1;
        Ok(())
    }

    fn spawn_actor(
        &mut self,
        request: &SpawnRequest,
        timeout: Duration,
    ) -> Result<ActorId, SimulatorError> {
        self.ensure_connected()?;
        self.stats.spawn_calls += 1;

        if self.faults.reject_all_spawns
            || self.faults.reject_spawn_blueprints.iter().any(|bp| *bp == request.blueprint)
        {
            return Err(SimulatorError::SpawnRejected {
                blueprint: request.blueprint.clone(),
                reason: "spawn point occupied".to_string(),
            });
        }
        if self.faults.spawn_timeouts > 0 {
            self.faults.spawn_timeouts -= 1;
            return Err(SimulatorError::Timeout {
                operation: "spawn_actor",
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        let id = ActorId(self.next_actor);
        self.next_actor += 1;
        self.actors.insert(
            id,
            SimActor {
                state: ActorState {
                    location: request.location,
                    velocity: Location::zeros(),
                    yaw_deg: request.yaw_deg,
                },
                kind: request.kind,
                physics: request.simulate_physics,
            },
        );
        self.stats.spawned.push(id);
        Ok(id)
    }

    fn despawn_actor(&mut self, actor: ActorId) -> Result<(), SimulatorError> {
        self.ensure_connected()?;
        // destroyed-by-collision actors still count as a successful release
        if self.actors.remove(&actor).is_none() && !self.collided.contains(&actor) {
            return Err(SimulatorError::UnknownActor(actor));
        }
        self.stats.despawned.push(actor);
        Ok(())
    }

    fn command_actor(
        &mut self,
        actor: ActorId,
        command: &ActorCommand,
    ) -> Result<(), SimulatorError> {
        self.ensure_connected()?;
        let target = self.actors.get_mut(&actor).ok_or(SimulatorError::UnknownActor(actor))?;
        match command {
            ActorCommand::SetVelocity(velocity) => target.state.velocity = *velocity,
            ActorCommand::AddImpulse(impulse) => {
                let mass = target.mass_kg();
                target.state.velocity += impulse / mass;
            }
            ActorCommand::SetPhysics(enabled) => target.physics = *enabled,
            ActorCommand::Stop => target.state.velocity = Location::zeros(),
        }
        self.stats.commands.push((actor, *command));
        Ok(())
    }

    fn apply_ego_control(&mut self, sample: &ControlSample) -> Result<(), SimulatorError> {
        self.ensure_connected()?;
        self.stats.ego_controls += 1;
        if self.autopilot {
            return Ok(());
        }

        const MAX_ACCEL: f64 = 4.0;
        const MAX_DECEL: f64 = 8.0;
        const MAX_YAW_RATE_DEG: f64 = 30.0;

        let accel = sample.throttle * MAX_ACCEL - sample.brake * MAX_DECEL;
        let speed = (self.ego.speed() + accel * self.dt).max(0.0);
        self.ego.yaw_deg += sample.steer * MAX_YAW_RATE_DEG * self.dt;
        self.ego.velocity = forward_from_yaw(self.ego.yaw_deg) * speed;
        Ok(())
    }

    fn advance(&mut self) -> Result<WorldSnapshot, SimulatorError> {
        self.ensure_connected()?;
        if self.faults.advance_timeouts > 0 {
            self.faults.advance_timeouts -= 1;
            return Err(SimulatorError::Timeout { operation: "advance", timeout_ms: (self.dt * 1_000.0) as u64 });
        }
        if self.faults.lose_connection_at_frame == Some(self.frame + 1) {
            self.connected = false;
            return Err(SimulatorError::ConnectionLost(format!(
                "server closed the connection at frame {}",
                self.frame + 1
            )));
        }

        let dt = self.dt;
        self.ego.location += self.ego.velocity * dt;
        for actor in self.actors.values_mut().filter(|a| a.moves()) {
            actor.state.location += actor.state.velocity * dt;
        }
        self.detect_collisions();

        self.frame += 1;
        self.sim_time += dt;
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::loc;
    use nalgebra::Vector3;

    fn request(blueprint: &str, kind: ActorKind, at: Location) -> SpawnRequest {
        SpawnRequest {
            blueprint: blueprint.to_string(),
            kind,
            location: at,
            yaw_deg: 0.0,
            simulate_physics: false,
        }
    }

    fn connected() -> KinematicSimulator {
        let mut sim = KinematicSimulator::new(0.05).with_ego(loc(0.0, 0.0, 0.0), 0.0, 10.0);
        sim.connect().unwrap();
        sim
    }

    #[test]
    fn test_requires_connection() {
        let sim = KinematicSimulator::new(0.05);
        assert_eq!(sim.snapshot().unwrap_err(), SimulatorError::NotConnected);
    }

    #[test]
    fn test_ego_cruises_at_fixed_step() {
        let mut sim = connected();
        for _ in 0..20 {
            sim.advance().unwrap();
        }
        let snapshot = sim.snapshot().unwrap();
        assert_eq!(snapshot.frame, 20);
        assert!((snapshot.sim_time - 1.0).abs() < 1e-9);
        assert!((snapshot.ego.location.x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_spawn_command_despawn() {
        let mut sim = connected();
        let timeout = Duration::from_millis(10);
        let id = sim
            .spawn_actor(&request("walker.pedestrian.0001", ActorKind::Pedestrian, loc(50.0, 5.0, 0.0)), timeout)
            .unwrap();
        sim.command_actor(id, &ActorCommand::SetVelocity(Vector3::new(0.0, -1.0, 0.0))).unwrap();
        sim.advance().unwrap();

        let walker = sim.snapshot().unwrap().actors[&id];
        assert!((walker.location.y - 4.95).abs() < 1e-9);

        sim.despawn_actor(id).unwrap();
        assert_eq!(sim.despawn_actor(id), Err(SimulatorError::UnknownActor(id)));
        assert!(sim.live_actor_ids().is_empty());
    }

    #[test]
    fn test_collision_removes_vulnerable_actor() {
        let mut sim = connected();
        let timeout = Duration::from_millis(10);
        let dog = sim
            .spawn_actor(&request("walker.animal.dog", ActorKind::Animal, loc(1.0, 0.0, 0.0)), timeout)
            .unwrap();
        let cone = sim
            .spawn_actor(&request("static.prop.trafficcone01", ActorKind::Prop, loc(1.2, 0.5, 0.0)), timeout)
            .unwrap();

        let snapshot = sim.advance().unwrap();
        assert_eq!(snapshot.collisions.len(), 2);
        assert!(snapshot.actor(dog).is_none(), "animal destroyed on impact");
        assert!(snapshot.actor(cone).is_some(), "props stay in the world");

        // reported only once
        let snapshot = sim.advance().unwrap();
        assert!(snapshot.collisions.is_empty());

        // destroyed actor can still be released
        assert!(sim.despawn_actor(dog).is_ok());
    }

    #[test]
    fn test_fault_plan_spawn_and_connection() {
        let mut sim = connected().with_faults(FaultPlan {
            spawn_timeouts: 1,
            lose_connection_at_frame: Some(2),
            ..Default::default()
        });
        let timeout = Duration::from_millis(10);
        let req = request("static.prop.barrel", ActorKind::Prop, loc(5.0, 5.0, 0.0));

        assert!(matches!(sim.spawn_actor(&req, timeout), Err(SimulatorError::Timeout { .. })));
        assert!(sim.spawn_actor(&req, timeout).is_ok());

        assert!(sim.advance().is_ok());
        assert!(matches!(sim.advance(), Err(SimulatorError::ConnectionLost(_))));
        assert!(!sim.is_connected());
    }

    #[test]
    fn test_advance_timeout_leaves_world_unchanged() {
        let mut sim = connected().with_faults(FaultPlan { advance_timeouts: 2, ..Default::default() });
        assert!(matches!(sim.advance(), Err(SimulatorError::Timeout { operation: "advance", .. })));
        assert!(sim.advance().is_err());
        assert_eq!(sim.frame(), 0);
        assert!(sim.is_connected());
        assert_eq!(sim.advance().unwrap().frame, 1);
    }

    #[test]
    fn test_manual_control_brakes() {
        let mut sim = connected().with_manual_control();
        let brake = ControlSample { throttle: 0.0, steer: 0.0, brake: 1.0 };
        for _ in 0..30 {
            sim.apply_ego_control(&brake).unwrap();
            sim.advance().unwrap();
        }
        assert_eq!(sim.snapshot().unwrap().ego_speed(), 0.0);
    }
}
