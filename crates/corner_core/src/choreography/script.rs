//! Actor scripts
//!
//! 역할(role)마다 붙는 행동 스크립트. 정의에는 파라미터 이름이 들어 있고,
//! 활성화 시점에 바인딩된 값으로 풀어서 [`ResolvedScript`]가 된다.

use nalgebra::Vector3;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::ResolvedParams;
use crate::geometry::{required_intercept_speed, Location};
use crate::simulator::ActorCommand;
use crate::world::{ActorState, WorldSnapshot};

/// Number that is either fixed in the definition or bound to a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Fixed(f64),
    Param(String),
}

impl Scalar {
    pub fn param(name: &str) -> Self {
        Scalar::Param(name.to_string())
    }

    pub fn param_name(&self) -> Option<&str> {
        match self {
            Scalar::Fixed(_) => None,
            Scalar::Param(name) => Some(name),
        }
    }

    /// Schema validation guarantees numeric params are present once resolved.
    pub fn resolve(&self, params: &ResolvedParams) -> f64 {
        match self {
            Scalar::Fixed(v) => *v,
            Scalar::Param(name) => params.number(name).unwrap_or_default(),
        }
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Fixed(v)
    }
}

/// A bare name binds to the parameter of that name
impl From<&str> for Scalar {
    fn from(name: &str) -> Self {
        Scalar::param(name)
    }
}

/// Where a role's blueprint name comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlueprintSpec {
    Fixed(String),
    /// Value of a `Choice` parameter
    FromParam(String),
    /// Seeded pick among variants
    Pick(Vec<String>),
}

impl BlueprintSpec {
    pub fn fixed(name: &str) -> Self {
        BlueprintSpec::Fixed(name.to_string())
    }

    pub fn pick(names: &[&str]) -> Self {
        BlueprintSpec::Pick(names.iter().map(|n| n.to_string()).collect())
    }

    pub fn resolve<R: Rng>(&self, params: &ResolvedParams, rng: &mut R) -> Option<String> {
        match self {
            BlueprintSpec::Fixed(name) => Some(name.clone()),
            BlueprintSpec::FromParam(param) => params.text(param).map(str::to_string),
            BlueprintSpec::Pick(names) => names.choose(rng).cloned(),
        }
    }
}

/// Spawn offset from the entry anchor (world axes, meters)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetSpec {
    pub x: Scalar,
    pub y: Scalar,
    #[serde(default)]
    pub z: f64,
}

impl OffsetSpec {
    pub fn fixed(x: f64, y: f64) -> Self {
        Self { x: Scalar::Fixed(x), y: Scalar::Fixed(y), z: 0.0 }
    }

    pub fn resolve(&self, params: &ResolvedParams) -> Vector3<f64> {
        Vector3::new(self.x.resolve(params), self.y.resolve(params), self.z)
    }

    pub fn scalars(&self) -> [&Scalar; 2] {
        [&self.x, &self.y]
    }
}

impl Default for OffsetSpec {
    fn default() -> Self {
        Self::fixed(0.0, 0.0)
    }
}

/// Per-role behavior as written in a definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptSpec {
    /// Spawned and left alone
    Static,
    Walk { direction: Vector3<f64>, speed: Scalar },
    /// Re-times the walk every tick so the actor meets the ego's path
    InterceptEgo { direction: Vector3<f64>, min_speed: Scalar },
    /// Runs out, turns back after `turn_after_m` and returns at `return_speed`
    CrossAndReturn { direction: Vector3<f64>, speed: Scalar, turn_after_m: Scalar, return_speed: Scalar },
    /// Physics enabled then one impulse (N·s)
    Impulse { impulse: Vector3<f64> },
    Drive { direction: Vector3<f64>, speed: Scalar, stop_after_m: Option<Scalar> },
}

impl ScriptSpec {
    pub fn is_static(&self) -> bool {
        matches!(self, ScriptSpec::Static)
    }

    /// Scalars bound to parameters, for registration-time checks
    pub fn scalars(&self) -> Vec<&Scalar> {
        match self {
            ScriptSpec::Static | ScriptSpec::Impulse { .. } => Vec::new(),
            ScriptSpec::Walk { speed, .. } => vec![speed],
            ScriptSpec::InterceptEgo { min_speed, .. } => vec![min_speed],
            ScriptSpec::CrossAndReturn { speed, turn_after_m, return_speed, .. } => {
                vec![speed, turn_after_m, return_speed]
            }
            ScriptSpec::Drive { speed, stop_after_m, .. } => {
                let mut v = vec![speed];
                v.extend(stop_after_m.as_ref());
                v
            }
        }
    }

    pub fn resolve(&self, params: &ResolvedParams) -> ResolvedScript {
        let dir = |d: &Vector3<f64>| d.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros);
        match self {
            ScriptSpec::Static => ResolvedScript::Static,
            ScriptSpec::Walk { direction, speed } => {
                ResolvedScript::Walk { direction: dir(direction), speed: speed.resolve(params) }
            }
            ScriptSpec::InterceptEgo { direction, min_speed } => ResolvedScript::InterceptEgo {
                direction: dir(direction),
                min_speed: min_speed.resolve(params),
            },
            ScriptSpec::CrossAndReturn { direction, speed, turn_after_m, return_speed } => {
                ResolvedScript::CrossAndReturn {
                    direction: dir(direction),
                    speed: speed.resolve(params),
                    turn_after_m: turn_after_m.resolve(params),
                    return_speed: return_speed.resolve(params),
                }
            }
            ScriptSpec::Impulse { impulse } => ResolvedScript::Impulse { impulse: *impulse },
            ScriptSpec::Drive { direction, speed, stop_after_m } => ResolvedScript::Drive {
                direction: dir(direction),
                speed: speed.resolve(params),
                stop_after_m: stop_after_m.as_ref().map(|s| s.resolve(params)),
            },
        }
    }
}

/// Script with every scalar bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedScript {
    Static,
    Walk { direction: Vector3<f64>, speed: f64 },
    InterceptEgo { direction: Vector3<f64>, min_speed: f64 },
    CrossAndReturn { direction: Vector3<f64>, speed: f64, turn_after_m: f64, return_speed: f64 },
    Impulse { impulse: Vector3<f64> },
    Drive { direction: Vector3<f64>, speed: f64, stop_after_m: Option<f64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    Moving,
    Returning,
    Done,
}

/// Per-actor script runner
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    script: ResolvedScript,
    phase: ScriptPhase,
    origin: Location,
    last_speed: Option<f64>,
}

/// Speed changes smaller than this are not re-sent
const SPEED_EPSILON: f64 = 0.01;

impl ScriptRunner {
    pub fn new(script: ResolvedScript, origin: Location) -> Self {
        Self { script, phase: ScriptPhase::Moving, origin, last_speed: None }
    }

    pub fn phase(&self) -> ScriptPhase {
        self.phase
    }

    /// Commands issued right after the actor spawns
    pub fn on_activate(&mut self, snapshot: &WorldSnapshot) -> Vec<ActorCommand> {
        match self.script {
            ResolvedScript::Static => {
                self.phase = ScriptPhase::Done;
                Vec::new()
            }
            ResolvedScript::Walk { direction, speed }
            | ResolvedScript::CrossAndReturn { direction, speed, .. }
            | ResolvedScript::Drive { direction, speed, .. } => {
                self.last_speed = Some(speed);
                vec![ActorCommand::SetVelocity(direction * speed)]
            }
            ResolvedScript::InterceptEgo { .. } => {
                let origin = ActorState::at(self.origin);
                self.intercept(&origin, snapshot).into_iter().collect()
            }
            ResolvedScript::Impulse { impulse } => {
                self.phase = ScriptPhase::Done;
                vec![ActorCommand::SetPhysics(true), ActorCommand::AddImpulse(impulse)]
            }
        }
    }

    /// Commands for one tick given the actor's current state
    pub fn on_tick(&mut self, actor: &ActorState, snapshot: &WorldSnapshot) -> Vec<ActorCommand> {
        if self.phase == ScriptPhase::Done {
            return Vec::new();
        }

        match self.script {
            ResolvedScript::Static | ResolvedScript::Impulse { .. } | ResolvedScript::Walk { .. } => {
                Vec::new()
            }
            ResolvedScript::InterceptEgo { .. } => self.intercept(actor, snapshot).into_iter().collect(),
            ResolvedScript::CrossAndReturn { direction, turn_after_m, return_speed, .. } => {
                if self.phase == ScriptPhase::Moving && self.travelled(actor, &direction) >= turn_after_m {
                    self.phase = ScriptPhase::Returning;
                    self.last_speed = Some(return_speed);
                    return vec![ActorCommand::SetVelocity(-direction * return_speed)];
                }
                if self.phase == ScriptPhase::Returning && self.travelled(actor, &direction) <= 0.0 {
                    self.phase = ScriptPhase::Done;
                    return vec![ActorCommand::Stop];
                }
                Vec::new()
            }
            ResolvedScript::Drive { direction, stop_after_m, .. } => match stop_after_m {
                Some(limit) if self.travelled(actor, &direction) >= limit => {
                    self.phase = ScriptPhase::Done;
                    vec![ActorCommand::Stop]
                }
                _ => Vec::new(),
            },
        }
    }

    fn travelled(&self, actor: &ActorState, direction: &Vector3<f64>) -> f64 {
        (actor.location - self.origin).dot(direction)
    }

    fn intercept(&mut self, actor: &ActorState, snapshot: &WorldSnapshot) -> Option<ActorCommand> {
        let ResolvedScript::InterceptEgo { direction, min_speed } = self.script else {
            return None;
        };

        // walker already past the ego's line: keep going at the last speed
        let gap = (snapshot.ego.location - actor.location).dot(&direction);
        if gap < 0.0 && self.last_speed.is_some() {
            self.phase = ScriptPhase::Done;
            return None;
        }

        let needed = required_intercept_speed(
            &snapshot.ego.location,
            &snapshot.ego.velocity,
            &actor.location,
            &direction,
        );
        let speed = needed.max(min_speed);
        match self.last_speed {
            Some(last) if (last - speed).abs() < SPEED_EPSILON => None,
            _ => {
                self.last_speed = Some(speed);
                Some(ActorCommand::SetVelocity(direction * speed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ParamSchema, ParamSpec};
    use crate::geometry::loc;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn params() -> ResolvedParams {
        ParamSchema {
            fields: vec![
                ParamSpec::float("speed", 0.5, 6.0, 2.0),
                ParamSpec::choice("kid", &["walker.pedestrian.0009", "walker.pedestrian.0010"]),
            ],
        }
        .resolve(&Default::default())
        .unwrap()
    }

    fn ego_snapshot(speed: f64) -> WorldSnapshot {
        let mut ego = ActorState::at(loc(0.0, 0.0, 0.0));
        ego.velocity = Vector3::new(speed, 0.0, 0.0);
        WorldSnapshot::new(0, 0.0, ego)
    }

    #[test]
    fn test_scalar_and_blueprint_resolution() {
        let p = params();
        assert_eq!(Scalar::param("speed").resolve(&p), 2.0);
        assert_eq!(Scalar::Fixed(1.5).resolve(&p), 1.5);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(
            BlueprintSpec::FromParam("kid".into()).resolve(&p, &mut rng).as_deref(),
            Some("walker.pedestrian.0009")
        );
        let picked = BlueprintSpec::pick(&["a", "b", "c"]).resolve(&p, &mut rng).unwrap();
        assert!(["a", "b", "c"].contains(&picked.as_str()));
        assert!(BlueprintSpec::Pick(Vec::new()).resolve(&p, &mut rng).is_none());
    }

    #[test]
    fn test_cross_and_return_turns_back() {
        let script = ResolvedScript::CrossAndReturn {
            direction: Vector3::new(0.0, -1.0, 0.0),
            speed: 3.5,
            turn_after_m: 9.0,
            return_speed: 3.5,
        };
        let origin = loc(80.0, 143.4, 0.0);
        let mut runner = ScriptRunner::new(script, origin);
        let snapshot = ego_snapshot(10.0);

        let first = runner.on_activate(&snapshot);
        assert_eq!(first, vec![ActorCommand::SetVelocity(Vector3::new(0.0, -3.5, 0.0))]);

        let halfway = ActorState::at(loc(80.0, 139.0, 0.0));
        assert!(runner.on_tick(&halfway, &snapshot).is_empty());

        let far = ActorState::at(loc(80.0, 134.0, 0.0));
        let turn = runner.on_tick(&far, &snapshot);
        assert_eq!(turn, vec![ActorCommand::SetVelocity(Vector3::new(0.0, 3.5, 0.0))]);
        assert_eq!(runner.phase(), ScriptPhase::Returning);

        let back = ActorState::at(loc(80.0, 143.5, 0.0));
        assert_eq!(runner.on_tick(&back, &snapshot), vec![ActorCommand::Stop]);
        assert_eq!(runner.phase(), ScriptPhase::Done);
    }

    #[test]
    fn test_impulse_enables_physics_first() {
        let mut runner = ScriptRunner::new(
            ResolvedScript::Impulse { impulse: Vector3::new(0.0, -25.0, 10.0) },
            loc(0.0, 0.0, 0.0),
        );
        let commands = runner.on_activate(&ego_snapshot(5.0));
        assert_eq!(commands[0], ActorCommand::SetPhysics(true));
        assert!(matches!(commands[1], ActorCommand::AddImpulse(_)));
        assert_eq!(runner.phase(), ScriptPhase::Done);
    }

    #[test]
    fn test_intercept_respects_min_speed_and_dedups() {
        let mut runner = ScriptRunner::new(
            ResolvedScript::InterceptEgo { direction: Vector3::new(0.0, -1.0, 0.0), min_speed: 1.0 },
            loc(20.0, 5.0, 0.0),
        );

        // 20m at 10 m/s = 2s to cover 5m => 2.5 m/s
        let commands = runner.on_activate(&ego_snapshot(10.0));
        assert_eq!(commands, vec![ActorCommand::SetVelocity(Vector3::new(0.0, -2.5, 0.0))]);

        // same geometry again, nothing re-sent
        let walker = ActorState::at(loc(20.0, 5.0, 0.0));
        assert!(runner.on_tick(&walker, &ego_snapshot(10.0)).is_empty());

        // stopped ego falls back to the minimum speed
        let commands = runner.on_tick(&walker, &ego_snapshot(0.0));
        assert_eq!(commands, vec![ActorCommand::SetVelocity(Vector3::new(0.0, -1.0, 0.0))]);
    }

    #[test]
    fn test_drive_stops_after_distance() {
        let mut runner = ScriptRunner::new(
            ResolvedScript::Drive { direction: Vector3::new(-1.0, 0.0, 0.0), speed: 8.0, stop_after_m: Some(15.0) },
            loc(100.0, 3.5, 0.0),
        );
        let snapshot = ego_snapshot(10.0);
        runner.on_activate(&snapshot);

        assert!(runner.on_tick(&ActorState::at(loc(90.0, 3.5, 0.0)), &snapshot).is_empty());
        assert_eq!(runner.on_tick(&ActorState::at(loc(84.0, 3.5, 0.0)), &snapshot), vec![ActorCommand::Stop]);
    }
}
