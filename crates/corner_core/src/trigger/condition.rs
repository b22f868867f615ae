//! Trigger / completion predicates
//!
//! 매 틱 월드 스냅샷 위에서 평가되는 순수 함수. 같은 스냅샷이면 항상 같은 결과.

use serde::{Deserialize, Serialize};

use crate::choreography::ActorHandle;
use crate::geometry::{planar_distance, BoundingBox, Location, SpeedCompensation};
use crate::world::WorldSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

/// Tolerance for `Equal` / `NotEqual` on speeds
const EQ_TOLERANCE: f64 = 1e-6;

impl ComparisonOp {
    pub fn compare(self, left: f64, right: f64) -> bool {
        match self {
            ComparisonOp::Equal => (left - right).abs() <= EQ_TOLERANCE,
            ComparisonOp::NotEqual => (left - right).abs() > EQ_TOLERANCE,
            ComparisonOp::Greater => left > right,
            ComparisonOp::GreaterEqual => left >= right,
            ComparisonOp::Less => left < right,
            ComparisonOp::LessEqual => left <= right,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Equal => "==",
            ComparisonOp::NotEqual => "!=",
            ComparisonOp::Greater => ">",
            ComparisonOp::GreaterEqual => ">=",
            ComparisonOp::Less => "<",
            ComparisonOp::LessEqual => "<=",
        }
    }
}

/// Predicate language shared by trigger and completion conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    EgoWithinRadius { point: Location, radius: f64 },
    /// Area optionally shifted against the approach by the ego speed
    EgoInsideArea { area: BoundingBox, compensation: Option<SpeedCompensation> },
    /// Ego's progress along its heading has gone past `point`
    EgoPassedPoint { point: Location },
    EgoSpeed(ComparisonOp, f64),
    /// Simulation clock (seconds)
    ElapsedAtLeast(f64),
    /// Seconds since the instance became Active; false before activation
    SinceActivationAtLeast(f64),
    ActorReachedArea { role: String, area: BoundingBox },
    /// Owned actor no longer in the snapshot (destroyed on impact)
    ActorLost { role: String },
    Always,
    Never,
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

/// Read-only inputs for one evaluation
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub snapshot: &'a WorldSnapshot,
    pub activated_at: Option<f64>,
    pub actors: &'a [ActorHandle],
}

impl<'a> EvalContext<'a> {
    pub fn new(snapshot: &'a WorldSnapshot) -> Self {
        Self { snapshot, activated_at: None, actors: &[] }
    }

    pub fn with_activation(mut self, activated_at: Option<f64>, actors: &'a [ActorHandle]) -> Self {
        self.activated_at = activated_at;
        self.actors = actors;
        self
    }

    fn actor_state(&self, role: &str) -> Option<&'a crate::world::ActorState> {
        let handle = self.actors.iter().find(|h| h.role == role)?;
        self.snapshot.actor(handle.actor)
    }
}

/// Result plus a short human-readable reason
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub satisfied: bool,
    pub diagnostic: Option<String>,
}

impl Evaluation {
    fn new(satisfied: bool, diagnostic: String) -> Self {
        Self { satisfied, diagnostic: Some(diagnostic) }
    }

    fn plain(satisfied: bool) -> Self {
        Self { satisfied, diagnostic: None }
    }
}

impl Condition {
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Evaluation {
        let snapshot = ctx.snapshot;
        let ego = &snapshot.ego;

        match self {
            Condition::EgoWithinRadius { point, radius } => {
                let d = planar_distance(&ego.location, point);
                Evaluation::new(d <= *radius, format!("ego {:.1}m from ({:.1}, {:.1}), radius {:.1}", d, point.x, point.y, radius))
            }

            Condition::EgoInsideArea { area, compensation } => {
                let area = area.compensated(*compensation, ego.speed());
                Evaluation::new(
                    area.contains(&ego.location),
                    format!("ego at ({:.1}, {:.1}) vs area {:?}-{:?}", ego.location.x, ego.location.y, area.a, area.b),
                )
            }

            Condition::EgoPassedPoint { point } => {
                let progress = (ego.location - point).dot(&ego.forward());
                Evaluation::new(progress >= 0.0, format!("ego {:.1}m past ({:.1}, {:.1})", progress, point.x, point.y))
            }

            Condition::EgoSpeed(op, mps) => {
                let speed = ego.speed();
                Evaluation::new(op.compare(speed, *mps), format!("ego speed {:.2} {} {:.2}", speed, op.symbol(), mps))
            }

            Condition::ElapsedAtLeast(seconds) => Evaluation::new(
                snapshot.sim_time >= *seconds,
                format!("sim time {:.2}s >= {:.2}s", snapshot.sim_time, seconds),
            ),

            Condition::SinceActivationAtLeast(seconds) => match ctx.activated_at {
                Some(at) => {
                    let since = snapshot.sim_time - at;
                    Evaluation::new(since >= *seconds, format!("{:.2}s since activation", since))
                }
                None => Evaluation::plain(false),
            },

            Condition::ActorReachedArea { role, area } => match ctx.actor_state(role) {
                Some(state) => Evaluation::new(
                    area.contains(&state.location),
                    format!("{} at ({:.1}, {:.1})", role, state.location.x, state.location.y),
                ),
                None => Evaluation::plain(false),
            },

            Condition::ActorLost { role } => {
                let owned = ctx.actors.iter().any(|h| h.role == *role);
                let lost = owned && ctx.actor_state(role).is_none();
                Evaluation::new(lost, format!("{} lost: {}", role, lost))
            }

            Condition::Always => Evaluation::plain(true),
            Condition::Never => Evaluation::plain(false),

            Condition::All(children) => {
                let mut reasons = Vec::new();
                for child in children {
                    let eval = child.evaluate(ctx);
                    if !eval.satisfied {
                        return Evaluation { satisfied: false, diagnostic: eval.diagnostic };
                    }
                    reasons.extend(eval.diagnostic);
                }
                Evaluation { satisfied: true, diagnostic: (!reasons.is_empty()).then(|| reasons.join("; ")) }
            }

            Condition::Any(children) => children
                .iter()
                .map(|c| c.evaluate(ctx))
                .find(|e| e.satisfied)
                .unwrap_or_else(|| Evaluation::plain(false)),

            Condition::Not(inner) => {
                let eval = inner.evaluate(ctx);
                Evaluation { satisfied: !eval.satisfied, diagnostic: eval.diagnostic.map(|d| format!("not ({})", d)) }
            }
        }
    }

    pub fn is_satisfied(&self, ctx: &EvalContext<'_>) -> bool {
        self.evaluate(ctx).satisfied
    }

    /// Sub-conditions that only make sense once actors exist
    pub fn needs_activation(&self) -> bool {
        match self {
            Condition::SinceActivationAtLeast(_)
            | Condition::ActorReachedArea { .. }
            | Condition::ActorLost { .. } => true,
            Condition::All(children) | Condition::Any(children) => {
                children.iter().any(Condition::needs_activation)
            }
            Condition::Not(inner) => inner.needs_activation(),
            _ => false,
        }
    }

    /// Actor roles referenced anywhere in the tree
    pub fn roles(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_roles(&mut out);
        out
    }

    fn collect_roles<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::ActorReachedArea { role, .. } | Condition::ActorLost { role } => out.push(role),
            Condition::All(children) | Condition::Any(children) => {
                children.iter().for_each(|c| c.collect_roles(out))
            }
            Condition::Not(inner) => inner.collect_roles(out),
            _ => {}
        }
    }

    /// Non-finite numbers or negative radii/durations
    pub fn numeric_problem(&self) -> Option<String> {
        let bad = |what: &str, v: f64| (!v.is_finite() || v < 0.0).then(|| format!("{} = {}", what, v));
        let bad_point = |point: &Location| point.iter().any(|c| !c.is_finite()).then(|| "non-finite point".to_string());
        let bad_area = |area: &BoundingBox| {
            [area.a.0, area.a.1, area.b.0, area.b.1]
                .iter()
                .any(|c| !c.is_finite())
                .then(|| format!("non-finite area {:?} / {:?}", area.a, area.b))
        };
        match self {
            Condition::EgoWithinRadius { point, radius } => bad_point(point).or_else(|| bad("radius", *radius)),
            Condition::EgoPassedPoint { point } => bad_point(point),
            Condition::EgoInsideArea { area, .. } | Condition::ActorReachedArea { area, .. } => bad_area(area),
            Condition::EgoSpeed(_, mps) => bad("speed", *mps),
            Condition::ElapsedAtLeast(s) | Condition::SinceActivationAtLeast(s) => bad("seconds", *s),
            Condition::All(children) | Condition::Any(children) => {
                children.iter().find_map(Condition::numeric_problem)
            }
            Condition::Not(inner) => inner.numeric_problem(),
            _ => None,
        }
    }
}
