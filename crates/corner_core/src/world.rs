//! World state snapshot supplied by the simulator once per tick.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::geometry::{forward_from_yaw, Location, Velocity};

/// Simulator-side actor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Broad actor class, decides spawn blueprint family and collision handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorKind {
    Pedestrian,
    Vehicle,
    Bicycle,
    Animal,
    Prop,
}

impl ActorKind {
    /// Vulnerable road users are removed from the world when hit.
    pub fn is_vulnerable(self) -> bool {
        matches!(self, ActorKind::Pedestrian | ActorKind::Animal | ActorKind::Bicycle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActorState {
    pub location: Location,
    pub velocity: Velocity,
    pub yaw_deg: f64,
}

impl ActorState {
    pub fn at(location: Location) -> Self {
        Self { location, velocity: Velocity::zeros(), yaw_deg: 0.0 }
    }

    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    pub fn forward(&self) -> nalgebra::Vector3<f64> {
        forward_from_yaw(self.yaw_deg)
    }
}

/// Collision reported by the ego's collision sensor during the last tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionReport {
    pub other: ActorId,
    pub intensity: f64,
}

/// Immutable view of the world at one simulation tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub frame: u64,
    /// Simulation clock (seconds)
    pub sim_time: f64,
    pub ego: ActorState,
    pub actors: BTreeMap<ActorId, ActorState>,
    #[serde(default)]
    pub collisions: Vec<CollisionReport>,
}

impl WorldSnapshot {
    pub fn new(frame: u64, sim_time: f64, ego: ActorState) -> Self {
        Self { frame, sim_time, ego, actors: BTreeMap::new(), collisions: Vec::new() }
    }

    pub fn actor(&self, id: ActorId) -> Option<&ActorState> {
        self.actors.get(&id)
    }

    pub fn ego_speed(&self) -> f64 {
        self.ego.speed()
    }
}
