//! Simulator boundary
//!
//! 외부 시뮬레이터와의 동기식 요청/응답 프로토콜.
//! Every call is a bounded request/acknowledge round trip; timeouts come back
//! as typed errors instead of blocking the tick.

pub mod kinematic;

pub use kinematic::{FaultPlan, KinematicSimulator};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::environment::WeatherParameters;
use crate::error::SimulatorError;
use crate::geometry::{Location, Velocity};
use crate::sut::ControlSample;
use crate::world::{ActorId, ActorKind, WorldSnapshot};

/// Actor spawn request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub blueprint: String,
    pub kind: ActorKind,
    pub location: Location,
    pub yaw_deg: f64,
    pub simulate_physics: bool,
}

/// Per-tick scripting primitive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActorCommand {
    SetVelocity(Velocity),
    AddImpulse(Vector3<f64>),
    SetPhysics(bool),
    Stop,
}

/// External simulator API surface consumed by the engine
pub trait Simulator {
    fn connect(&mut self) -> Result<(), SimulatorError>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Fixed step length in simulated seconds
    fn fixed_delta_seconds(&self) -> f64;

    fn snapshot(&self) -> Result<WorldSnapshot, SimulatorError>;

    fn set_weather(
        &mut self,
        weather: &WeatherParameters,
        timeout: Duration,
    ) -> Result<(), SimulatorError>;

    fn set_traffic_density(&mut self, density: f64, timeout: Duration)
        -> Result<(), SimulatorError>;

    fn spawn_actor(
        &mut self,
        request: &SpawnRequest,
        timeout: Duration,
    ) -> Result<ActorId, SimulatorError>;

    fn despawn_actor(&mut self, actor: ActorId) -> Result<(), SimulatorError>;

    fn command_actor(
        &mut self,
        actor: ActorId,
        command: &ActorCommand,
    ) -> Result<(), SimulatorError>;

    /// Forward a control sample from the system under test to the ego vehicle
    fn apply_ego_control(&mut self, sample: &ControlSample) -> Result<(), SimulatorError>;

    /// Advance exactly one fixed step and return the new snapshot
    fn advance(&mut self) -> Result<WorldSnapshot, SimulatorError>;
}

impl<S: Simulator + ?Sized> Simulator for Box<S> {
    fn connect(&mut self) -> Result<(), SimulatorError> {
        (**self).connect()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn fixed_delta_seconds(&self) -> f64 {
        (**self).fixed_delta_seconds()
    }

    fn snapshot(&self) -> Result<WorldSnapshot, SimulatorError> {
        (**self).snapshot()
    }

    fn set_weather(
        &mut self,
        weather: &WeatherParameters,
        timeout: Duration,
    ) -> Result<(), SimulatorError> {
        (**self).set_weather(weather, timeout)
    }

    fn set_traffic_density(
        &mut self,
        density: f64,
        timeout: Duration,
    ) -> Result<(), SimulatorError> {
        (**self).set_traffic_density(density, timeout)
    }

    fn spawn_actor(
        &mut self,
        request: &SpawnRequest,
        timeout: Duration,
    ) -> Result<ActorId, SimulatorError> {
        (**self).spawn_actor(request, timeout)
    }

    fn despawn_actor(&mut self, actor: ActorId) -> Result<(), SimulatorError> {
        (**self).despawn_actor(actor)
    }

    fn command_actor(
        &mut self,
        actor: ActorId,
        command: &ActorCommand,
    ) -> Result<(), SimulatorError> {
        (**self).command_actor(actor, command)
    }

    fn apply_ego_control(&mut self, sample: &ControlSample) -> Result<(), SimulatorError> {
        (**self).apply_ego_control(sample)
    }

    fn advance(&mut self) -> Result<WorldSnapshot, SimulatorError> {
        (**self).advance()
    }
}
