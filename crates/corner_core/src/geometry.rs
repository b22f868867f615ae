//! Geometry helpers
//!
//! 월드 좌표 (미터, 시뮬레이터 기준) 위에서 동작하는 트리거 영역/거리 계산.
//! - x, y: 지면 평면
//! - z: 높이 (트리거 판정에는 사용하지 않음)

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// World location in meters
pub type Location = Vector3<f64>;

/// Velocity in m/s
pub type Velocity = Vector3<f64>;

/// Below this speed the ego counts as stopped for intercept calculations.
pub const STOPPED_SPEED_MPS: f64 = 0.1;

/// Default distance from vehicle origin to its front bumper.
pub const BUMPER_OFFSET_M: f64 = 2.0;

pub fn loc(x: f64, y: f64, z: f64) -> Location {
    Vector3::new(x, y, z)
}

/// Distance on the ground plane (ignores z)
pub fn planar_distance(a: &Location, b: &Location) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Unit forward vector for a yaw angle in degrees
pub fn forward_from_yaw(yaw_deg: f64) -> Vector3<f64> {
    let yaw = yaw_deg.to_radians();
    Vector3::new(yaw.cos(), yaw.sin(), 0.0)
}

// ============================================================================
// Trigger Areas
// ============================================================================

/// Ground-plane axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

/// Shift direction along an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    Positive,
    Negative,
}

impl Sign {
    fn factor(self) -> f64 {
        match self {
            Sign::Positive => 1.0,
            Sign::Negative => -1.0,
        }
    }
}

/// Moves a trigger area by the ego speed (1m per m/s) before evaluation,
/// so a fast approach reaches the area earlier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedCompensation {
    pub axis: Axis,
    pub sign: Sign,
}

/// Axis-aligned ground rectangle. Corners may be given in any order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub a: (f64, f64),
    pub b: (f64, f64),
}

impl BoundingBox {
    pub fn new(a: (f64, f64), b: (f64, f64)) -> Self {
        Self { a, b }
    }

    pub fn contains(&self, location: &Location) -> bool {
        let (min_x, max_x) = (self.a.0.min(self.b.0), self.a.0.max(self.b.0));
        let (min_y, max_y) = (self.a.1.min(self.b.1), self.a.1.max(self.b.1));
        (min_x..=max_x).contains(&location.x) && (min_y..=max_y).contains(&location.y)
    }

    pub fn shifted(&self, axis: Axis, amount: f64) -> Self {
        match axis {
            Axis::X => Self { a: (self.a.0 + amount, self.a.1), b: (self.b.0 + amount, self.b.1) },
            Axis::Y => Self { a: (self.a.0, self.a.1 + amount), b: (self.b.0, self.b.1 + amount) },
        }
    }

    /// Area after applying speed compensation for the given ego speed
    pub fn compensated(&self, compensation: Option<SpeedCompensation>, ego_speed: f64) -> Self {
        match compensation {
            Some(c) => self.shifted(c.axis, c.sign.factor() * ego_speed),
            None => *self,
        }
    }
}

// ============================================================================
// Intercept
// ============================================================================

/// Location of the front bumper given the vehicle origin and its forward vector
pub fn bumper_location(origin: &Location, forward: &Vector3<f64>, offset: f64) -> Location {
    origin + forward * offset
}

/// Speed a walker needs along `walker_direction` to reach the car's path
/// at the same time the car arrives.
///
/// Returns 0.0 when the car is (nearly) stopped.
pub fn required_intercept_speed(
    car_location: &Location,
    car_velocity: &Velocity,
    walker_location: &Location,
    walker_direction: &Vector3<f64>,
) -> f64 {
    let car_speed = car_velocity.norm();
    if car_speed < STOPPED_SPEED_MPS {
        return 0.0;
    }

    // walker moving along x crosses a path parallel to y and vice versa
    let (gap_to_path, walk_distance) = if walker_direction.x != 0.0 {
        (
            (car_location.y - walker_location.y).abs(),
            (car_location.x - walker_location.x).abs(),
        )
    } else {
        (
            (car_location.x - walker_location.x).abs(),
            (car_location.y - walker_location.y).abs(),
        )
    };

    let time_to_intersect = gap_to_path / car_speed;
    // car already level with the walker's line, nothing left to intercept
    if time_to_intersect <= f64::EPSILON {
        return 0.0;
    }
    walk_distance / time_to_intersect
}
