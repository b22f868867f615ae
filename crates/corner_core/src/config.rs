//! # Engine Configuration
//!
//! 엔진 튜닝 상수를 한곳에서 관리.
//!
//! ## 사용법
//! ```rust
//! use corner_core::config::EngineConfig;
//!
//! let config = EngineConfig::default();
//! let dataset = EngineConfig::dataset();
//! assert!(dataset.limits.max_run_seconds > config.limits.max_run_seconds);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::recorder::RecordFormat;

/// Trigger engine / spawn retry parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Spawn attempts before the instance is aborted (기본: 3)
    pub max_spawn_attempts: u32,
    /// Fixed backoff between spawn attempts, in ticks (기본: 5)
    pub spawn_backoff_ticks: u64,
    /// Simulated seconds from the first spawn attempt within which actors must spawn (기본: 5.0).
    /// A deferred instance starts counting only once it gets the slot.
    pub spawn_grace_period_s: f64,
    /// Active instances resolve after this long even if completion never holds (기본: 120.0)
    pub max_active_seconds: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            max_spawn_attempts: 3,
            spawn_backoff_ticks: 5,
            spawn_grace_period_s: 5.0,
            max_active_seconds: 120.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Bounded wait for the simulator to acknowledge a weather/traffic change
    pub apply_timeout_ms: u64,
    /// Attempts for a timed-out apply before start() gives up
    pub apply_attempts: u32,
    /// Valid traffic density range (vehicles per 100m of lane)
    pub traffic_density_min: f64,
    pub traffic_density_max: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            apply_timeout_ms: 2_000,
            apply_attempts: 2,
            traffic_density_min: 0.0,
            traffic_density_max: 10.0,
        }
    }
}

impl EnvironmentConfig {
    pub fn apply_timeout(&self) -> Duration {
        Duration::from_millis(self.apply_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Fixed physics step (기본: 0.05s = 20Hz)
    pub fixed_delta_seconds: f64,
    /// Bounded wait for a single actor spawn acknowledgement
    pub spawn_timeout_ms: u64,
    /// Consecutive unacknowledged advances tolerated before the run fails (기본: 5)
    #[serde(default = "default_advance_retries")]
    pub max_advance_retries: u32,
}

fn default_advance_retries() -> u32 {
    5
}

/// Allowed difference between configured and simulator step length
pub const FIXED_DELTA_TOLERANCE: f64 = 1e-9;

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self { fixed_delta_seconds: 0.05, spawn_timeout_ms: 1_000, max_advance_retries: default_advance_retries() }
    }
}

impl SimulatorConfig {
    pub fn spawn_timeout(&self) -> Duration {
        Duration::from_millis(self.spawn_timeout_ms)
    }

    /// Whether a simulator stepping `delta` seconds matches this config
    pub fn matches_step(&self, delta: f64) -> bool {
        (self.fixed_delta_seconds - delta).abs() <= FIXED_DELTA_TOLERANCE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Entries kept in memory before FIFO eviction
    pub capacity: usize,
    pub format: RecordFormat,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { capacity: 65_536, format: RecordFormat::Json }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLimits {
    /// Runs abort remaining instances after this much simulated time
    pub max_run_seconds: f64,
}

impl Default for RunLimits {
    fn default() -> Self {
        // 기본 실행 타이머 (800s)
        Self { max_run_seconds: 800.0 }
    }
}

/// 전체 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub limits: RunLimits,
}

impl EngineConfig {
    /// 기본 설정
    pub fn realistic() -> Self {
        Self::default()
    }

    /// Dataset generation: long runs, compact export, large buffer
    pub fn dataset() -> Self {
        let mut cfg = Self::default();
        cfg.limits.max_run_seconds = 2_000.0;
        cfg.recorder.capacity = 1_000_000;
        cfg.recorder.format = RecordFormat::Compact;
        cfg
    }

    /// 테스트용 (짧은 제한, 빠른 재시도)
    pub fn deterministic() -> Self {
        let mut cfg = Self::default();
        cfg.trigger.spawn_backoff_ticks = 2;
        cfg.trigger.max_active_seconds = 60.0;
        cfg.limits.max_run_seconds = 120.0;
        cfg.environment.apply_timeout_ms = 50;
        cfg.simulator.spawn_timeout_ms = 50;
        cfg.simulator.max_advance_retries = 3;
        cfg
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
