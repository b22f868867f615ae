//! Environment Controller
//!
//! 날씨 프리셋 / 시간대 / 교통 밀도를 시뮬레이터에 적용.
//! Changes are validated before anything is sent, so a rejected request never
//! touches the simulator or the cached state.

pub mod presets;
pub mod sweep;

pub use presets::{TimeOfDay, WeatherParameters, WeatherPreset, WEATHER_PRESET_COUNT};
pub use sweep::{next_in_cycle, sweep};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EnvironmentConfig;
use crate::error::{EnvironmentError, SimulatorError};
use crate::simulator::Simulator;

/// Requested world conditions for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    pub weather: WeatherPreset,
    pub time_of_day: TimeOfDay,
    pub traffic_density: f64,
}

/// Applies and tracks world conditions
#[derive(Debug, Clone)]
pub struct EnvironmentController {
    config: EnvironmentConfig,
    weather: Option<WeatherPreset>,
    time_of_day: TimeOfDay,
    traffic_density: Option<f64>,
}

impl EnvironmentController {
    pub fn new(config: EnvironmentConfig) -> Self {
        Self { config, weather: None, time_of_day: TimeOfDay::default(), traffic_density: None }
    }

    pub fn current_weather(&self) -> Option<WeatherPreset> {
        self.weather
    }

    pub fn current_time_of_day(&self) -> TimeOfDay {
        self.time_of_day
    }

    pub fn current_traffic_density(&self) -> Option<f64> {
        self.traffic_density
    }

    /// Validate a traffic density against the configured range
    pub fn validate_traffic_density(&self, level: f64) -> Result<f64, EnvironmentError> {
        let (min, max) = (self.config.traffic_density_min, self.config.traffic_density_max);
        if !level.is_finite() || level < min || level > max {
            return Err(EnvironmentError::OutOfRange { field: "traffic_density", value: level, min, max });
        }
        Ok(level)
    }

    /// Apply weather preset 1-9, keeping the current time of day.
    ///
    /// Blocks until the simulator acknowledges; a timeout surfaces as
    /// `ApplyTimeout` and leaves the cached preset unchanged.
    pub fn apply_weather<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        preset_id: i64,
    ) -> Result<WeatherPreset, EnvironmentError> {
        let preset = WeatherPreset::from_id(preset_id)?;
        self.push_weather(sim, preset, self.time_of_day)?;
        self.weather = Some(preset);
        info!(preset = ?preset, "weather applied");
        Ok(preset)
    }

    /// Re-issue the weather with a new sun position
    pub fn apply_time_of_day<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        time_of_day: TimeOfDay,
    ) -> Result<(), EnvironmentError> {
        let preset = self.weather.unwrap_or_default();
        self.push_weather(sim, preset, time_of_day)?;
        self.time_of_day = time_of_day;
        debug!(time_of_day = ?time_of_day, "time of day applied");
        Ok(())
    }

    pub fn apply_traffic_density<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        level: f64,
    ) -> Result<(), EnvironmentError> {
        let level = self.validate_traffic_density(level)?;
        let timeout = self.config.apply_timeout();
        self.with_retry("traffic_density", |s| s.set_traffic_density(level, timeout), sim)?;
        self.traffic_density = Some(level);
        debug!(level, "traffic density applied");
        Ok(())
    }

    /// Apply all three settings in one weather push plus one traffic push.
    pub fn apply<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        settings: &EnvironmentSettings,
    ) -> Result<(), EnvironmentError> {
        self.validate_traffic_density(settings.traffic_density)?;
        self.push_weather(sim, settings.weather, settings.time_of_day)?;
        self.weather = Some(settings.weather);
        self.time_of_day = settings.time_of_day;
        info!(preset = ?settings.weather, time_of_day = ?settings.time_of_day, "weather applied");
        self.apply_traffic_density(sim, settings.traffic_density)?;
        Ok(())
    }

    fn push_weather<S: Simulator + ?Sized>(
        &self,
        sim: &mut S,
        preset: WeatherPreset,
        time_of_day: TimeOfDay,
    ) -> Result<(), EnvironmentError> {
        let params = preset.parameters().with_sun(time_of_day);
        let timeout = self.config.apply_timeout();
        self.with_retry("weather", |s| s.set_weather(&params, timeout), sim)
    }

    /// Bounded retry for acknowledgement timeouts
    fn with_retry<S, F>(&self, what: &'static str, mut op: F, sim: &mut S) -> Result<(), EnvironmentError>
    where
        S: Simulator + ?Sized,
        F: FnMut(&mut S) -> Result<(), SimulatorError>,
    {
        let attempts = self.config.apply_attempts.max(1);
        for attempt in 1..=attempts {
            match op(sim) {
                Ok(()) => return Ok(()),
                Err(SimulatorError::Timeout { .. }) if attempt < attempts => {
                    warn!(what, attempt, "environment apply timed out, retrying");
                }
                Err(SimulatorError::Timeout { .. }) => {
                    return Err(EnvironmentError::ApplyTimeout { timeout_ms: self.config.apply_timeout_ms });
                }
                Err(err) => return Err(EnvironmentError::Simulator(err)),
            }
        }
        Err(EnvironmentError::ApplyTimeout { timeout_ms: self.config.apply_timeout_ms })
    }
}
