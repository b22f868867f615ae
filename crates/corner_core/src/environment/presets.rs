//! Weather presets and sun positions

use serde::{Deserialize, Serialize};

use crate::error::EnvironmentError;

pub const WEATHER_PRESET_COUNT: usize = 9;

/// Raw weather values sent to the simulator (percentages, degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherParameters {
    pub cloudiness: f64,
    pub precipitation: f64,
    pub precipitation_deposits: f64,
    pub wetness: f64,
    pub fog_density: f64,
    pub wind_intensity: f64,
    pub sun_altitude: f64,
    pub sun_azimuth: f64,
}

impl WeatherParameters {
    fn storm(clouds: f64, rain: f64, puddles: f64, wetness: f64, fog: f64, wind: f64) -> Self {
        Self {
            cloudiness: clouds,
            precipitation: rain,
            precipitation_deposits: puddles,
            wetness,
            fog_density: fog,
            wind_intensity: wind,
            sun_altitude: 45.0,
            sun_azimuth: 240.0,
        }
    }

    pub fn with_sun(mut self, time_of_day: TimeOfDay) -> Self {
        let (altitude, azimuth) = time_of_day.sun();
        self.sun_altitude = altitude;
        self.sun_azimuth = azimuth;
        self
    }
}

/// The nine predefined weather presets (ids 1-9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum WeatherPreset {
    #[default]
    Clear = 1,
    Cloudy = 2,
    Wet = 3,
    WetCloudy = 4,
    SoftRain = 5,
    HardRain = 6,
    Storm = 7,
    Foggy = 8,
    Worst = 9,
}

impl WeatherPreset {
    pub const ALL: [WeatherPreset; WEATHER_PRESET_COUNT] = [
        WeatherPreset::Clear,
        WeatherPreset::Cloudy,
        WeatherPreset::Wet,
        WeatherPreset::WetCloudy,
        WeatherPreset::SoftRain,
        WeatherPreset::HardRain,
        WeatherPreset::Storm,
        WeatherPreset::Foggy,
        WeatherPreset::Worst,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: i64) -> Result<Self, EnvironmentError> {
        if !(1..=WEATHER_PRESET_COUNT as i64).contains(&id) {
            return Err(EnvironmentError::InvalidPreset(id));
        }
        Ok(Self::ALL[(id - 1) as usize])
    }

    pub fn slug(self) -> &'static str {
        match self {
            WeatherPreset::Clear => "clear",
            WeatherPreset::Cloudy => "cloudy",
            WeatherPreset::Wet => "wet",
            WeatherPreset::WetCloudy => "wet_cloudy",
            WeatherPreset::SoftRain => "soft_rain",
            WeatherPreset::HardRain => "hard_rain",
            WeatherPreset::Storm => "storm",
            WeatherPreset::Foggy => "foggy",
            WeatherPreset::Worst => "worst",
        }
    }

    /// Storm values at noon; `with_sun` moves the sun afterwards
    pub fn parameters(self) -> WeatherParameters {
        // (clouds, rain, puddles, wetness, fog, wind)
        match self {
            WeatherPreset::Clear => WeatherParameters::storm(0.0, 0.0, 0.0, 0.0, 0.0, 5.0),
            WeatherPreset::Cloudy => WeatherParameters::storm(60.0, 0.0, 0.0, 0.0, 5.0, 10.0),
            WeatherPreset::Wet => WeatherParameters::storm(20.0, 0.0, 50.0, 80.0, 0.0, 10.0),
            WeatherPreset::WetCloudy => WeatherParameters::storm(80.0, 0.0, 50.0, 80.0, 5.0, 20.0),
            WeatherPreset::SoftRain => WeatherParameters::storm(70.0, 30.0, 30.0, 60.0, 5.0, 20.0),
            WeatherPreset::HardRain => {
                WeatherParameters::storm(90.0, 100.0, 90.0, 100.0, 10.0, 60.0)
            }
            WeatherPreset::Storm => WeatherParameters::storm(90.0, 80.0, 85.0, 100.0, 30.0, 90.0),
            WeatherPreset::Foggy => WeatherParameters::storm(80.0, 10.0, 5.0, 50.0, 60.0, 10.0),
            WeatherPreset::Worst => {
                WeatherParameters::storm(100.0, 100.0, 100.0, 100.0, 100.0, 100.0)
            }
        }
    }
}

/// Sun position presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeOfDay {
    #[default]
    Noon,
    Sunset,
    Night,
    Sunrise,
    /// Sun just below the horizon, street lights still off
    Dusk,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 5] =
        [TimeOfDay::Noon, TimeOfDay::Sunset, TimeOfDay::Night, TimeOfDay::Sunrise, TimeOfDay::Dusk];

    /// (altitude, azimuth) in degrees
    pub fn sun(self) -> (f64, f64) {
        match self {
            TimeOfDay::Noon => (45.0, 240.0),
            TimeOfDay::Sunset => (2.0, 268.0),
            TimeOfDay::Night => (-88.0, 320.0),
            TimeOfDay::Sunrise => (1.05, 28.28),
            TimeOfDay::Dusk => (0.01, 110.0),
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            TimeOfDay::Noon => "day",
            TimeOfDay::Sunset => "sunset",
            TimeOfDay::Night => "night",
            TimeOfDay::Sunrise => "sunrise",
            TimeOfDay::Dusk => "dusk",
        }
    }
}
