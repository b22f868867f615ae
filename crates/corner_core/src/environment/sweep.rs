//! Weather × time-of-day grid walking
//!
//! 데이터셋 생성용: 모든 (시간대, 날씨) 조합으로 같은 코너 케이스를 반복 실행.

use super::presets::{TimeOfDay, WeatherPreset};
use crate::batch::BatchJob;
use crate::run::RunConfiguration;

/// Next cell of the grid (weather inner, time of day outer), wrapping around.
/// `None` (unknown current state) starts over at the first cell.
pub fn next_in_cycle(current: Option<(WeatherPreset, TimeOfDay)>) -> (WeatherPreset, TimeOfDay) {
    let Some((weather, time_of_day)) = current else {
        return (WeatherPreset::ALL[0], TimeOfDay::ALL[0]);
    };

    let w_idx = WeatherPreset::ALL.iter().position(|w| *w == weather).unwrap_or(0);
    let t_idx = TimeOfDay::ALL.iter().position(|t| *t == time_of_day).unwrap_or(0);

    if w_idx + 1 < WeatherPreset::ALL.len() {
        (WeatherPreset::ALL[w_idx + 1], time_of_day)
    } else {
        (WeatherPreset::ALL[0], TimeOfDay::ALL[(t_idx + 1) % TimeOfDay::ALL.len()])
    }
}

/// One job per grid cell, labelled `<time>_<weather>`, all sharing the
/// base run's corner cases, seed and traffic.
pub fn sweep(base: &RunConfiguration) -> Vec<BatchJob> {
    let mut jobs = Vec::with_capacity(WeatherPreset::ALL.len() * TimeOfDay::ALL.len());
    for time_of_day in TimeOfDay::ALL {
        for weather in WeatherPreset::ALL {
            let mut run = base.clone();
            run.weather_preset = weather.id() as i64;
            run.time_of_day = time_of_day;
            jobs.push(BatchJob { label: format!("{}_{}", time_of_day.slug(), weather.slug()), run });
        }
    }
    jobs
}
