//! Drives a [`RideTracker`] through a recorded ride, as fast as possible.
//! Time comes from the samples themselves; the once-a-second duration
//! ticks are simulated the way the live service would produce them,
//! starting one second after every entry to Active.

use anyhow::{Context, Result};
use log::info;
use logging_timer::time;
use time::{Duration, OffsetDateTime};

use crate::{
    config::TrackingConfig,
    gpx_reader::Recording,
    model::{FinishedRide, HeartRateSample, LocationSample, RideState},
    ride::{LocationOutcome, RideTracker},
};

const TICK_PERIOD: Duration = Duration::SECOND;

#[derive(Debug, Clone, Copy)]
enum Input {
    Location(LocationSample),
    HeartRate(HeartRateSample),
}

impl Input {
    fn time(&self) -> OffsetDateTime {
        match self {
            Input::Location(s) => s.time,
            Input::HeartRate(s) => s.time,
        }
    }
}

/// Replays `recording` as a single ride that starts at the first
/// trackpoint and finishes at the last input.
#[time]
pub fn replay_recording(recording: &Recording, config: TrackingConfig) -> Result<FinishedRide> {
    let start = recording
        .locations
        .first()
        .context("The recording has no trackpoints")?
        .time;

    let mut inputs: Vec<Input> = recording
        .locations
        .iter()
        .copied()
        .map(Input::Location)
        .chain(recording.heart_rate.iter().copied().map(Input::HeartRate))
        .collect();
    // Stable, so a location and a heart-rate reading with the same time
    // stay in file order.
    inputs.sort_by_key(Input::time);

    let mut tracker = RideTracker::new(config);
    tracker.start(start)?;

    let mut next_tick = Some(start + TICK_PERIOD);
    let mut end = start;
    let mut rejected = 0;

    for input in inputs {
        let now = input.time();
        while let Some(tick) = next_tick.filter(|tick| *tick <= now) {
            tracker.tick(tick);
            next_tick = Some(tick + TICK_PERIOD);
        }

        match input {
            Input::Location(sample) => {
                if let LocationOutcome::Rejected(_) = tracker.on_location(sample) {
                    rejected += 1;
                }
            }
            Input::HeartRate(sample) => tracker.on_heart_rate(sample),
        }

        next_tick = match (tracker.state(), next_tick) {
            (RideState::Active, None) => Some(now + TICK_PERIOD),
            (RideState::Active, Some(tick)) => Some(tick),
            _ => None,
        };
        end = end.max(now);
    }

    let finished = tracker.finish(end)?;
    info!(
        "Replayed {} trackpoints ({} rejected): {:.2} km in {}, {} events",
        recording.locations.len(),
        rejected,
        finished.summary.distance_km,
        finished.summary.moving_time,
        finished.events.len()
    );

    Ok(finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gate::tests::sample_at, model::EventType};

    fn fix(north_metres: f64, seconds: i64, speed_mps: f64) -> LocationSample {
        let mut s = sample_at(north_metres, seconds as f64, 5.0);
        s.speed_mps = speed_mps;
        s
    }

    /// A minute at 18 km/h, half a minute stood at the lights, then
    /// another 20 seconds of riding.
    fn lights_recording() -> Recording {
        let mut locations = Vec::new();
        for t in 0..60 {
            locations.push(fix(5.0 * t as f64, t, 5.0));
        }
        for t in 60..90 {
            locations.push(fix(295.0, t, 0.0));
        }
        for t in 90..110 {
            locations.push(fix(295.0 + 5.0 * (t - 89) as f64, t, 5.0));
        }

        let heart_rate = [(10, 130), (70, 110), (100, 150)]
            .into_iter()
            .map(|(t, bpm)| HeartRateSample {
                bpm,
                time: fix(0.0, t, 0.0).time,
            })
            .collect();

        Recording {
            filename: None,
            locations,
            heart_rate,
        }
    }

    #[test]
    fn replay_auto_pauses_at_the_lights() {
        let finished = replay_recording(&lights_recording(), TrackingConfig::default()).unwrap();
        let summary = &finished.summary;

        let types: Vec<_> = finished.events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Paused, EventType::Stopped]);
        assert_eq!(finished.events[0].note.as_deref(), Some("Auto-pause (stationary)"));

        // Stopped from 65s, paused at 81s, resumed at 92s.
        assert_eq!(finished.events[0].time, fix(0.0, 81, 0.0).time);
        assert_eq!(summary.paused_time, Duration::seconds(11));
        assert_eq!(summary.elapsed, Duration::seconds(109));
        assert_eq!(summary.moving_time, Duration::seconds(98));

        // The stationary fixes add nothing.
        assert!((summary.distance_km - 0.395).abs() < 1e-3);
        assert!((summary.max_speed_kmh - 18.0).abs() < 1e-6);
        assert_eq!(summary.average_heart_rate, 130);
        assert_eq!(summary.max_heart_rate, 150);
        assert_eq!(finished.track_points.len(), 110);
        assert_eq!(finished.heart_rate.len(), 3);
    }

    #[test]
    fn replay_with_auto_pause_disabled() {
        let mut config = TrackingConfig::default();
        config.auto_pause.enabled = false;
        let finished = replay_recording(&lights_recording(), config).unwrap();
        assert!(finished.events.is_empty());
        assert_eq!(finished.summary.paused_time, Duration::ZERO);
        assert_eq!(finished.summary.moving_time, Duration::seconds(109));
    }

    #[test]
    fn empty_recording_is_an_error() {
        assert!(replay_recording(&Recording::default(), TrackingConfig::default()).is_err());
    }
}
