//! The speed filter pipeline: median filter for spike removal, an
//! exponential moving average for smoothing, and a stop detector with
//! hysteresis so the displayed speed drops cleanly to zero when the
//! rider stops instead of wandering around at 1-2 km/h.

use std::collections::VecDeque;

use log::{debug, info};
use time::{Duration, OffsetDateTime};

use crate::config::FilterParameters;

/// A raw speed, as it went into the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSpeedObservation {
    pub speed_kmh: f64,
    pub time: OffsetDateTime,
}

/// The state of the stop detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    Moving,
    /// The median has been below the stop threshold since `since`, but
    /// not for long enough to be sure.
    EnteringStop { since: OffsetDateTime },
    /// Confirmed stopped. `since` is when the median first dropped below
    /// the threshold, kept for logging.
    Stopped { since: OffsetDateTime },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Smoothed {
    speed_kmh: f64,
    time: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct SpeedFilter {
    params: FilterParameters,
    window: VecDeque<RawSpeedObservation>,
    smoothed: Option<Smoothed>,
    stop_state: StopState,
}

impl Default for SpeedFilter {
    fn default() -> Self {
        Self::new(FilterParameters::default())
    }
}

impl SpeedFilter {
    pub fn new(params: FilterParameters) -> Self {
        Self {
            params,
            window: VecDeque::new(),
            smoothed: None,
            stop_state: StopState::Moving,
        }
    }

    /// Forget everything, ready for a new ride.
    pub fn reset(&mut self) {
        self.window.clear();
        self.smoothed = None;
        self.stop_state = StopState::Moving;
    }

    pub fn stop_state(&self) -> StopState {
        self.stop_state
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.stop_state, StopState::Stopped { .. })
    }

    /// The latest output of the EMA stage.
    pub fn smoothed_kmh(&self) -> Option<f64> {
        self.smoothed.map(|s| s.speed_kmh)
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Feeds one raw speed through the pipeline and returns the speed
    /// to display. Never negative.
    pub fn process(&mut self, raw_kmh: f64, now: OffsetDateTime) -> f64 {
        self.window.push_back(RawSpeedObservation {
            speed_kmh: raw_kmh,
            time: now,
        });
        let cutoff = now - self.params.window;
        self.window.retain(|obs| obs.time >= cutoff);

        let median = self.median().unwrap_or(raw_kmh);
        let smoothed = self.smooth(median, now);
        let filtered = self.detect_stop(median, smoothed, now).max(0.0);

        debug!(
            "Speed filter: raw={raw_kmh:.2} median={median:.2} smoothed={smoothed:.2} final={filtered:.2} state={:?}",
            self.stop_state
        );

        filtered
    }

    /// Median of the most recent observations, or `None` if there are
    /// too few for the median to mean anything. With an even count the
    /// lower of the two middle values is used.
    fn median(&self) -> Option<f64> {
        let n = self.window.len().min(self.params.median_size);
        if n < self.params.median_min_samples {
            return None;
        }

        let mut recent: Vec<f64> = self
            .window
            .iter()
            .skip(self.window.len() - n)
            .map(|obs| obs.speed_kmh)
            .collect();
        recent.sort_by(f64::total_cmp);
        Some(recent[(n - 1) / 2])
    }

    fn smooth(&mut self, median: f64, now: OffsetDateTime) -> f64 {
        let speed_kmh = match self.smoothed {
            Some(prev) => {
                let delta = (now - prev.time).max(Duration::ZERO);
                let alpha = 1.0 - (-delta.as_seconds_f64() / self.params.tau.as_seconds_f64()).exp();
                prev.speed_kmh + alpha * (median - prev.speed_kmh)
            }
            None => median,
        };

        self.smoothed = Some(Smoothed {
            speed_kmh,
            time: now,
        });
        speed_kmh
    }

    fn detect_stop(&mut self, median: f64, smoothed: f64, now: OffsetDateTime) -> f64 {
        match self.stop_state {
            StopState::Stopped { since } => {
                if median > self.params.resume_threshold_kmh {
                    info!(
                        "Resuming from stop state, stopped for {}",
                        now - since
                    );
                    self.stop_state = StopState::Moving;
                    smoothed
                } else {
                    0.0
                }
            }
            _ if median < self.params.stop_threshold_kmh => {
                let since = match self.stop_state {
                    StopState::EnteringStop { since } => since,
                    _ => {
                        self.stop_state = StopState::EnteringStop { since: now };
                        now
                    }
                };

                if now - since >= self.params.stop_duration {
                    info!("Entering stop state");
                    self.stop_state = StopState::Stopped { since };
                    0.0
                } else {
                    // Hold the previous speed while we make our minds up.
                    smoothed
                }
            }
            _ => {
                self.stop_state = StopState::Moving;
                smoothed
            }
        }
    }
}
