//! Works out a raw speed for each accepted sample, preferring what the
//! device reports and falling back to the speed implied by the change
//! in position.

use crate::{
    config::SpeedParameters,
    error::Rejection,
    model::{speed_kmh_from_duration, LocationSample},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedSource {
    Device,
    Position,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedEstimate {
    pub device_kmh: f64,
    pub position_kmh: f64,
    pub source: SpeedSource,
}

impl SpeedEstimate {
    /// The speed we decided to use.
    pub fn selected_kmh(&self) -> f64 {
        match self.source {
            SpeedSource::Device => self.device_kmh,
            SpeedSource::Position => self.position_kmh,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpeedEstimator {
    params: SpeedParameters,
}

impl SpeedEstimator {
    pub fn new(params: SpeedParameters) -> Self {
        Self { params }
    }

    /// Returns the estimate for `sample`, or `AbsurdSpeed` if the selected
    /// speed is not something a bicycle can do.
    pub fn estimate(
        &self,
        sample: &LocationSample,
        previous: Option<&LocationSample>,
    ) -> Result<SpeedEstimate, Rejection> {
        let device_kmh = sample.device_speed_kmh();
        let position_kmh = previous.map_or(0.0, |prev| position_speed_kmh(prev, sample));

        let source = if device_kmh > self.params.device_speed_floor_kmh {
            SpeedSource::Device
        } else {
            SpeedSource::Position
        };

        let estimate = SpeedEstimate {
            device_kmh,
            position_kmh,
            source,
        };

        let speed_kmh = estimate.selected_kmh();
        if speed_kmh > self.params.max_plausible_kmh {
            return Err(Rejection::AbsurdSpeed { speed_kmh });
        }

        Ok(estimate)
    }
}

/// Speed implied by moving from `prev` to `curr`. Zero if no time passed
/// (or the clock went backwards).
fn position_speed_kmh(prev: &LocationSample, curr: &LocationSample) -> f64 {
    let elapsed = curr.time - prev.time;
    if !elapsed.is_positive() {
        return 0.0;
    }

    speed_kmh_from_duration(prev.distance_metres(curr), elapsed)
}
