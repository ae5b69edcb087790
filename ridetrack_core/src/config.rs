//! The tunable parameters of the tracking engine. The defaults are the
//! values the engine was calibrated with on 1Hz phone GPS; the CLI lets
//! some of them be overridden.

use serde::{Deserialize, Serialize};
use time::Duration;

/// All the parameters, grouped by the component that uses them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub gate: GateParameters,
    pub speed: SpeedParameters,
    pub filter: FilterParameters,
    pub auto_pause: AutoPauseParameters,
    pub metrics: MetricsParameters,
    pub events: EventParameters,
}

/// These are the parameters that decide whether a GPS fix is believable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateParameters {
    /// Fixes with a horizontal accuracy worse than this are always dropped.
    pub max_accuracy_metres: f64,

    /// A jump is a move of more than `jump_displacement_metres` in less
    /// than `jump_window` while the accuracy is worse than
    /// `jump_accuracy_metres`.
    pub jump_displacement_metres: f64,
    pub jump_window: Duration,
    pub jump_accuracy_metres: f64,

    /// Anything further than this from the previous fix is dropped,
    /// however long ago that fix was.
    pub teleport_metres: f64,
}

impl Default for GateParameters {
    fn default() -> Self {
        Self {
            max_accuracy_metres: 25.0,
            jump_displacement_metres: 100.0,
            jump_window: Duration::seconds(10),
            jump_accuracy_metres: 15.0,
            teleport_metres: 500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedParameters {
    /// The device speed is trusted when it is above this, otherwise
    /// we fall back to the speed derived from position changes.
    pub device_speed_floor_kmh: f64,

    /// Nobody rides a bicycle this fast. Samples that claim to are dropped.
    pub max_plausible_kmh: f64,
}

impl Default for SpeedParameters {
    fn default() -> Self {
        Self {
            device_speed_floor_kmh: 0.5,
            max_plausible_kmh: 100.0,
        }
    }
}

/// Parameters of the median -> EMA -> stop detector pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParameters {
    /// How far back raw observations are kept.
    pub window: Duration,
    /// The median is taken over at most this many of the latest observations...
    pub median_size: usize,
    /// ...and only once there are at least this many.
    pub median_min_samples: usize,
    /// Time constant of the exponential moving average.
    pub tau: Duration,
    /// You are considered "Stopping" when the median drops below this.
    pub stop_threshold_kmh: f64,
    /// Once stopped, the median has to go above this before you are
    /// moving again. Higher than the stop threshold, which is what gives
    /// the hysteresis.
    pub resume_threshold_kmh: f64,
    /// How long the median must stay below the stop threshold.
    pub stop_duration: Duration,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            window: Duration::seconds(10),
            median_size: 5,
            median_min_samples: 3,
            tau: Duration::milliseconds(3000),
            stop_threshold_kmh: 0.5 * 3.6,
            resume_threshold_kmh: 1.0 * 3.6,
            stop_duration: Duration::milliseconds(2500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoPauseParameters {
    pub enabled: bool,
    /// Filtered speed below which the rider counts as stationary.
    pub stationary_speed_kmh: f64,
    /// How long the rider must be stationary before the ride pauses.
    pub pause_after: Duration,
    /// Filtered speed at which an automatic pause is ended.
    pub resume_speed_kmh: f64,
}

impl Default for AutoPauseParameters {
    fn default() -> Self {
        Self {
            enabled: true,
            stationary_speed_kmh: 0.5,
            pause_after: Duration::milliseconds(15000),
            resume_speed_kmh: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsParameters {
    /// Moves shorter than this are GPS jitter and don't count as distance.
    pub min_distance_metres: f64,
    /// Altitude changes smaller than this are ignored.
    pub min_elevation_change_metres: f64,
}

impl Default for MetricsParameters {
    fn default() -> Self {
        Self {
            min_distance_metres: 1.0,
            min_elevation_change_metres: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventParameters {
    pub sprint_speed_kmh: f64,
    /// If set, at most one Sprint event is recorded per cooldown. When
    /// `None` every qualifying speed update records one.
    pub sprint_cooldown: Option<Duration>,
    /// Altitude change between consecutive fixes that marks the start
    /// of a climb or descent.
    pub climb_change_metres: f64,
}

impl Default for EventParameters {
    fn default() -> Self {
        Self {
            sprint_speed_kmh: 35.0,
            sprint_cooldown: None,
            climb_change_metres: 5.0,
        }
    }
}
