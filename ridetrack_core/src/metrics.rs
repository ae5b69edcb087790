//! Accumulates the numbers that describe a ride: distance, climbing,
//! speed and heart-rate statistics, and the route itself.

use time::Duration;

use crate::{
    config::MetricsParameters,
    model::{speed_kmh_from_duration, HeartRateSample, LocationSample, RoutePoint, TrackPoint},
};

#[derive(Debug, Clone, Default)]
pub struct RideMetrics {
    params: MetricsParameters,
    distance_km: f64,
    elevation_gain_metres: f64,
    elevation_loss_metres: f64,
    last_altitude: Option<f64>,
    current_speed_kmh: f64,
    max_speed_kmh: f64,
    average_speed_kmh: f64,
    max_heart_rate: u16,
    heart_rate_total: u64,
    heart_rate: Vec<HeartRateSample>,
    route: Vec<RoutePoint>,
    track_points: Vec<TrackPoint>,
}

impl RideMetrics {
    pub fn new(params: MetricsParameters) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Records a new filtered speed. The maximum is kept whatever the
    /// state of the ride.
    pub fn record_speed(&mut self, speed_kmh: f64) {
        self.current_speed_kmh = speed_kmh;
        if speed_kmh > self.max_speed_kmh {
            self.max_speed_kmh = speed_kmh;
        }
    }

    /// Adds a move to the total distance, unless it is small enough to
    /// be GPS jitter. Returns true if it was added.
    pub fn record_distance(&mut self, displacement_metres: f64) -> bool {
        if displacement_metres > self.params.min_distance_metres {
            self.distance_km += displacement_metres / 1000.0;
            true
        } else {
            false
        }
    }

    /// Compares `altitude` with the previous reading and accumulates the
    /// gain or loss. Returns the signed change when it was big enough to
    /// count. Fixes without an altitude are skipped and do not reset the
    /// reference.
    pub fn record_altitude(&mut self, altitude: Option<f64>) -> Option<f64> {
        let altitude = altitude?;
        let previous = self.last_altitude.replace(altitude)?;

        let change = altitude - previous;
        if change.abs() < self.params.min_elevation_change_metres {
            return None;
        }

        if change > 0.0 {
            self.elevation_gain_metres += change;
        } else {
            self.elevation_loss_metres += change.abs();
        }

        Some(change)
    }

    pub fn record_route_point(&mut self, sample: &LocationSample) {
        self.route.push(RoutePoint {
            lat: sample.lat,
            lon: sample.lon,
        });
    }

    pub fn record_track_point(&mut self, sample: &LocationSample, filtered_speed_kmh: f64) {
        self.track_points.push(TrackPoint::new(sample, filtered_speed_kmh));
    }

    pub fn record_heart_rate(&mut self, sample: HeartRateSample) {
        if sample.bpm > self.max_heart_rate {
            self.max_heart_rate = sample.bpm;
        }
        self.heart_rate_total += u64::from(sample.bpm);
        self.heart_rate.push(sample);
    }

    /// Recalculates the average speed over `active` time, i.e. the time
    /// the ride has not been paused.
    pub fn update_average_speed(&mut self, active: Duration) {
        if active.is_positive() {
            self.average_speed_kmh = speed_kmh_from_duration(self.distance_km * 1000.0, active);
        }
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn elevation_gain_metres(&self) -> f64 {
        self.elevation_gain_metres
    }

    pub fn elevation_loss_metres(&self) -> f64 {
        self.elevation_loss_metres
    }

    pub fn current_speed_kmh(&self) -> f64 {
        self.current_speed_kmh
    }

    pub fn max_speed_kmh(&self) -> f64 {
        self.max_speed_kmh
    }

    pub fn average_speed_kmh(&self) -> f64 {
        self.average_speed_kmh
    }

    pub fn max_heart_rate(&self) -> u16 {
        self.max_heart_rate
    }

    /// The mean of every heart-rate reading so far, truncated to a
    /// whole bpm. Zero if there are none.
    pub fn average_heart_rate(&self) -> u16 {
        if self.heart_rate.is_empty() {
            return 0;
        }
        (self.heart_rate_total / self.heart_rate.len() as u64) as u16
    }

    pub fn heart_rate(&self) -> &[HeartRateSample] {
        &self.heart_rate
    }

    pub fn route(&self) -> &[RoutePoint] {
        &self.route
    }

    pub fn track_points(&self) -> &[TrackPoint] {
        &self.track_points
    }

    pub fn polyline(&self) -> String {
        encode_polyline(&self.route)
    }

    /// Hands over the collected samples, leaving the metrics empty of them.
    pub fn take_samples(&mut self) -> (Vec<TrackPoint>, Vec<HeartRateSample>) {
        (
            std::mem::take(&mut self.track_points),
            std::mem::take(&mut self.heart_rate),
        )
    }
}

/// Serializes a route as `lat,lon` pairs separated by `|`. Stores and
/// exports depend on this exact format.
pub fn encode_polyline(points: &[RoutePoint]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", format_coordinate(p.lat), format_coordinate(p.lon)))
        .collect::<Vec<_>>()
        .join("|")
}

/// Shortest round-trip form of `value`, always with a fractional part,
/// switching to `d.dE-n` notation outside `[1e-3, 1e7)`. So `51.0`,
/// `-0.12` and `-5.0E-4`.
fn format_coordinate(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 || (1e-3..1e7).contains(&magnitude) {
        let s = value.to_string();
        return if s.contains('.') { s } else { format!("{s}.0") };
    }

    let s = format!("{value:e}");
    match s.split_once('e') {
        Some((mantissa, exponent)) if mantissa.contains('.') => format!("{mantissa}E{exponent}"),
        Some((mantissa, exponent)) => format!("{mantissa}.0E{exponent}"),
        None => s,
    }
}
