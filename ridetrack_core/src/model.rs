use std::fmt;

use geo::{point, HaversineDistance, Point};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// One raw GPS fix, as delivered by the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lon: f64,
    /// Not every fix has an altitude.
    pub altitude: Option<f64>,
    /// The horizontal accuracy, in metres. Smaller is better.
    pub accuracy_metres: f64,
    /// The speed reported by the device, in m/s. Zero when unknown.
    pub speed_mps: f64,
    /// When the fix was captured.
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl LocationSample {
    /// Makes a geo-Point based on the lat-lon coordinates of this sample.
    /// n.b. x=lon, y=lat. If you do it the other way round the
    /// distances are wrong - a lot wrong.
    pub fn as_geo_point(&self) -> Point {
        point! { x: self.lon, y: self.lat }
    }

    /// Great-circle distance to `other`, in metres.
    pub fn distance_metres(&self, other: &LocationSample) -> f64 {
        self.as_geo_point().haversine_distance(&other.as_geo_point())
    }

    /// The device speed converted to km/h.
    pub fn device_speed_kmh(&self) -> f64 {
        self.speed_mps * 3.6
    }
}

/// A single reading from the heart-rate strap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub bpm: u16,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

/// An accepted sample in the form it is handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub altitude: Option<f64>,
    pub accuracy_metres: f64,
    /// As reported by the device, in m/s.
    pub speed_mps: f64,
    /// The output of the speed filter when this point was processed.
    pub filtered_speed_kmh: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl TrackPoint {
    pub fn new(sample: &LocationSample, filtered_speed_kmh: f64) -> Self {
        Self {
            lat: sample.lat,
            lon: sample.lon,
            altitude: sample.altitude,
            accuracy_metres: sample.accuracy_metres,
            speed_mps: sample.speed_mps,
            filtered_speed_kmh,
            time: sample.time,
        }
    }
}

/// A point of the route drawn on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RideState {
    Idle,
    Active,
    Paused,
    Finished,
}

impl fmt::Display for RideState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RideState::Idle => write!(f, "Idle"),
            RideState::Active => write!(f, "Active"),
            RideState::Paused => write!(f, "Paused"),
            RideState::Finished => write!(f, "Finished"),
        }
    }
}

/// The lifecycle commands a ride understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Finish,
    Discard,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start => write!(f, "start"),
            Command::Pause => write!(f, "pause"),
            Command::Resume => write!(f, "resume"),
            Command::Finish => write!(f, "finish"),
            Command::Discard => write!(f, "discard"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Marks the end of a pause or stop, recorded when the ride resumes.
    Stopped,
    Paused,
    Sprint,
    ClimbStart,
    ClimbEnd,
    DescentStart,
    DescentEnd,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Stopped => write!(f, "Stopped"),
            EventType::Paused => write!(f, "Paused"),
            EventType::Sprint => write!(f, "Sprint"),
            EventType::ClimbStart => write!(f, "Climb Start"),
            EventType::ClimbEnd => write!(f, "Climb End"),
            EventType::DescentStart => write!(f, "Descent Start"),
            EventType::DescentEnd => write!(f, "Descent End"),
        }
    }
}

/// Something noteworthy that happened during the ride. Events are
/// only ever appended, never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideEvent {
    pub event_type: EventType,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub lat: f64,
    pub lon: f64,
    pub altitude: Option<f64>,
    /// Speed at the time of the event, in km/h.
    pub speed_kmh: Option<f64>,
    pub note: Option<String>,
}

impl RideEvent {
    /// Creates an event positioned at `location`.
    pub fn at(
        event_type: EventType,
        location: &LocationSample,
        time: OffsetDateTime,
        note: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            time,
            lat: location.lat,
            lon: location.lon,
            altitude: location.altitude,
            speed_kmh: Some(location.device_speed_kmh()),
            note: Some(note.into()),
        }
    }
}

/// The identifier a store gives to a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RideId(pub u64);

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The finalized record of a ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideSummary {
    pub ride_id: Option<RideId>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    /// Wall-clock time between start and finish.
    pub elapsed: Duration,
    /// Total time spent Paused, manual and automatic.
    pub paused_time: Duration,
    /// `elapsed - paused_time`. This is what the ride timer shows.
    pub moving_time: Duration,
    pub distance_km: f64,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
    /// Zero when no heart-rate strap was connected.
    pub average_heart_rate: u16,
    pub max_heart_rate: u16,
    pub elevation_gain_metres: f64,
    pub elevation_loss_metres: f64,
    /// The route, see [`crate::metrics::encode_polyline`].
    pub polyline: String,
    pub completed: bool,
}

/// Everything a finished ride hands over to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRide {
    pub summary: RideSummary,
    pub track_points: Vec<TrackPoint>,
    pub heart_rate: Vec<HeartRateSample>,
    pub events: Vec<RideEvent>,
}

/// Calculates speed in kmh from metres and a Duration.
pub fn speed_kmh_from_duration(metres: f64, time: Duration) -> f64 {
    (metres / time.as_seconds_f64()) * 3.6
}
