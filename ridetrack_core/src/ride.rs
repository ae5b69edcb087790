//! The ride state machine. It owns every other component, decides what
//! runs in which state, and is the only thing that mutates a ride.
//!
//! ```text
//! Idle --start--> Active --pause / auto-pause--> Paused
//!                 Active <--resume / auto-resume-- Paused
//! Active | Paused --finish | discard--> Finished --> Idle
//! ```
//!
//! Everything here is synchronous and takes the current time as an
//! argument; the [`crate::service`] module supplies the clock, the
//! channels and the duration ticker.

use std::fmt;

use log::{debug, info};
use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::{
    config::{AutoPauseParameters, TrackingConfig},
    error::{Rejection, RideError},
    events::{paused_event, resumed_event, EventDetector},
    filter::SpeedFilter,
    gate::SampleGate,
    metrics::RideMetrics,
    model::{
        Command, FinishedRide, HeartRateSample, LocationSample, RideEvent, RideState,
        RideSummary, RoutePoint,
    },
    speed::SpeedEstimator,
};

/// A state change the ride made on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoTransition {
    Pause,
    Resume,
}

/// Watches the filtered speed and decides when to pause or resume a
/// ride automatically.
#[derive(Debug, Clone, Default)]
pub struct AutoPauseMonitor {
    params: AutoPauseParameters,
    stationary_since: Option<OffsetDateTime>,
}

impl AutoPauseMonitor {
    pub fn new(params: AutoPauseParameters) -> Self {
        Self {
            params,
            stationary_since: None,
        }
    }

    pub fn reset(&mut self) {
        self.stationary_since = None;
    }

    /// When the rider became stationary, if they currently are.
    pub fn stationary_since(&self) -> Option<OffsetDateTime> {
        self.stationary_since
    }

    pub fn check(
        &mut self,
        state: RideState,
        manual_pause: bool,
        speed_kmh: f64,
        now: OffsetDateTime,
    ) -> Option<AutoTransition> {
        if !self.params.enabled {
            return None;
        }

        match state {
            RideState::Active => {
                if speed_kmh >= self.params.stationary_speed_kmh {
                    if self.stationary_since.take().is_some() {
                        debug!("Speed increased to {speed_kmh:.2} km/h, resetting pause timer");
                    }
                    return None;
                }

                match self.stationary_since {
                    None => {
                        debug!("Speed below stationary threshold ({speed_kmh:.2} km/h), starting pause timer");
                        self.stationary_since = Some(now);
                        None
                    }
                    Some(since) if now - since > self.params.pause_after => {
                        self.stationary_since = None;
                        Some(AutoTransition::Pause)
                    }
                    Some(_) => None,
                }
            }
            RideState::Paused => {
                if !manual_pause && speed_kmh >= self.params.resume_speed_kmh {
                    self.stationary_since = None;
                    Some(AutoTransition::Resume)
                } else {
                    None
                }
            }
            RideState::Idle | RideState::Finished => {
                self.stationary_since = None;
                None
            }
        }
    }
}

/// The live, mutable record of the ride in progress.
#[derive(Debug, Clone)]
pub struct RideSnapshot {
    start_time: OffsetDateTime,
    paused_time: Duration,
    pause_started: Option<OffsetDateTime>,
    duration: Duration,
    metrics: RideMetrics,
    events: Vec<RideEvent>,
    /// Index of the first event not yet handed out by `take_new_events`.
    published_events: usize,
}

impl RideSnapshot {
    fn new(start_time: OffsetDateTime, metrics: RideMetrics) -> Self {
        Self {
            start_time,
            paused_time: Duration::ZERO,
            pause_started: None,
            duration: Duration::ZERO,
            metrics,
            events: Vec::new(),
            published_events: 0,
        }
    }

    pub fn start_time(&self) -> OffsetDateTime {
        self.start_time
    }

    /// Total time spent in completed pauses.
    pub fn paused_time(&self) -> Duration {
        self.paused_time
    }

    /// The ride duration as of the last tick.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn metrics(&self) -> &RideMetrics {
        &self.metrics
    }

    pub fn events(&self) -> &[RideEvent] {
        &self.events
    }

    /// Time since the start, less all the time spent paused (including
    /// a pause that is still going on).
    pub fn active_duration(&self, now: OffsetDateTime) -> Duration {
        let open_pause = self
            .pause_started
            .map_or(Duration::ZERO, |started| (now - started).max(Duration::ZERO));
        (now - self.start_time - self.paused_time - open_pause).max(Duration::ZERO)
    }

    fn emit(&mut self, event: RideEvent) {
        info!("Ride event: {} ({})", event.event_type, event.note.as_deref().unwrap_or(""));
        self.events.push(event);
    }

    fn close_pause(&mut self, now: OffsetDateTime) {
        if let Some(started) = self.pause_started.take() {
            self.paused_time += (now - started).max(Duration::ZERO);
        }
    }
}

/// What happened to a location sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationOutcome {
    /// There is no ride in progress.
    Ignored,
    Rejected(Rejection),
    Processed {
        speed_kmh: f64,
        transition: Option<AutoTransition>,
    },
}

/// The numbers shown to the rider, copied out of the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideStatus {
    pub state: RideState,
    pub manual_pause: bool,
    pub speed_kmh: f64,
    pub distance_km: f64,
    pub duration: Duration,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub heart_rate: u16,
    pub average_heart_rate: u16,
    pub max_heart_rate: u16,
    pub elevation_gain_metres: f64,
    pub elevation_loss_metres: f64,
    pub route_points: usize,
    pub events: usize,
}

impl Default for RideStatus {
    fn default() -> Self {
        Self {
            state: RideState::Idle,
            manual_pause: false,
            speed_kmh: 0.0,
            distance_km: 0.0,
            duration: Duration::ZERO,
            average_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            heart_rate: 0,
            average_heart_rate: 0,
            max_heart_rate: 0,
            elevation_gain_metres: 0.0,
            elevation_loss_metres: 0.0,
            route_points: 0,
            events: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RideTracker {
    config: TrackingConfig,
    state: RideState,
    /// Distinguishes a manual pause (which only `resume` can end) from an
    /// automatic one.
    manual_pause: bool,
    gate: SampleGate,
    estimator: SpeedEstimator,
    filter: SpeedFilter,
    detector: EventDetector,
    auto_pause: AutoPauseMonitor,
    last_location: Option<LocationSample>,
    heart_rate: u16,
    ride: Option<RideSnapshot>,
}

impl Default for RideTracker {
    fn default() -> Self {
        Self::new(TrackingConfig::default())
    }
}

impl RideTracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            gate: SampleGate::new(config.gate.clone()),
            estimator: SpeedEstimator::new(config.speed.clone()),
            filter: SpeedFilter::new(config.filter.clone()),
            detector: EventDetector::new(config.events.clone()),
            auto_pause: AutoPauseMonitor::new(config.auto_pause.clone()),
            config,
            state: RideState::Idle,
            manual_pause: false,
            last_location: None,
            heart_rate: 0,
            ride: None,
        }
    }

    pub fn state(&self) -> RideState {
        self.state
    }

    pub fn is_manual_pause(&self) -> bool {
        self.manual_pause
    }

    pub fn ride(&self) -> Option<&RideSnapshot> {
        self.ride.as_ref()
    }

    pub fn filter(&self) -> &SpeedFilter {
        &self.filter
    }

    pub fn last_location(&self) -> Option<&LocationSample> {
        self.last_location.as_ref()
    }

    /// A copy of the route so far, for redrawing the map.
    pub fn route_points(&self) -> Vec<RoutePoint> {
        self.ride
            .as_ref()
            .map(|ride| ride.metrics.route().to_vec())
            .unwrap_or_default()
    }

    /// Distance and route only accumulate while riding, or while
    /// automatically paused (so the metres covered while the pause is
    /// being decided are not lost).
    pub fn accrues_distance(&self) -> bool {
        self.state == RideState::Active || (self.state == RideState::Paused && !self.manual_pause)
    }

    /// Events added since the last call.
    pub fn take_new_events(&mut self) -> Vec<RideEvent> {
        match self.ride.as_mut() {
            Some(ride) => {
                let new = ride.events[ride.published_events..].to_vec();
                ride.published_events = ride.events.len();
                new
            }
            None => Vec::new(),
        }
    }

    pub fn status(&self) -> RideStatus {
        let mut status = RideStatus {
            state: self.state,
            manual_pause: self.manual_pause,
            heart_rate: self.heart_rate,
            ..Default::default()
        };

        if let Some(ride) = &self.ride {
            let m = &ride.metrics;
            status.speed_kmh = m.current_speed_kmh();
            status.distance_km = m.distance_km();
            status.duration = ride.duration;
            status.average_speed_kmh = m.average_speed_kmh();
            status.max_speed_kmh = m.max_speed_kmh();
            status.average_heart_rate = m.average_heart_rate();
            status.max_heart_rate = m.max_heart_rate();
            status.elevation_gain_metres = m.elevation_gain_metres();
            status.elevation_loss_metres = m.elevation_loss_metres();
            status.route_points = m.route().len();
            status.events = ride.events.len();
        }

        status
    }

    fn invalid(&self, command: Command) -> RideError {
        RideError::InvalidTransition {
            state: self.state,
            command,
        }
    }

    pub fn start(&mut self, now: OffsetDateTime) -> Result<(), RideError> {
        if self.state != RideState::Idle {
            return Err(self.invalid(Command::Start));
        }

        self.filter.reset();
        self.detector.reset();
        self.auto_pause.reset();
        self.last_location = None;
        self.manual_pause = false;
        self.ride = Some(RideSnapshot::new(
            now,
            RideMetrics::new(self.config.metrics.clone()),
        ));
        self.state = RideState::Active;
        info!("Ride started at {now}");
        Ok(())
    }

    pub fn pause(&mut self, now: OffsetDateTime) -> Result<(), RideError> {
        if self.state != RideState::Active {
            return Err(self.invalid(Command::Pause));
        }

        info!("Manual pause");
        self.enter_pause(now, true);
        Ok(())
    }

    pub fn resume(&mut self, now: OffsetDateTime) -> Result<(), RideError> {
        if self.state != RideState::Paused {
            return Err(self.invalid(Command::Resume));
        }

        info!("Manual resume");
        self.leave_pause(now);
        Ok(())
    }

    /// Ends the ride, returning everything that should be persisted.
    /// The tracker is back to Idle afterwards.
    pub fn finish(&mut self, now: OffsetDateTime) -> Result<FinishedRide, RideError> {
        if !matches!(self.state, RideState::Active | RideState::Paused) {
            return Err(self.invalid(Command::Finish));
        }
        let Some(mut ride) = self.ride.take() else {
            return Err(self.invalid(Command::Finish));
        };

        self.state = RideState::Finished;
        ride.close_pause(now);

        let elapsed = (now - ride.start_time).max(Duration::ZERO);
        let moving_time = (elapsed - ride.paused_time).max(Duration::ZERO);
        ride.metrics.update_average_speed(moving_time);

        let summary = RideSummary {
            ride_id: None,
            start_time: ride.start_time,
            end_time: now,
            elapsed,
            paused_time: ride.paused_time,
            moving_time,
            distance_km: ride.metrics.distance_km(),
            average_speed_kmh: ride.metrics.average_speed_kmh(),
            max_speed_kmh: ride.metrics.max_speed_kmh(),
            average_heart_rate: ride.metrics.average_heart_rate(),
            max_heart_rate: ride.metrics.max_heart_rate(),
            elevation_gain_metres: ride.metrics.elevation_gain_metres(),
            elevation_loss_metres: ride.metrics.elevation_loss_metres(),
            polyline: ride.metrics.polyline(),
            completed: true,
        };

        let (track_points, heart_rate) = ride.metrics.take_samples();
        info!(
            "Ride finished: {:.2} km in {}, {} points, {} heart-rate readings, {} events",
            summary.distance_km,
            summary.moving_time,
            track_points.len(),
            heart_rate.len(),
            ride.events.len()
        );

        self.reset_to_idle();
        Ok(FinishedRide {
            summary,
            track_points,
            heart_rate,
            events: ride.events,
        })
    }

    /// Throws the ride away.
    pub fn discard(&mut self) -> Result<(), RideError> {
        if !matches!(self.state, RideState::Active | RideState::Paused) {
            return Err(self.invalid(Command::Discard));
        }

        self.state = RideState::Finished;
        self.ride = None;
        info!("Ride discarded");
        self.reset_to_idle();
        Ok(())
    }

    /// The once-a-second duration update. Only does anything while
    /// Active; returns the new duration.
    pub fn tick(&mut self, now: OffsetDateTime) -> Option<Duration> {
        if self.state != RideState::Active {
            return None;
        }

        let ride = self.ride.as_mut()?;
        ride.duration = ride.active_duration(now);
        ride.metrics.update_average_speed(ride.duration);
        Some(ride.duration)
    }

    pub fn on_heart_rate(&mut self, sample: HeartRateSample) {
        self.heart_rate = sample.bpm;
        if let Some(ride) = self.ride.as_mut() {
            ride.metrics.record_heart_rate(sample);
        }
    }

    /// Processes a sample, timing auto-pause by the sample's own clock.
    pub fn on_location(&mut self, sample: LocationSample) -> LocationOutcome {
        self.on_location_at(sample, sample.time)
    }

    /// Processes a sample that arrived at `now`. Auto-pause and resume
    /// are timed and stamped with `now`, the same clock that drives the
    /// commands and the ticks, so pause arithmetic never mixes the GPS
    /// clock with another one. The speed filter still works in sample
    /// time.
    pub fn on_location_at(&mut self, sample: LocationSample, now: OffsetDateTime) -> LocationOutcome {
        let accrues_distance = self.accrues_distance();
        let Some(ride) = self.ride.as_mut() else {
            debug!("No ride in progress, ignoring location sample");
            return LocationOutcome::Ignored;
        };

        let accepted = match self.gate.accept(&sample, self.last_location.as_ref()) {
            Ok(accepted) => accepted,
            Err(rejection) => {
                debug!("Rejecting location: {rejection}");
                return LocationOutcome::Rejected(rejection);
            }
        };

        let estimate = match self.estimator.estimate(&sample, self.last_location.as_ref()) {
            Ok(estimate) => estimate,
            Err(rejection) => {
                debug!("Rejecting location: {rejection}");
                return LocationOutcome::Rejected(rejection);
            }
        };
        debug!(
            "Speed comparison - device: {:.2} km/h, position: {:.2} km/h, using {:?}",
            estimate.device_kmh, estimate.position_kmh, estimate.source
        );

        let speed_kmh = self.filter.process(estimate.selected_kmh(), sample.time);
        ride.metrics.record_speed(speed_kmh);
        if let Some(event) = self.detector.check_sprint(speed_kmh, &sample) {
            ride.emit(event);
        }

        let transition = self
            .auto_pause
            .check(self.state, self.manual_pause, speed_kmh, now);

        if let Some(change) = ride.metrics.record_altitude(sample.altitude) {
            if let Some(event) = self.detector.check_elevation(change, &sample) {
                ride.emit(event);
            }
        }

        ride.metrics.record_track_point(&sample, speed_kmh);

        if accrues_distance {
            if let Some(metres) = accepted.displacement_metres {
                if ride.metrics.record_distance(metres) {
                    debug!("Distance now {:.3} km (moved {metres:.1}m)", ride.metrics.distance_km());
                }
            }
            ride.metrics.record_route_point(&sample);
        }

        self.last_location = Some(sample);

        // Applied last, so this sample counts under the state it arrived in.
        match transition {
            Some(AutoTransition::Pause) => {
                info!("Auto-pausing ride, stationary for more than {}", self.config.auto_pause.pause_after);
                self.enter_pause(now, false);
            }
            Some(AutoTransition::Resume) => {
                info!("Auto-resuming ride at {speed_kmh:.1} km/h");
                self.leave_pause(now);
            }
            None => {}
        }

        LocationOutcome::Processed {
            speed_kmh,
            transition,
        }
    }

    fn enter_pause(&mut self, now: OffsetDateTime, manual: bool) {
        self.state = RideState::Paused;
        self.manual_pause = manual;
        if let Some(ride) = self.ride.as_mut() {
            ride.pause_started = Some(now);
            if let Some(location) = &self.last_location {
                ride.emit(paused_event(location, now, manual));
            }
        }
    }

    fn leave_pause(&mut self, now: OffsetDateTime) {
        self.state = RideState::Active;
        self.manual_pause = false;
        self.auto_pause.reset();
        if let Some(ride) = self.ride.as_mut() {
            ride.close_pause(now);
            if let Some(location) = &self.last_location {
                ride.emit(resumed_event(location, now));
            }
        }
    }

    fn reset_to_idle(&mut self) {
        self.ride = None;
        self.last_location = None;
        self.manual_pause = false;
        self.filter.reset();
        self.detector.reset();
        self.auto_pause.reset();
        self.state = RideState::Idle;
    }
}

impl fmt::Display for RideTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Tracking State ===")?;
        writeln!(f, "Ride State: {}", self.state)?;
        writeln!(f, "Manual Pause: {}", self.manual_pause)?;
        writeln!(f, "Stop Detector: {:?}", self.filter.stop_state())?;
        match &self.last_location {
            Some(l) => writeln!(f, "Last Location: {}, {}", l.lat, l.lon)?,
            None => writeln!(f, "Last Location: None")?,
        }
        if let Some(ride) = &self.ride {
            let m = &ride.metrics;
            writeln!(f, "Started: {}", ride.start_time)?;
            writeln!(f, "Duration: {} (paused {})", ride.duration, ride.paused_time)?;
            writeln!(f, "Distance: {:.3} km", m.distance_km())?;
            writeln!(f, "Speed: {:.1} km/h (max {:.1})", m.current_speed_kmh(), m.max_speed_kmh())?;
            writeln!(f, "Track Points: {}", m.track_points().len())?;
            writeln!(f, "Route Points: {}", m.route().len())?;
            writeln!(f, "Events: {}", ride.events.len())?;
        }
        write!(f, "======================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gate::tests::{sample_at, T0},
        model::EventType,
    };

    fn at(seconds: f64) -> OffsetDateTime {
        T0 + Duration::seconds_f64(seconds)
    }

    /// An accurate fix `north_metres` from the origin, reporting `speed_kmh`.
    fn fix(north_metres: f64, seconds: f64, speed_kmh: f64) -> LocationSample {
        let mut s = sample_at(north_metres, seconds, 5.0);
        s.speed_mps = speed_kmh / 3.6;
        s
    }

    /// Rides north at 18 km/h (10m every 2s) for `count` fixes from `start_metres`
    /// and `start_seconds`.
    fn ride_north(tracker: &mut RideTracker, start_metres: f64, start_seconds: f64, count: usize) {
        for i in 0..count {
            let i = i as f64;
            tracker.on_location(fix(start_metres + i * 10.0, start_seconds + i * 2.0, 0.0));
        }
    }

    fn event_types(tracker: &RideTracker) -> Vec<EventType> {
        tracker
            .ride()
            .unwrap()
            .events()
            .iter()
            .map(|e| e.event_type)
            .collect()
    }

    #[test]
    fn samples_are_ignored_without_a_ride() {
        let mut tracker = RideTracker::default();
        assert_eq!(tracker.on_location(fix(0.0, 0.0, 10.0)), LocationOutcome::Ignored);
        assert!(tracker.last_location().is_none());
        assert_eq!(tracker.state(), RideState::Idle);
    }

    #[test]
    fn inaccurate_samples_change_nothing() {
        let mut tracker = RideTracker::default();
        tracker.start(at(0.0)).unwrap();
        for t in 0..5 {
            let s = sample_at(t as f64 * 10.0, t as f64, 30.0);
            assert!(matches!(
                tracker.on_location(s),
                LocationOutcome::Rejected(Rejection::PoorAccuracy { .. })
            ));
        }
        let ride = tracker.ride().unwrap();
        assert!(ride.metrics().track_points().is_empty());
        assert!(ride.metrics().route().is_empty());
        assert_eq!(ride.metrics().distance_km(), 0.0);
        assert_eq!(tracker.filter().window_len(), 0);
        assert!(tracker.last_location().is_none());
    }

    #[test]
    fn distance_of_ten_ten_metre_moves() {
        let mut tracker = RideTracker::default();
        tracker.start(at(0.0)).unwrap();
        ride_north(&mut tracker, 0.0, 0.0, 11);

        let ride = tracker.ride().unwrap();
        assert!((ride.metrics().distance_km() - 0.1).abs() < 1e-3);
        assert_eq!(ride.metrics().route().len(), 11);
        assert_eq!(ride.metrics().track_points().len(), 11);
        assert_eq!(tracker.state(), RideState::Active);
    }

    #[test]
    fn absurd_speed_is_rejected_without_updating_last_location() {
        let mut tracker = RideTracker::default();
        tracker.start(at(0.0)).unwrap();
        tracker.on_location(fix(0.0, 0.0, 0.0));
        let outcome = tracker.on_location(fix(10.0, 1.0, 120.0));
        assert!(matches!(
            outcome,
            LocationOutcome::Rejected(Rejection::AbsurdSpeed { .. })
        ));
        assert_eq!(tracker.last_location().unwrap().lat, fix(0.0, 0.0, 0.0).lat);
        assert_eq!(tracker.ride().unwrap().metrics().track_points().len(), 1);
    }

    #[test]
    fn manual_pause_is_not_auto_resumed() {
        let mut tracker = RideTracker::default();
        tracker.start(at(0.0)).unwrap();
        ride_north(&mut tracker, 0.0, 0.0, 5);
        let distance = tracker.ride().unwrap().metrics().distance_km();

        tracker.pause(at(9.0)).unwrap();
        assert_eq!(tracker.state(), RideState::Paused);
        assert!(tracker.is_manual_pause());

        // Walking the bike along at 5 km/h.
        for i in 0..10 {
            let i = i as f64;
            tracker.on_location(fix(40.0 + i * 1.4, 10.0 + i, 5.0));
            assert_eq!(tracker.state(), RideState::Paused);
        }
        let ride = tracker.ride().unwrap();
        assert_eq!(ride.metrics().distance_km(), distance);
        assert_eq!(ride.metrics().route().len(), 5);
        assert_eq!(ride.metrics().track_points().len(), 15);

        tracker.resume(at(30.0)).unwrap();
        assert_eq!(tracker.state(), RideState::Active);
        assert!(!tracker.is_manual_pause());
        assert_eq!(tracker.ride().unwrap().paused_time(), Duration::seconds(21));
        assert_eq!(event_types(&tracker), vec![EventType::Paused, EventType::Stopped]);
        assert_eq!(
            tracker.ride().unwrap().events()[0].note.as_deref(),
            Some("Manual pause")
        );
    }

    #[test]
    fn auto_pause_and_resume() {
        let mut tracker = RideTracker::default();
        tracker.start(at(0.0)).unwrap();

        // Standing still, the device reporting a crawl of 0.2 km/h.
        for t in 0..16 {
            tracker.on_location(fix(0.0, t as f64, 0.2));
            assert_eq!(tracker.state(), RideState::Active, "paused too early at {t}s");
        }
        let outcome = tracker.on_location(fix(0.0, 16.0, 0.2));
        assert!(matches!(
            outcome,
            LocationOutcome::Processed {
                transition: Some(AutoTransition::Pause),
                ..
            }
        ));
        assert_eq!(tracker.state(), RideState::Paused);
        assert!(!tracker.is_manual_pause());
        assert_eq!(
            tracker.ride().unwrap().events()[0].note.as_deref(),
            Some("Auto-pause (stationary)")
        );

        // Off again at 10 km/h. The median needs three fast samples.
        let step = 10.0 / 3.6;
        tracker.on_location(fix(step, 17.0, 10.0));
        tracker.on_location(fix(2.0 * step, 18.0, 10.0));
        assert_eq!(tracker.state(), RideState::Paused);
        let outcome = tracker.on_location(fix(3.0 * step, 19.0, 10.0));
        assert!(matches!(
            outcome,
            LocationOutcome::Processed {
                transition: Some(AutoTransition::Resume),
                ..
            }
        ));
        assert_eq!(tracker.state(), RideState::Active);

        let ride = tracker.ride().unwrap();
        assert_eq!(ride.paused_time(), Duration::seconds(3));
        // The metres covered while auto-paused still count.
        assert!((ride.metrics().distance_km() - 3.0 * step / 1000.0).abs() < 1e-5);
        assert_eq!(event_types(&tracker), vec![EventType::Paused, EventType::Stopped]);
    }

    #[test]
    fn auto_pause_is_timed_by_the_arrival_clock() {
        let mut tracker = RideTracker::default();
        tracker.start(at(0.0)).unwrap();

        // The GPS clock runs 30s ahead of the clock the fixes arrive by.
        for t in 0..=16 {
            let t = t as f64;
            tracker.on_location_at(fix(0.0, t + 30.0, 0.0), at(t));
        }
        assert_eq!(tracker.state(), RideState::Paused);
        assert_eq!(tracker.ride().unwrap().events()[0].time, at(16.0));

        tracker.resume(at(76.0)).unwrap();
        assert_eq!(tracker.ride().unwrap().paused_time(), Duration::seconds(60));
        let finished = tracker.finish(at(76.0)).unwrap();
        assert_eq!(finished.summary.moving_time, Duration::seconds(16));
    }

    #[test]
    fn auto_pause_monitor_thresholds() {
        let mut monitor = AutoPauseMonitor::default();
        assert_eq!(monitor.check(RideState::Active, false, 0.2, at(0.0)), None);
        assert_eq!(monitor.stationary_since(), Some(at(0.0)));
        assert_eq!(monitor.check(RideState::Active, false, 0.2, at(15.0)), None);
        assert_eq!(
            monitor.check(RideState::Active, false, 0.2, at(15.001)),
            Some(AutoTransition::Pause)
        );
        assert_eq!(monitor.stationary_since(), None);

        assert_eq!(monitor.check(RideState::Paused, false, 1.9, at(16.0)), None);
        assert_eq!(monitor.check(RideState::Paused, true, 2.5, at(17.0)), None);
        assert_eq!(
            monitor.check(RideState::Paused, false, 2.5, at(18.0)),
            Some(AutoTransition::Resume)
        );
    }

    #[test]
    fn auto_pause_timer_resets_when_moving() {
        let mut monitor = AutoPauseMonitor::default();
        monitor.check(RideState::Active, false, 0.0, at(0.0));
        monitor.check(RideState::Active, false, 0.0, at(10.0));
        monitor.check(RideState::Active, false, 12.0, at(11.0));
        assert_eq!(monitor.stationary_since(), None);
        assert_eq!(monitor.check(RideState::Active, false, 0.0, at(12.0)), None);
        assert_eq!(monitor.check(RideState::Active, false, 0.0, at(20.0)), None);
    }

    #[test]
    fn auto_pause_can_be_disabled() {
        let mut monitor = AutoPauseMonitor::new(AutoPauseParameters {
            enabled: false,
            ..Default::default()
        });
        monitor.check(RideState::Active, false, 0.0, at(0.0));
        assert_eq!(monitor.check(RideState::Active, false, 0.0, at(60.0)), None);
    }

    #[test]
    fn invalid_transitions_change_nothing() {
        let mut tracker = RideTracker::default();
        assert_eq!(
            tracker.pause(at(0.0)),
            Err(RideError::InvalidTransition {
                state: RideState::Idle,
                command: Command::Pause
            })
        );
        assert!(tracker.resume(at(0.0)).is_err());
        assert!(tracker.finish(at(0.0)).is_err());
        assert!(tracker.discard().is_err());
        assert_eq!(tracker.state(), RideState::Idle);

        tracker.start(at(0.0)).unwrap();
        assert!(tracker.start(at(1.0)).is_err());
        assert!(tracker.resume(at(1.0)).is_err());
        assert_eq!(tracker.ride().unwrap().start_time(), at(0.0));

        tracker.pause(at(2.0)).unwrap();
        assert!(tracker.pause(at(3.0)).is_err());
        assert_eq!(tracker.state(), RideState::Paused);
    }

    #[test]
    fn paused_time_accumulates_and_includes_open_pause() {
        let mut tracker = RideTracker::default();
        tracker.start(at(0.0)).unwrap();
        ride_north(&mut tracker, 0.0, 0.0, 6);

        tracker.pause(at(10.0)).unwrap();
        tracker.resume(at(15.0)).unwrap();
        tracker.pause(at(20.0)).unwrap();
        tracker.resume(at(22.0)).unwrap();
        assert_eq!(tracker.ride().unwrap().paused_time(), Duration::seconds(7));

        tracker.pause(at(30.0)).unwrap();
        let finished = tracker.finish(at(40.0)).unwrap();
        let summary = &finished.summary;
        assert_eq!(summary.elapsed, Duration::seconds(40));
        assert_eq!(summary.paused_time, Duration::seconds(17));
        assert_eq!(summary.moving_time, Duration::seconds(23));
        assert!((summary.distance_km - 0.05).abs() < 1e-3);
        let expected_avg = summary.distance_km / (23.0 / 3600.0);
        assert!((summary.average_speed_kmh - expected_avg).abs() < 1e-9);
        assert!(summary.completed);
        assert_eq!(summary.polyline.split('|').count(), 6);
        assert_eq!(finished.track_points.len(), 6);
        assert_eq!(finished.events.len(), 5);
        assert_eq!(tracker.state(), RideState::Idle);
    }

    #[test]
    fn tick_only_counts_active_time() {
        let mut tracker = RideTracker::default();
        assert_eq!(tracker.tick(at(1.0)), None);

        tracker.start(at(0.0)).unwrap();
        ride_north(&mut tracker, 0.0, 0.0, 6);
        assert_eq!(tracker.tick(at(10.0)), Some(Duration::seconds(10)));
        assert!((tracker.status().average_speed_kmh - 18.0).abs() < 0.1);

        tracker.pause(at(10.0)).unwrap();
        assert_eq!(tracker.tick(at(11.0)), None);
        assert_eq!(tracker.status().duration, Duration::seconds(10));

        tracker.resume(at(20.0)).unwrap();
        assert_eq!(tracker.tick(at(21.0)), Some(Duration::seconds(11)));
    }

    #[test]
    fn heart_rate_is_collected_during_the_ride() {
        let mut tracker = RideTracker::default();
        tracker.on_heart_rate(HeartRateSample { bpm: 80, time: at(0.0) });
        assert_eq!(tracker.status().heart_rate, 80);

        tracker.start(at(1.0)).unwrap();
        for (i, bpm) in [120, 140, 160].into_iter().enumerate() {
            tracker.on_heart_rate(HeartRateSample {
                bpm,
                time: at(2.0 + i as f64),
            });
        }
        let status = tracker.status();
        assert_eq!(status.heart_rate, 160);
        assert_eq!(status.max_heart_rate, 160);
        assert_eq!(status.average_heart_rate, 140);

        let finished = tracker.finish(at(10.0)).unwrap();
        assert_eq!(finished.heart_rate.len(), 3);
        assert_eq!(finished.summary.average_heart_rate, 140);
        assert_eq!(finished.summary.max_heart_rate, 160);
    }

    #[test]
    fn climbs_and_sprints_are_recorded() {
        let mut tracker = RideTracker::default();
        tracker.start(at(0.0)).unwrap();

        let mut s = fix(0.0, 0.0, 40.0);
        s.altitude = Some(100.0);
        tracker.on_location(s);
        let mut s = fix(11.0, 1.0, 40.0);
        s.altitude = Some(106.0);
        tracker.on_location(s);

        let types = event_types(&tracker);
        assert_eq!(
            types,
            vec![EventType::Sprint, EventType::Sprint, EventType::ClimbStart]
        );
        let status = tracker.status();
        assert_eq!(status.elevation_gain_metres, 6.0);
        assert_eq!(status.events, 3);
    }

    #[test]
    fn new_events_are_handed_out_once() {
        let mut tracker = RideTracker::default();
        assert!(tracker.take_new_events().is_empty());
        tracker.start(at(0.0)).unwrap();
        tracker.on_location(fix(0.0, 0.0, 40.0));
        assert_eq!(tracker.take_new_events().len(), 1);
        assert!(tracker.take_new_events().is_empty());
        tracker.pause(at(1.0)).unwrap();
        let new = tracker.take_new_events();
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].event_type, EventType::Paused);
    }

    #[test]
    fn finish_then_start_gives_an_independent_ride() {
        let mut tracker = RideTracker::default();
        tracker.start(at(0.0)).unwrap();
        ride_north(&mut tracker, 0.0, 0.0, 6);
        tracker.on_location(fix(60.0, 12.0, 40.0));
        tracker.on_heart_rate(HeartRateSample { bpm: 150, time: at(12.0) });
        tracker.pause(at(13.0)).unwrap();
        let first = tracker.finish(at(14.0)).unwrap();
        assert!(!first.events.is_empty());
        assert!(!first.track_points.is_empty());

        tracker.start(at(100.0)).unwrap();
        let ride = tracker.ride().unwrap();
        assert_eq!(ride.start_time(), at(100.0));
        assert_eq!(ride.paused_time(), Duration::ZERO);
        assert!(ride.events().is_empty());
        assert!(ride.metrics().route().is_empty());
        assert!(ride.metrics().track_points().is_empty());
        assert!(ride.metrics().heart_rate().is_empty());
        assert_eq!(ride.metrics().max_speed_kmh(), 0.0);
        assert_eq!(ride.metrics().distance_km(), 0.0);
        assert!(tracker.last_location().is_none());
        assert_eq!(tracker.filter().window_len(), 0);
        assert!(!tracker.is_manual_pause());

        // The first fix of the new ride is not compared with the old ride's last fix.
        tracker.on_location(fix(5000.0, 101.0, 10.0));
        assert_eq!(tracker.ride().unwrap().metrics().track_points().len(), 1);
    }

    #[test]
    fn discard_returns_to_idle() {
        let mut tracker = RideTracker::default();
        tracker.start(at(0.0)).unwrap();
        ride_north(&mut tracker, 0.0, 0.0, 3);
        tracker.discard().unwrap();
        assert_eq!(tracker.state(), RideState::Idle);
        assert!(tracker.ride().is_none());
        assert!(tracker.route_points().is_empty());
        assert_eq!(tracker.status(), RideStatus::default());
    }

    #[test]
    fn describe_mentions_state() {
        let mut tracker = RideTracker::default();
        tracker.start(at(0.0)).unwrap();
        let text = tracker.to_string();
        assert!(text.contains("Ride State: Active"));
        assert!(text.contains("Manual Pause: false"));
    }
}
