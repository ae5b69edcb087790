//! Runs a [`RideTracker`] on its own tokio task. Location samples, heart
//! rate readings and commands each arrive on their own channel and are
//! handled one at a time by that task, which is the only thing that
//! ever touches the tracker. Everyone else talks to it through a
//! [`RideHandle`].

use std::{future, ops::ControlFlow, sync::Arc, time::Duration as StdDuration};

use log::{debug, info, warn};
use time::OffsetDateTime;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};

use crate::{
    config::TrackingConfig,
    error::RideError,
    model::{HeartRateSample, LocationSample, RideEvent, RideId, RideState, RideSummary, RoutePoint},
    ride::{LocationOutcome, RideStatus, RideTracker},
    store::{save_finished_ride, RideStore},
};

const TICK_PERIOD: StdDuration = StdDuration::from_secs(1);

/// The one clock the service runs on. Commands, duration ticks and
/// auto-pause are all timed by it; a location sample's own timestamp is
/// only used inside the speed filter.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Channel sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCapacity {
    pub locations: usize,
    pub heart_rate: usize,
    pub commands: usize,
    pub events: usize,
}

impl Default for ChannelCapacity {
    fn default() -> Self {
        Self {
            locations: 64,
            heart_rate: 64,
            commands: 16,
            events: 128,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, RideError>>;

enum Request {
    Start { reply: Reply<()> },
    Pause { reply: Reply<()> },
    Resume { reply: Reply<()> },
    Finish { reply: Reply<RideSummary> },
    Discard { reply: Reply<()> },
    RoutePoints {
        reply: oneshot::Sender<Vec<RoutePoint>>,
    },
    Describe {
        reply: oneshot::Sender<String>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// The owning side of the ride task.
pub struct RideService {
    tracker: RideTracker,
    store: Arc<dyn RideStore>,
    clock: Arc<dyn Clock>,
    ride_id: Option<RideId>,
    /// Only exists while the ride is Active.
    ticker: Option<Interval>,
    status: watch::Sender<RideStatus>,
    events: broadcast::Sender<RideEvent>,
}

impl RideService {
    /// Spawns the ride task on the current tokio runtime and returns a
    /// handle to it.
    pub fn spawn(
        config: TrackingConfig,
        store: Arc<dyn RideStore>,
        clock: Arc<dyn Clock>,
    ) -> RideHandle {
        Self::spawn_with_capacity(config, store, clock, ChannelCapacity::default())
    }

    pub fn spawn_with_capacity(
        config: TrackingConfig,
        store: Arc<dyn RideStore>,
        clock: Arc<dyn Clock>,
        capacity: ChannelCapacity,
    ) -> RideHandle {
        let (request_tx, request_rx) = mpsc::channel(capacity.commands);
        let (location_tx, location_rx) = mpsc::channel(capacity.locations);
        let (heart_rate_tx, heart_rate_rx) = mpsc::channel(capacity.heart_rate);
        let (status_tx, status_rx) = watch::channel(RideStatus::default());
        let (events_tx, _) = broadcast::channel(capacity.events);

        let service = RideService {
            tracker: RideTracker::new(config),
            store,
            clock: clock.clone(),
            ride_id: None,
            ticker: None,
            status: status_tx,
            events: events_tx.clone(),
        };
        tokio::spawn(service.run(request_rx, location_rx, heart_rate_rx));

        RideHandle {
            requests: request_tx,
            locations: location_tx,
            heart_rate: heart_rate_tx,
            status: status_rx,
            events: events_tx,
            clock,
        }
    }

    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut locations: mpsc::Receiver<LocationSample>,
        mut heart_rate: mpsc::Receiver<HeartRateSample>,
    ) {
        info!("Ride service started");

        loop {
            tokio::select! {
                // Samples already queued are handled before a command that
                // was sent after them.
                biased;

                Some(sample) = locations.recv() => self.on_location(sample),
                Some(sample) = heart_rate.recv() => self.on_heart_rate(sample),
                request = requests.recv() => match request {
                    Some(request) => {
                        if self.on_request(request).await.is_break() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = next_tick(&mut self.ticker) => self.on_tick(),
            }
        }

        if self.tracker.state() != RideState::Idle {
            warn!("Ride service stopping with a ride in progress, it has not been saved");
        }
        info!("Ride service stopped");
    }

    fn on_location(&mut self, sample: LocationSample) {
        if let LocationOutcome::Processed {
            transition: Some(_), ..
        } = self.tracker.on_location_at(sample, self.clock.now())
        {
            self.sync_ticker();
        }
        self.publish();
    }

    fn on_heart_rate(&mut self, sample: HeartRateSample) {
        self.tracker.on_heart_rate(sample);
        self.publish();
    }

    fn on_tick(&mut self) {
        if let Some(duration) = self.tracker.tick(self.clock.now()) {
            debug!("Ride duration {duration}");
            self.publish();
        }
    }

    async fn on_request(&mut self, request: Request) -> ControlFlow<()> {
        let now = self.clock.now();
        match request {
            Request::Start { reply } => {
                let result = self.start(now).await;
                self.settle(reply, result);
            }
            Request::Pause { reply } => {
                let result = self.tracker.pause(now);
                self.settle(reply, result);
            }
            Request::Resume { reply } => {
                let result = self.tracker.resume(now);
                self.settle(reply, result);
            }
            Request::Finish { reply } => {
                let result = self.finish(now).await;
                self.settle(reply, result);
            }
            Request::Discard { reply } => {
                let result = self.discard().await;
                self.settle(reply, result);
            }
            Request::RoutePoints { reply } => {
                let _ = reply.send(self.tracker.route_points());
            }
            Request::Describe { reply } => {
                let ride_id = self
                    .ride_id
                    .map_or_else(|| "None".to_string(), |id| id.to_string());
                let _ = reply.send(format!("Ride Id: {ride_id}\n{}", self.tracker));
            }
            Request::Shutdown { reply } => {
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Brings the ticker and the observers up to date after a command,
    /// then replies.
    fn settle<T>(&mut self, reply: Reply<T>, result: Result<T, RideError>) {
        if let Err(e) = &result {
            warn!("{e}");
        }
        self.sync_ticker();
        self.publish();
        let _ = reply.send(result);
    }

    async fn start(&mut self, now: OffsetDateTime) -> Result<(), RideError> {
        self.tracker.start(now)?;
        self.ride_id = match self.store.create_ride(now).await {
            Ok(ride_id) => {
                info!("Created ride {ride_id}");
                Some(ride_id)
            }
            Err(e) => {
                warn!("Error creating ride, it will not be saved: {e:#}");
                None
            }
        };
        Ok(())
    }

    async fn discard(&mut self) -> Result<(), RideError> {
        self.tracker.discard()?;
        if let Some(ride_id) = self.ride_id.take() {
            if let Err(e) = self.store.delete_ride(ride_id).await {
                warn!("Error deleting ride {ride_id}: {e:#}");
            }
        }
        Ok(())
    }

    async fn finish(&mut self, now: OffsetDateTime) -> Result<RideSummary, RideError> {
        let mut ride = self.tracker.finish(now)?;

        let mut finished = self.status.borrow().clone();
        finished.state = RideState::Finished;
        self.status.send_replace(finished);

        ride.summary.ride_id = self.ride_id.take();
        match ride.summary.ride_id {
            Some(ride_id) => {
                if let Err(e) = save_finished_ride(self.store.as_ref(), ride_id, &ride).await {
                    warn!("Error saving ride: {e:#}");
                }
            }
            None => warn!("Ride has no record in the store, it has not been saved"),
        }

        Ok(ride.summary)
    }

    /// Makes sure the ticker is running if, and only if, the ride is
    /// Active. A new ticker first fires one period after it is created.
    fn sync_ticker(&mut self) {
        match (self.tracker.state(), self.ticker.is_some()) {
            (RideState::Active, false) => {
                let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.ticker = Some(ticker);
                debug!("Duration ticker started");
            }
            (RideState::Active, true) => {}
            (_, true) => {
                self.ticker = None;
                debug!("Duration ticker stopped");
            }
            (_, false) => {}
        }
    }

    fn publish(&mut self) {
        self.status.send_replace(self.tracker.status());
        for event in self.tracker.take_new_events() {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) -> Instant {
    match ticker {
        Some(ticker) => ticker.tick().await,
        None => future::pending().await,
    }
}

/// The client side of a ride service. Cheap to clone.
#[derive(Clone)]
pub struct RideHandle {
    requests: mpsc::Sender<Request>,
    locations: mpsc::Sender<LocationSample>,
    heart_rate: mpsc::Sender<HeartRateSample>,
    status: watch::Receiver<RideStatus>,
    events: broadcast::Sender<RideEvent>,
    clock: Arc<dyn Clock>,
}

impl RideHandle {
    pub async fn submit_location_sample(&self, sample: LocationSample) -> Result<(), RideError> {
        self.locations
            .send(sample)
            .await
            .map_err(|_| RideError::ServiceStopped)
    }

    /// Submits a heart-rate reading taken now.
    pub async fn submit_heart_rate(&self, bpm: u16) -> Result<(), RideError> {
        let sample = HeartRateSample {
            bpm,
            time: self.clock.now(),
        };
        self.heart_rate
            .send(sample)
            .await
            .map_err(|_| RideError::ServiceStopped)
    }

    /// A sender for a task that produces location samples.
    pub fn location_sender(&self) -> mpsc::Sender<LocationSample> {
        self.locations.clone()
    }

    /// A sender for a task that produces heart-rate samples.
    pub fn heart_rate_sender(&self) -> mpsc::Sender<HeartRateSample> {
        self.heart_rate.clone()
    }

    pub async fn start_ride(&self) -> Result<(), RideError> {
        self.call(|reply| Request::Start { reply }).await?
    }

    pub async fn pause_ride(&self) -> Result<(), RideError> {
        self.call(|reply| Request::Pause { reply }).await?
    }

    pub async fn resume_ride(&self) -> Result<(), RideError> {
        self.call(|reply| Request::Resume { reply }).await?
    }

    /// Finishes the ride, saves it and returns its summary. A failure to
    /// save is logged, not returned.
    pub async fn finish_ride(&self) -> Result<RideSummary, RideError> {
        self.call(|reply| Request::Finish { reply }).await?
    }

    pub async fn discard_ride(&self) -> Result<(), RideError> {
        self.call(|reply| Request::Discard { reply }).await?
    }

    /// The latest status.
    pub fn status(&self) -> RideStatus {
        self.status.borrow().clone()
    }

    /// A receiver that is notified whenever the status changes.
    pub fn watch_status(&self) -> watch::Receiver<RideStatus> {
        self.status.clone()
    }

    /// Events recorded from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RideEvent> {
        self.events.subscribe()
    }

    pub async fn route_points(&self) -> Result<Vec<RoutePoint>, RideError> {
        self.call(|reply| Request::RoutePoints { reply }).await
    }

    /// A human-readable dump of the tracker's internals.
    pub async fn describe(&self) -> Result<String, RideError> {
        self.call(|reply| Request::Describe { reply }).await
    }

    /// Stops the ride task. A ride still in progress is not saved.
    pub async fn shutdown(&self) -> Result<(), RideError> {
        self.call(|reply| Request::Shutdown { reply }).await
    }

    /// Sends a request and waits for the service's reply.
    async fn call<T>(&self, request: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T, RideError> {
        let (reply, rx) = oneshot::channel();
        self.request(request(reply)).await?;
        rx.await.map_err(|_| RideError::ServiceStopped)
    }

    async fn request(&self, request: Request) -> Result<(), RideError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| RideError::ServiceStopped)
    }
}
