//! Where finished rides go. The tracking engine only ever talks to the
//! [`RideStore`] trait; [`MemoryRideStore`] keeps everything in memory
//! and is what the CLI and the tests use.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::debug;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::model::{FinishedRide, HeartRateSample, RideEvent, RideId, RideSummary, TrackPoint};

#[async_trait]
pub trait RideStore: Send + Sync {
    /// Creates the record for a ride that has just started.
    async fn create_ride(&self, start_time: OffsetDateTime) -> Result<RideId>;

    /// Stores the final figures of a ride.
    async fn finalize_ride(&self, ride_id: RideId, summary: &RideSummary) -> Result<()>;

    async fn save_points(&self, ride_id: RideId, points: &[TrackPoint]) -> Result<()>;

    async fn save_heart_rate(&self, ride_id: RideId, samples: &[HeartRateSample]) -> Result<()>;

    async fn save_events(&self, ride_id: RideId, events: &[RideEvent]) -> Result<()>;

    /// Deletes a ride and everything saved against it.
    async fn delete_ride(&self, ride_id: RideId) -> Result<()>;
}

/// Writes everything in `ride` to `store`, stopping at the first failure.
pub async fn save_finished_ride(
    store: &dyn RideStore,
    ride_id: RideId,
    ride: &FinishedRide,
) -> Result<()> {
    store
        .finalize_ride(ride_id, &ride.summary)
        .await
        .with_context(|| format!("Failed to finalize ride {ride_id}"))?;
    store
        .save_points(ride_id, &ride.track_points)
        .await
        .with_context(|| format!("Failed to save track points of ride {ride_id}"))?;
    store
        .save_heart_rate(ride_id, &ride.heart_rate)
        .await
        .with_context(|| format!("Failed to save heart rate of ride {ride_id}"))?;
    store
        .save_events(ride_id, &ride.events)
        .await
        .with_context(|| format!("Failed to save events of ride {ride_id}"))?;
    Ok(())
}

/// Everything stored against one ride.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRide {
    pub start_time: OffsetDateTime,
    pub summary: Option<RideSummary>,
    pub track_points: Vec<TrackPoint>,
    pub heart_rate: Vec<HeartRateSample>,
    pub events: Vec<RideEvent>,
}

#[derive(Debug, Default)]
struct Rides {
    next_id: u64,
    rides: BTreeMap<RideId, StoredRide>,
}

impl Rides {
    fn get_mut(&mut self, ride_id: RideId) -> Result<&mut StoredRide> {
        match self.rides.get_mut(&ride_id) {
            Some(ride) => Ok(ride),
            None => bail!("No ride with id {ride_id}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryRideStore {
    rides: Mutex<Rides>,
    failing: AtomicBool,
}

impl MemoryRideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("Ride store is unavailable");
        }
        Ok(())
    }

    pub async fn ride(&self, ride_id: RideId) -> Option<StoredRide> {
        self.rides.lock().await.rides.get(&ride_id).cloned()
    }

    pub async fn ride_ids(&self) -> Vec<RideId> {
        self.rides.lock().await.rides.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.rides.lock().await.rides.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RideStore for MemoryRideStore {
    async fn create_ride(&self, start_time: OffsetDateTime) -> Result<RideId> {
        self.check_available()?;
        let mut rides = self.rides.lock().await;
        rides.next_id += 1;
        let ride_id = RideId(rides.next_id);
        rides.rides.insert(
            ride_id,
            StoredRide {
                start_time,
                summary: None,
                track_points: Vec::new(),
                heart_rate: Vec::new(),
                events: Vec::new(),
            },
        );
        debug!("Created ride {ride_id}");
        Ok(ride_id)
    }

    async fn finalize_ride(&self, ride_id: RideId, summary: &RideSummary) -> Result<()> {
        self.check_available()?;
        let mut rides = self.rides.lock().await;
        let ride = rides.get_mut(ride_id)?;
        ride.summary = Some(RideSummary {
            ride_id: Some(ride_id),
            ..summary.clone()
        });
        Ok(())
    }

    async fn save_points(&self, ride_id: RideId, points: &[TrackPoint]) -> Result<()> {
        self.check_available()?;
        let mut rides = self.rides.lock().await;
        rides.get_mut(ride_id)?.track_points.extend_from_slice(points);
        Ok(())
    }

    async fn save_heart_rate(&self, ride_id: RideId, samples: &[HeartRateSample]) -> Result<()> {
        self.check_available()?;
        let mut rides = self.rides.lock().await;
        rides.get_mut(ride_id)?.heart_rate.extend_from_slice(samples);
        Ok(())
    }

    async fn save_events(&self, ride_id: RideId, events: &[RideEvent]) -> Result<()> {
        self.check_available()?;
        let mut rides = self.rides.lock().await;
        rides.get_mut(ride_id)?.events.extend_from_slice(events);
        Ok(())
    }

    async fn delete_ride(&self, ride_id: RideId) -> Result<()> {
        self.check_available()?;
        let mut rides = self.rides.lock().await;
        if rides.rides.remove(&ride_id).is_none() {
            bail!("No ride with id {ride_id}");
        }
        debug!("Deleted ride {ride_id}");
        Ok(())
    }
}
