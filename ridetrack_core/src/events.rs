//! Turns the filtered signals into discrete ride events.

use log::debug;
use time::OffsetDateTime;

use crate::{
    config::EventParameters,
    model::{EventType, LocationSample, RideEvent},
};

#[derive(Debug, Clone, Default)]
pub struct EventDetector {
    params: EventParameters,
    last_sprint: Option<OffsetDateTime>,
}

impl EventDetector {
    pub fn new(params: EventParameters) -> Self {
        Self {
            params,
            last_sprint: None,
        }
    }

    pub fn reset(&mut self) {
        self.last_sprint = None;
    }

    /// A Sprint is recorded for every speed update above the sprint
    /// threshold, unless a cooldown is configured and the previous
    /// Sprint is too recent.
    pub fn check_sprint(&mut self, speed_kmh: f64, location: &LocationSample) -> Option<RideEvent> {
        if speed_kmh <= self.params.sprint_speed_kmh {
            return None;
        }

        if let (Some(cooldown), Some(last)) = (self.params.sprint_cooldown, self.last_sprint) {
            if location.time - last < cooldown {
                debug!("Sprint at {speed_kmh:.1} km/h suppressed, within cooldown");
                return None;
            }
        }

        self.last_sprint = Some(location.time);
        Some(RideEvent::at(
            EventType::Sprint,
            location,
            location.time,
            format!("High speed: {} km/h", speed_kmh as i64),
        ))
    }

    /// Checks a (significant) altitude change between two consecutive
    /// fixes for the start of a climb or descent.
    pub fn check_elevation(&self, change_metres: f64, location: &LocationSample) -> Option<RideEvent> {
        if change_metres.abs() <= self.params.climb_change_metres {
            return None;
        }

        let event_type = if change_metres > 0.0 {
            EventType::ClimbStart
        } else {
            EventType::DescentStart
        };

        Some(RideEvent::at(
            event_type,
            location,
            location.time,
            format!("Elevation change: {}m", change_metres as i64),
        ))
    }
}

/// The event recorded when a ride is paused.
pub fn paused_event(location: &LocationSample, time: OffsetDateTime, manual: bool) -> RideEvent {
    let note = if manual {
        "Manual pause"
    } else {
        "Auto-pause (stationary)"
    };
    RideEvent::at(EventType::Paused, location, time, note)
}

/// The event recorded when a ride resumes. It marks the end of the
/// preceding stop, which is why it is a `Stopped` event.
pub fn resumed_event(location: &LocationSample, time: OffsetDateTime) -> RideEvent {
    RideEvent::at(EventType::Stopped, location, time, "Resume from pause/stop")
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::gate::tests::sample_at;

    #[test]
    fn sprint_is_recorded_on_every_update_by_default() {
        let mut d = EventDetector::default();
        let events: Vec<_> = (0..5)
            .filter_map(|t| d.check_sprint(38.2, &sample_at(t as f64 * 10.0, t as f64, 5.0)))
            .collect();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].event_type, EventType::Sprint);
        assert_eq!(events[0].note.as_deref(), Some("High speed: 38 km/h"));
    }

    #[test]
    fn sprint_threshold_is_exclusive() {
        let mut d = EventDetector::default();
        assert!(d.check_sprint(35.0, &sample_at(0.0, 0.0, 5.0)).is_none());
        assert!(d.check_sprint(35.1, &sample_at(0.0, 0.0, 5.0)).is_some());
    }

    #[test]
    fn sprint_cooldown_suppresses_repeats() {
        let mut d = EventDetector::new(EventParameters {
            sprint_cooldown: Some(Duration::seconds(10)),
            ..Default::default()
        });
        let recorded = (0..25)
            .filter_map(|t| d.check_sprint(40.0, &sample_at(0.0, t as f64, 5.0)))
            .count();
        // t = 0, 10, 20
        assert_eq!(recorded, 3);
    }

    #[test]
    fn climb_and_descent_need_more_than_five_metres() {
        let d = EventDetector::default();
        let mut loc = sample_at(0.0, 0.0, 5.0);
        loc.altitude = Some(120.0);

        assert!(d.check_elevation(5.0, &loc).is_none());
        assert!(d.check_elevation(-4.0, &loc).is_none());

        let climb = d.check_elevation(6.4, &loc).unwrap();
        assert_eq!(climb.event_type, EventType::ClimbStart);
        assert_eq!(climb.altitude, Some(120.0));
        assert_eq!(climb.note.as_deref(), Some("Elevation change: 6m"));

        let descent = d.check_elevation(-7.9, &loc).unwrap();
        assert_eq!(descent.event_type, EventType::DescentStart);
        assert_eq!(descent.note.as_deref(), Some("Elevation change: -7m"));
    }

    #[test]
    fn pause_and_resume_notes() {
        let mut loc = sample_at(0.0, 0.0, 5.0);
        loc.speed_mps = 1.0;
        let t = loc.time + Duration::seconds(3);

        let manual = paused_event(&loc, t, true);
        assert_eq!(manual.event_type, EventType::Paused);
        assert_eq!(manual.note.as_deref(), Some("Manual pause"));
        assert_eq!(manual.time, t);
        assert_eq!(manual.speed_kmh, Some(3.6));

        let auto = paused_event(&loc, t, false);
        assert_eq!(auto.note.as_deref(), Some("Auto-pause (stationary)"));

        let resumed = resumed_event(&loc, t);
        assert_eq!(resumed.event_type, EventType::Stopped);
        assert_eq!(resumed.note.as_deref(), Some("Resume from pause/stop"));
    }
}
