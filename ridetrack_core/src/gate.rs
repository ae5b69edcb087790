//! Decides whether a raw GPS fix is good enough to use at all.

use time::Duration;

use crate::{config::GateParameters, error::Rejection, model::LocationSample};

/// What we learned about a sample while accepting it. The displacement
/// and elapsed time are relative to the previous accepted sample and
/// are `None` for the first sample of a ride.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accepted {
    pub displacement_metres: Option<f64>,
    pub elapsed: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct SampleGate {
    params: GateParameters,
}

impl SampleGate {
    pub fn new(params: GateParameters) -> Self {
        Self { params }
    }

    /// Checks `sample` against the previous accepted sample. This is a
    /// pure decision, it is up to the caller to remember `sample` as the
    /// new "previous" if it goes on to use it.
    pub fn accept(
        &self,
        sample: &LocationSample,
        previous: Option<&LocationSample>,
    ) -> Result<Accepted, Rejection> {
        if sample.accuracy_metres > self.params.max_accuracy_metres {
            return Err(Rejection::PoorAccuracy {
                accuracy_metres: sample.accuracy_metres,
                limit_metres: self.params.max_accuracy_metres,
            });
        }

        let Some(previous) = previous else {
            return Ok(Accepted {
                displacement_metres: None,
                elapsed: None,
            });
        };

        let displacement_metres = previous.distance_metres(sample);
        let elapsed = sample.time - previous.time;

        if displacement_metres > self.params.jump_displacement_metres
            && elapsed < self.params.jump_window
            && sample.accuracy_metres > self.params.jump_accuracy_metres
        {
            return Err(Rejection::Jump {
                displacement_metres,
                elapsed_seconds: elapsed.as_seconds_f64(),
                accuracy_metres: sample.accuracy_metres,
            });
        }

        if displacement_metres > self.params.teleport_metres {
            return Err(Rejection::Teleport { displacement_metres });
        }

        Ok(Accepted {
            displacement_metres: Some(displacement_metres),
            elapsed: Some(elapsed),
        })
    }
}
