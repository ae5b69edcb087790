use thiserror::Error;

use crate::model::{Command, RideState};

/// Why a location sample was dropped. Rejections are never surfaced to
/// the rider, they are only logged.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Rejection {
    #[error("horizontal accuracy {accuracy_metres}m is worse than {limit_metres}m")]
    PoorAccuracy { accuracy_metres: f64, limit_metres: f64 },

    #[error("GPS jump of {displacement_metres:.1}m in {elapsed_seconds:.1}s at {accuracy_metres}m accuracy")]
    Jump {
        displacement_metres: f64,
        elapsed_seconds: f64,
        accuracy_metres: f64,
    },

    #[error("extreme displacement of {displacement_metres:.1}m")]
    Teleport { displacement_metres: f64 },

    #[error("absurd speed of {speed_kmh:.1} km/h")]
    AbsurdSpeed { speed_kmh: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RideError {
    #[error("cannot {command} a ride that is {state}")]
    InvalidTransition { state: RideState, command: Command },

    #[error("the ride service has stopped")]
    ServiceStopped,
}
