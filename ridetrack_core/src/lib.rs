//! The signal processing and state machine engine behind a ride tracker.
//!
//! Raw GPS fixes flow through the [`gate`], the [`speed`] estimator and the
//! [`filter`] pipeline; the [`ride`] state machine ties them to the
//! [`metrics`] accumulator and the [`events`] detector. The [`service`]
//! module wraps the state machine in a single-writer tokio task fed by one
//! channel per sample source.

pub mod config;
pub mod error;
pub mod events;
pub mod excel;
pub mod filter;
pub mod gate;
pub mod gpx_reader;
pub mod metrics;
pub mod model;
pub mod replay;
pub mod ride;
pub mod service;
pub mod speed;
pub mod store;
