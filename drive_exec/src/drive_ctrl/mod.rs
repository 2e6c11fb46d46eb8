//! # Drive control module
//!
//! Drive control turns each step of simulator telemetry into steering and
//! throttle demands. Steering comes from a PID controller acting on the cross
//! track error. Throttle is either a constant or, when the speed controller
//! is enabled, `1 + u` where `u` is the output of a second PID controller
//! acting on the magnitude of the cross track error. The further off the
//! path the vehicle is, the more it slows down.
//!
//! Optionally one of the two controllers can be tuned online. Each episode of
//! the run is scored by a [`RunEvaluator`](crate::eval::RunEvaluator), and at
//! the end of the episode the [`Tuner`](crate::twiddle::Tuner) picks the next
//! gains to try and the simulator is asked to reset. Tuning stops when the
//! tuner converges, after which the vehicle keeps driving on the final gains.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;
use comms_if::sim::Telemetry;
use util::{archive::ArchiveError, params::LoadError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during DriveCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum DriveCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(LoadError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Could not set up the archive: {0}")]
    ArchiveError(ArchiveError),

    /// Telemetry contained a NaN or infinite reading.
    #[error("Telemetry contains a non-finite reading: {0:?}")]
    InvalidInput(Telemetry)
}
