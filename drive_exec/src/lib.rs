//! # Drive library.
//!
//! PID control of the simulated vehicle and online tuning of the controller gains. The executable
//! wires [`drive_ctrl::DriveCtrl`] to the simulator, while the building blocks are exposed here
//! so that they can be tested and benchmarked on their own.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// PID controller and gain vector
pub mod pid;

/// Run evaluator - scores one candidate set of gains over an episode
pub mod eval;

/// Twiddle tuner - coordinate search over the gains
pub mod twiddle;

/// Drive control module - steering and throttle demands from telemetry, with optional tuning
pub mod drive_ctrl;
