//! # Communications interface crate.
//!
//! Provides the interfaces used to talk to the driving simulator.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Network module
pub mod net;

/// Simulator frame definitions and codec
pub mod sim;
