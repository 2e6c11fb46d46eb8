//! Module interfaces
//!
//! Cyclic processing modules in `drive_exec` implement [`State`], so the
//! executable can initialise and step them the same way.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// The module's internal state.
pub trait State {
    /// Data required during initialisation, usually a parameter file path.
    type InitData;
    /// An error which can occur during initialisation.
    type InitError;

    /// Data consumed by one processing step.
    type InputData;
    /// Data produced by one processing step.
    type OutputData;
    /// A report on the status of the step.
    type StatusReport;
    /// An error which can occur during a step.
    type ProcError;

    /// Initialise the module, setting up any archives inside the session.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>;

    /// Process one step.
    ///
    /// On error the module's state must be left as it was before the call.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
