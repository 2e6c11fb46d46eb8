//! # PID controller
//!
//! A discrete PID controller stepped once per telemetry message. There is no
//! notion of time here, each update is one step, so the integral is a plain
//! sum of errors and the derivative a plain difference.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of gains in a [`GainVector`].
pub const NUM_GAINS: usize = 3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The gains of a PID controller.
///
/// Indices are 0 for proportional, 1 for integral and 2 for derivative. In
/// parameter files this is written as `[k_p, k_i, k_d]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GainVector(pub [f64; NUM_GAINS]);

/// A PID controller
#[derive(Debug, Clone, Serialize)]
pub struct PidController {
    /// Controller gains
    gains: GainVector,

    /// The most recent error
    p_error: f64,

    /// Sum of all errors since initialisation
    i_error: f64,

    /// Difference between the two most recent errors
    d_error: f64,

    /// Previous error, `None` until the first update
    prev_error: Option<f64>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GainVector {
    pub fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self([k_p, k_i, k_d])
    }

    /// Proportional gain
    pub fn k_p(&self) -> f64 {
        self.0[0]
    }

    /// Integral gain
    pub fn k_i(&self) -> f64 {
        self.0[1]
    }

    /// Derivative gain
    pub fn k_d(&self) -> f64 {
        self.0[2]
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }
}

impl Index<usize> for GainVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl IndexMut<usize> for GainVector {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.0[index]
    }
}

impl fmt::Display for GainVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kp = {}, Ki = {}, Kd = {}", self.k_p(), self.k_i(), self.k_d())
    }
}

impl PidController {

    /// Create a new controller with the given gains.
    pub fn new(gains: GainVector) -> Self {
        Self {
            gains,
            p_error: 0f64,
            i_error: 0f64,
            d_error: 0f64,
            prev_error: None
        }
    }

    /// Reinitialise the controller with new gains, clearing all error terms.
    pub fn init(&mut self, gains: GainVector) {
        *self = Self::new(gains);
    }

    /// Pass a new error observation into the controller.
    ///
    /// The derivative term is left at zero for the first observation since
    /// there is nothing to difference against.
    pub fn update(&mut self, error: f64) {
        self.p_error = error;

        if let Some(prev) = self.prev_error {
            self.d_error = error - prev;
        }
        self.prev_error = Some(error);

        self.i_error += error;
    }

    /// Get the controller output.
    ///
    /// Negative feedback: positive gains drive the error towards zero.
    pub fn output(&self) -> f64 {
        - self.gains.k_p() * self.p_error
        - self.gains.k_d() * self.d_error
        - self.gains.k_i() * self.i_error
    }

    pub fn gains(&self) -> GainVector {
        self.gains
    }

    pub fn p_error(&self) -> f64 {
        self.p_error
    }

    pub fn i_error(&self) -> f64 {
        self.i_error
    }

    pub fn d_error(&self) -> f64 {
        self.d_error
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_zero_gains() {
        let mut pid = PidController::new(GainVector::new(0.0, 0.0, 0.0));

        for e in &[1.0, -3.5, 1e6, 0.25, -1e-3] {
            pid.update(*e);
            assert_eq!(pid.output(), 0.0);
        }
    }

    #[test]
    fn test_first_update() {
        let mut pid = PidController::new(GainVector::new(1.0, 1.0, 1.0));
        pid.update(2.0);

        assert_eq!(pid.d_error(), 0.0);
        assert_eq!(pid.output(), -4.0);
    }

    #[test]
    fn test_two_updates() {
        let mut pid = PidController::new(GainVector::new(1.0, 1.0, 1.0));
        pid.update(2.0);
        pid.update(5.0);

        assert_eq!(pid.p_error(), 5.0);
        assert_eq!(pid.d_error(), 3.0);
        assert_eq!(pid.i_error(), 7.0);
        assert_eq!(pid.output(), -15.0);
    }

    #[test]
    fn test_output_idempotent() {
        let mut pid = PidController::new(GainVector::new(0.5, 0.01, 5.7));
        pid.update(0.76);
        pid.update(0.81);

        let first = pid.output();
        assert_eq!(pid.output(), first);
        assert_eq!(pid.output(), first);
    }

    #[test]
    fn test_init_clears_errors() {
        let mut pid = PidController::new(GainVector::new(1.0, 1.0, 1.0));
        pid.update(2.0);
        pid.update(5.0);

        pid.init(GainVector::new(2.0, 0.0, 1.0));
        assert_eq!(pid.gains(), GainVector::new(2.0, 0.0, 1.0));
        assert_eq!(pid.i_error(), 0.0);
        assert_eq!(pid.output(), 0.0);

        // No derivative kick on the first update after reinitialising
        pid.update(3.0);
        assert_eq!(pid.d_error(), 0.0);
        assert_eq!(pid.output(), -6.0);
    }

    #[test]
    fn test_gain_vector() {
        let mut g = GainVector::new(0.5, 0.0, 4.0);
        g[1] += 0.25;

        assert_eq!(g.k_i(), 0.25);
        assert_eq!(g.sum(), 4.75);
        assert_eq!(format!("{}", g), "Kp = 0.5, Ki = 0.25, Kd = 4");
    }
}
