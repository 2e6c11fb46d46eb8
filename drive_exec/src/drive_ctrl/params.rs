//! Parameters structure for DriveCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::DriveCtrlError;
use crate::pid::{GainVector, NUM_GAINS};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for drive control.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {

    // ---- STEERING ----

    /// Gains of the steering controller, `[k_p, k_i, k_d]`.
    pub steer_gains: GainVector,

    // ---- THROTTLE ----

    /// If true throttle is computed by the speed controller, otherwise
    /// `const_throttle` is used.
    pub enable_speed_ctrl: bool,

    /// Gains of the speed controller, `[k_p, k_i, k_d]`.
    pub speed_gains: GainVector,

    /// Throttle demand used while the speed controller is disabled.
    pub const_throttle: f64,

    // ---- TUNING ----

    pub tuning: TuningParams
}

/// Parameters for online gain tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct TuningParams {

    /// If false the controllers keep the gains given above.
    pub enable_tuning: bool,

    /// Which controller to tune.
    pub target: TuneTarget,

    /// Gains the search starts from.
    pub initial_gains: GainVector,

    /// Initial step size for each gain. Must all be positive.
    pub initial_step_sizes: GainVector,

    /// Number of steps at the start of each episode which aren't scored.
    pub warmup_steps: u32,

    /// Length of an episode in steps.
    pub max_steps: u32,

    /// Accumulated squared error above which an episode is cut short.
    pub abort_threshold: f64,

    /// Tuning stops once the step sizes sum to less than this.
    pub convergence_threshold: f64,

    /// Error given to an episode in which the vehicle is driven backwards
    /// while tuning the speed controller.
    pub reverse_penalty: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The controller being tuned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuneTarget {
    Steer,
    Speed
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), DriveCtrlError> {
        let t = &self.tuning;

        for i in 0..NUM_GAINS {
            if !(t.initial_step_sizes[i] > 0.0) {
                return Err(DriveCtrlError::InvalidParams(format!(
                    "initial step size {} must be positive, found {}",
                    i, t.initial_step_sizes[i]
                )))
            }
        }

        if t.max_steps <= t.warmup_steps {
            return Err(DriveCtrlError::InvalidParams(format!(
                "max_steps ({}) must be greater than warmup_steps ({})",
                t.max_steps, t.warmup_steps
            )))
        }

        if !(t.convergence_threshold > 0.0) {
            return Err(DriveCtrlError::InvalidParams(format!(
                "convergence threshold must be positive, found {}",
                t.convergence_threshold
            )))
        }

        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            steer_gains: GainVector::new(0.5, 0.0, 5.70568),
            enable_speed_ctrl: false,
            speed_gains: GainVector::new(0.85, 0.0, 3.1),
            const_throttle: 0.3,
            tuning: TuningParams::default()
        }
    }
}

impl Default for TuningParams {
    fn default() -> Self {
        Self {
            enable_tuning: false,
            target: TuneTarget::Steer,
            initial_gains: GainVector::new(0.0, 0.0, 0.0),
            initial_step_sizes: GainVector::new(1.0, 1.0, 1.0),
            warmup_steps: 100,
            max_steps: 10_000,
            abort_threshold: 500.0,
            convergence_threshold: 0.2,
            reverse_penalty: 50_000.0
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const PARAMS_TOML: &str = r#"
        steer_gains = [0.6, 0.0, 5.3]
        enable_speed_ctrl = true
        speed_gains = [0.85, 0.0, 3.1]
        const_throttle = 0.3

        [tuning]
        enable_tuning = true
        target = "speed"
        initial_gains = [0.0, 0.0, 0.0]
        initial_step_sizes = [1.0, 1.0, 1.0]
        warmup_steps = 100
        max_steps = 10000
        abort_threshold = 500.0
        convergence_threshold = 0.2
        reverse_penalty = 50000.0
    "#;

    #[test]
    fn test_parse_params() {
        let params: Params = util::params::from_str(PARAMS_TOML).unwrap();

        assert_eq!(params.steer_gains, GainVector::new(0.6, 0.0, 5.3));
        assert!(params.enable_speed_ctrl);
        assert!(params.tuning.enable_tuning);
        assert_eq!(params.tuning.target, TuneTarget::Speed);
        assert_eq!(params.tuning.max_steps, 10_000);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_default_params_valid() {
        assert!(Params::default().validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let mut params = Params::default();
        params.tuning.initial_step_sizes[2] = 0.0;
        assert!(matches!(params.validate(), Err(DriveCtrlError::InvalidParams(_))));

        let mut params = Params::default();
        params.tuning.warmup_steps = params.tuning.max_steps;
        assert!(matches!(params.validate(), Err(DriveCtrlError::InvalidParams(_))));

        let mut params = Params::default();
        params.tuning.convergence_threshold = std::f64::NAN;
        assert!(matches!(params.validate(), Err(DriveCtrlError::InvalidParams(_))));
    }
}
