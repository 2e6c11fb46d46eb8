//! # Run evaluator
//!
//! Scores one candidate gain vector over a fixed length episode. The first
//! `warmup_steps` steps are not scored, which keeps the start-up transient
//! out of the score, and an episode whose error has clearly run away is cut
//! short.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Result of one completed episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpisodeScore {
    /// Sum of squared errors over the scored steps.
    pub accumulated_squared_error: f64,

    /// Number of steps recorded in the episode.
    pub step_count: u32,

    /// True if the episode was cut short by the abort threshold.
    pub aborted: bool
}

/// Drives one evaluation episode.
#[derive(Debug, Clone)]
pub struct RunEvaluator {
    /// Steps at or before this index are not scored.
    warmup_steps: u32,

    /// Index at which the episode is complete.
    max_steps: u32,

    /// Accumulated error above which the episode is aborted.
    abort_threshold: f64,

    step_index: u32,
    accumulated_error: f64,
    steps_recorded: u32,
    aborted: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RunEvaluator {
    pub fn new(warmup_steps: u32, max_steps: u32, abort_threshold: f64) -> Self {
        Self {
            warmup_steps,
            max_steps,
            abort_threshold,
            step_index: 0,
            accumulated_error: 0f64,
            steps_recorded: 0,
            aborted: false
        }
    }

    /// Record the error for one step.
    ///
    /// Returns `true` once the episode is complete, at which point the caller
    /// shall take the [`score`](Self::score) and [`reset`](Self::reset) the
    /// evaluator before starting the next episode.
    pub fn record(&mut self, error: f64) -> bool {
        self.steps_recorded += 1;

        // Once the error has run away jump straight to the end of the episode
        if self.accumulated_error > self.abort_threshold {
            if self.step_index != self.max_steps {
                self.aborted = true;
            }
            self.step_index = self.max_steps;
        }

        if self.step_index > self.warmup_steps {
            self.accumulated_error += error * error;
        }

        if self.step_index == self.max_steps {
            return true
        }

        self.step_index += 1;
        false
    }

    /// Overwrite the accumulated error with a penalty. If the penalty exceeds
    /// the abort threshold the episode ends on the next step.
    pub fn penalise(&mut self, penalty: f64) {
        self.accumulated_error = penalty;
    }

    pub fn is_complete(&self) -> bool {
        self.step_index == self.max_steps
    }

    /// Get the episode's score, or `None` if the episode isn't complete yet.
    pub fn score(&self) -> Option<EpisodeScore> {
        if !self.is_complete() {
            return None
        }

        Some(EpisodeScore {
            accumulated_squared_error: self.accumulated_error,
            step_count: self.steps_recorded,
            aborted: self.aborted
        })
    }

    /// Prepare for the next episode.
    pub fn reset(&mut self) {
        self.step_index = 0;
        self.accumulated_error = 0f64;
        self.steps_recorded = 0;
        self.aborted = false;
    }

    pub fn step_index(&self) -> u32 {
        self.step_index
    }

    pub fn accumulated_error(&self) -> f64 {
        self.accumulated_error
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
