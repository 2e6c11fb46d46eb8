//! # Twiddle gain tuner
//!
//! Coordinate search over the three PID gains. Each episode evaluates one
//! candidate, perturbing a single gain by its step size:
//!
//! 1. Try `gain + step`. If the error improves keep it, grow the step by 10%
//!    and move on to the next gain.
//! 2. Otherwise try `gain - step`. If that improves keep it the same way.
//! 3. Otherwise restore the gain, shrink the step by 10% and move on.
//!
//! Once a full cycle over the gains ends with the step sizes summing to less
//! than the convergence threshold the search stops.
//!
//! The first episode only calibrates the best error. Its candidate (the
//! initial gains plus the first step) is kept and the search moves straight
//! on to the second gain.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use serde::Serialize;

// Internal
use crate::{
    eval::EpisodeScore,
    pid::{GainVector, NUM_GAINS}
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Factor applied to a step size after an improvement.
pub const STEP_GROWTH: f64 = 1.1;

/// Factor applied to a step size after both directions failed to improve.
pub const STEP_SHRINK: f64 = 0.9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The complete state of the search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchState {
    /// Current candidate gains.
    pub gains: GainVector,

    /// Perturbation applied to each gain, always strictly positive.
    pub step_sizes: GainVector,

    /// Index of the gain being perturbed.
    pub active_index: usize,

    /// Which direction is being tried on the active gain.
    pub phase: Phase,

    /// Lowest episode error seen so far, `None` before the first episode.
    pub best_error: Option<f64>
}

/// Stateful wrapper around [`SearchState`] which remembers convergence.
#[derive(Debug, Clone)]
pub struct Tuner {
    state: SearchState,
    convergence_threshold: f64,
    converged: bool,
    num_episodes: u32
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Direction being tried on the active gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    TryPlus,
    TryMinus
}

/// What the caller should do after an episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TuneStep {
    /// Run another episode with these gains.
    NextEpisode(GainVector),

    /// The search has finished, these are the final gains.
    Converged(GainVector)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SearchState {
    /// Start a search from the given gains and step sizes. The first candidate
    /// is already stepped up on the proportional gain.
    pub fn new(initial_gains: GainVector, step_sizes: GainVector) -> Self {
        let mut state = Self {
            gains: initial_gains,
            step_sizes,
            active_index: 0,
            phase: Phase::TryPlus,
            best_error: None
        };
        state.apply_trial();
        state
    }

    /// Add the active step size to the active gain.
    fn apply_trial(&mut self) {
        self.gains[self.active_index] += self.step_sizes[self.active_index];
    }

    /// Move on to the next gain, starting with a positive step.
    fn advance(&mut self) {
        self.phase = Phase::TryPlus;
        self.active_index = (self.active_index + 1) % NUM_GAINS;
    }
}

impl Tuner {
    pub fn new(
        initial_gains: GainVector,
        step_sizes: GainVector,
        convergence_threshold: f64
    ) -> Self {
        Self {
            state: SearchState::new(initial_gains, step_sizes),
            convergence_threshold,
            converged: false,
            num_episodes: 0
        }
    }

    /// Gains to evaluate in the current episode, or the final gains once
    /// converged.
    pub fn gains(&self) -> GainVector {
        self.state.gains
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Number of episodes consumed, including the one which converged.
    pub fn num_episodes(&self) -> u32 {
        self.num_episodes
    }

    /// Consume the score of a completed episode and decide what to do next.
    ///
    /// Once converged the state is frozen and every call returns
    /// `TuneStep::Converged` with the same gains.
    pub fn on_episode_complete(&mut self, score: &EpisodeScore) -> TuneStep {
        if self.converged {
            return TuneStep::Converged(self.state.gains)
        }

        self.num_episodes += 1;

        let (state, step) = transition(
            self.state,
            score.accumulated_squared_error,
            self.convergence_threshold
        );
        self.state = state;

        if let TuneStep::Converged(_) = step {
            self.converged = true;
        }

        step
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Advance the search given the error of the episode which evaluated
/// `state.gains`.
///
/// Convergence is only checked when the search is about to start a new cycle
/// on the first gain, in which case the returned gains are the best found and
/// no new trial is applied.
pub fn transition(
    mut state: SearchState,
    error: f64,
    convergence_threshold: f64
) -> (SearchState, TuneStep) {
    let i = state.active_index;

    match state.best_error {
        None => {
            debug!("First episode sets the best error to {}", error);
            state.best_error = Some(error);
            state.advance();
        },
        Some(best) if error < best => {
            debug!("Gain {} improved the error from {} to {}", i, best, error);
            state.best_error = Some(error);
            state.step_sizes[i] *= STEP_GROWTH;
            state.advance();
        },
        Some(_) => match state.phase {
            Phase::TryPlus => {
                state.phase = Phase::TryMinus;
                state.gains[i] -= 2.0 * state.step_sizes[i];
                return (state, TuneStep::NextEpisode(state.gains))
            },
            Phase::TryMinus => {
                debug!("No improvement on gain {}, shrinking its step", i);
                state.gains[i] += state.step_sizes[i];
                state.step_sizes[i] *= STEP_SHRINK;
                state.advance();
            }
        }
    }

    if state.active_index == 0 && state.step_sizes.sum() < convergence_threshold {
        return (state, TuneStep::Converged(state.gains))
    }

    state.apply_trial();
    (state, TuneStep::NextEpisode(state.gains))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn score(err: f64) -> EpisodeScore {
        EpisodeScore {
            accumulated_squared_error: err,
            step_count: 100,
            aborted: false
        }
    }

    fn assert_gains_near(a: GainVector, b: GainVector) {
        for i in 0..NUM_GAINS {
            assert!(
                (a[i] - b[i]).abs() < 1e-9,
                "gains differ at {}: {} != {}", i, a, b
            );
        }
    }

    fn ones() -> GainVector {
        GainVector::new(1.0, 1.0, 1.0)
    }

    #[test]
    fn test_initial_state() {
        let tuner = Tuner::new(GainVector::new(0.5, 0.0, 2.0), ones(), 0.2);

        assert_eq!(tuner.gains(), GainVector::new(1.5, 0.0, 2.0));
        assert_eq!(tuner.state().active_index, 0);
        assert_eq!(tuner.state().phase, Phase::TryPlus);
        assert_eq!(tuner.state().best_error, None);
        assert!(!tuner.is_converged());
    }

    #[test]
    fn test_first_episode_seeds_best_error() {
        let mut tuner = Tuner::new(GainVector::default(), ones(), 0.2);

        let step = tuner.on_episode_complete(&score(10.0));

        // The candidate is kept and the search moves on without growing the step
        assert_eq!(step, TuneStep::NextEpisode(GainVector::new(1.0, 1.0, 0.0)));
        assert_eq!(tuner.state().best_error, Some(10.0));
        assert_eq!(tuner.state().active_index, 1);
        assert_eq!(tuner.state().step_sizes, ones());
    }

    #[test]
    fn test_improvement() {
        let mut tuner = Tuner::new(GainVector::default(), ones(), 0.2);
        tuner.on_episode_complete(&score(10.0));

        let step = tuner.on_episode_complete(&score(5.0));

        assert_eq!(step, TuneStep::NextEpisode(GainVector::new(1.0, 1.0, 1.0)));
        assert_eq!(tuner.state().best_error, Some(5.0));
        assert_eq!(tuner.state().step_sizes, GainVector::new(1.0, 1.1, 1.0));
        assert_eq!(tuner.state().active_index, 2);
        assert_eq!(tuner.state().phase, Phase::TryPlus);
    }

    #[test]
    fn test_no_improvement() {
        let mut tuner = Tuner::new(GainVector::default(), ones(), 0.2);
        tuner.on_episode_complete(&score(10.0));

        // Plus failed, try minus on the same gain
        let step = tuner.on_episode_complete(&score(12.0));
        assert_eq!(step, TuneStep::NextEpisode(GainVector::new(1.0, -1.0, 0.0)));
        assert_eq!(tuner.state().phase, Phase::TryMinus);
        assert_eq!(tuner.state().active_index, 1);

        // Equal error is not an improvement either, restore and shrink
        let step = tuner.on_episode_complete(&score(10.0));
        assert_eq!(step, TuneStep::NextEpisode(GainVector::new(1.0, 0.0, 1.0)));
        assert_eq!(tuner.state().step_sizes, GainVector::new(1.0, 0.9, 1.0));
        assert_eq!(tuner.state().active_index, 2);
        assert_eq!(tuner.state().phase, Phase::TryPlus);
        assert_eq!(tuner.state().best_error, Some(10.0));
    }

    #[test]
    fn test_improvement_on_minus() {
        let mut tuner = Tuner::new(GainVector::default(), ones(), 0.2);
        tuner.on_episode_complete(&score(10.0));
        tuner.on_episode_complete(&score(12.0));

        let step = tuner.on_episode_complete(&score(8.0));

        // The negative step is kept
        assert_eq!(step, TuneStep::NextEpisode(GainVector::new(1.0, -1.0, 1.0)));
        assert_eq!(tuner.state().best_error, Some(8.0));
        assert_eq!(tuner.state().step_sizes, GainVector::new(1.0, 1.1, 1.0));
    }

    #[test]
    fn test_wraps_to_first_gain() {
        let mut tuner = Tuner::new(GainVector::default(), ones(), 0.2);
        tuner.on_episode_complete(&score(10.0));
        tuner.on_episode_complete(&score(9.0));

        let step = tuner.on_episode_complete(&score(8.0));

        assert_eq!(step, TuneStep::NextEpisode(GainVector::new(2.0, 1.0, 1.0)));
        assert_eq!(tuner.state().active_index, 0);
    }

    #[test]
    fn test_convergence() {
        let mut tuner = Tuner::new(GainVector::default(), ones(), 0.2);
        tuner.on_episode_complete(&score(1.0));

        let mut final_gains = None;
        for _ in 0..1000 {
            match tuner.on_episode_complete(&score(1.0)) {
                TuneStep::NextEpisode(_) => {
                    assert!(tuner.state().step_sizes.0.iter().all(|s| *s > 0.0));
                },
                TuneStep::Converged(g) => {
                    final_gains = Some(g);
                    break
                }
            }
        }

        let final_gains = final_gains.expect("tuner did not converge");
        assert!(tuner.is_converged());
        assert!(tuner.state().step_sizes.sum() < 0.2);
        assert_eq!(tuner.state().active_index, 0);

        // Nothing ever improved on the seeded candidate
        assert_gains_near(final_gains, GainVector::new(1.0, 0.0, 0.0));

        // Converged is terminal
        let frozen = *tuner.state();
        let num_episodes = tuner.num_episodes();
        assert_eq!(tuner.on_episode_complete(&score(0.0)), TuneStep::Converged(final_gains));
        assert_eq!(*tuner.state(), frozen);
        assert_eq!(tuner.num_episodes(), num_episodes);
    }

    #[test]
    fn test_convergence_only_checked_on_first_gain() {
        // Threshold already satisfied, but the search still has to finish the
        // cycle before it can converge
        let mut tuner = Tuner::new(GainVector::default(), ones(), 100.0);

        assert!(matches!(tuner.on_episode_complete(&score(1.0)), TuneStep::NextEpisode(_)));
        assert!(matches!(tuner.on_episode_complete(&score(0.5)), TuneStep::NextEpisode(_)));
        assert_eq!(tuner.state().active_index, 2);

        let step = tuner.on_episode_complete(&score(0.25));
        assert_eq!(step, TuneStep::Converged(GainVector::new(1.0, 1.0, 1.0)));
        assert_eq!(tuner.num_episodes(), 3);
    }
}
