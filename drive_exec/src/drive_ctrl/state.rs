//! Implementations for the DriveCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, trace, warn};
use serde::Serialize;

// Internal
use super::{DriveCtrlError, Params, TuneTarget, TuningParams};
use crate::{
    eval::{EpisodeScore, RunEvaluator},
    pid::{GainVector, PidController},
    twiddle::{TuneStep, Tuner}
};
use comms_if::sim::{SimCmd, Telemetry};
use util::{
    archive::Archiver,
    module::State,
    params,
    session::{self, Session}
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Session-relative path of the CSV archive of completed episodes.
const EPISODES_ARCHIVE_PATH: &str = "drive_ctrl/episodes.csv";

/// Session-relative path the tuning result is saved to on convergence.
const TUNING_RESULT_PATH: &str = "drive_ctrl/tuning_history.json";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drive control module state
pub struct DriveCtrl {
    params: Params,

    steer_ctrl: PidController,
    speed_ctrl: PidController,

    /// Tuning in progress, `None` when tuning is disabled or has converged.
    tuning: Option<TuningSession>,

    /// Every episode completed so far.
    history: Vec<EpisodeRecord>,
    arch_episodes: Archiver
}

/// The evaluator and tuner for the controller being tuned. Each tuning run
/// owns its own pair so no scoring state is shared between controllers.
struct TuningSession {
    target: TuneTarget,
    evaluator: RunEvaluator,
    tuner: Tuner
}

/// Status report for DriveCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// The steering demand was clamped to `[-1, 1]`.
    pub steering_limited: bool,

    /// This step ended a tuning episode and a reset was requested.
    pub episode_complete: bool,

    /// The reverse driving penalty was applied to the current episode.
    pub reverse_penalty_applied: bool,

    /// Set only on the step at which tuning converged, holding the final gains.
    pub converged: Option<GainVector>
}

/// Archived summary of one tuning episode.
#[derive(Clone, Copy, Serialize, Debug)]
pub struct EpisodeRecord {
    pub episode: u32,
    pub target: TuneTarget,
    pub k_p: f64,
    pub k_i: f64,
    pub k_d: f64,
    pub accumulated_squared_error: f64,
    pub step_count: u32,
    pub aborted: bool,
    pub best_error: f64
}

/// Saved once tuning converges.
#[derive(Clone, Serialize, Debug)]
struct TuningResult {
    target: TuneTarget,
    gains: GainVector,
    episodes: Vec<EpisodeRecord>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCtrl {
    /// Create the module from already loaded parameters.
    pub fn new(params: Params) -> Result<Self, DriveCtrlError> {
        params.validate()?;
        Ok(Self::build(params))
    }

    fn build(params: Params) -> Self {
        let tuning = if params.tuning.enable_tuning {
            Some(TuningSession::new(&params.tuning))
        }
        else {
            None
        };

        // The tuned controller starts on the tuner's first candidate
        let mut steer_gains = params.steer_gains;
        let mut speed_gains = params.speed_gains;
        if let Some(ref t) = tuning {
            match t.target {
                TuneTarget::Steer => steer_gains = t.tuner.gains(),
                TuneTarget::Speed => speed_gains = t.tuner.gains()
            }
        }

        Self {
            steer_ctrl: PidController::new(steer_gains),
            speed_ctrl: PidController::new(speed_gains),
            tuning,
            history: Vec::new(),
            arch_episodes: Archiver::default(),
            params
        }
    }

    pub fn steer_ctrl(&self) -> &PidController {
        &self.steer_ctrl
    }

    pub fn speed_ctrl(&self) -> &PidController {
        &self.speed_ctrl
    }

    /// The tuner, if tuning is in progress.
    pub fn tuner(&self) -> Option<&Tuner> {
        self.tuning.as_ref().map(|t| &t.tuner)
    }

    pub fn history(&self) -> &[EpisodeRecord] {
        &self.history
    }

    /// The speed controller runs when enabled, while it's being tuned, and
    /// after its tuning has converged.
    fn speed_ctrl_active(&self) -> bool {
        self.params.enable_speed_ctrl
            || matches!(self.tuning, Some(TuningSession { target: TuneTarget::Speed, .. }))
    }

    /// Record the step with the evaluator and handle the end of an episode.
    ///
    /// Returns `Some(SimCmd::Reset)` if the episode ended on this step.
    fn proc_tuning(&mut self, cte: f64, report: &mut StatusReport) -> Option<SimCmd> {
        let session = self.tuning.as_mut()?;

        if !session.evaluator.record(cte) {
            return None
        }

        let score = session.evaluator.score()?;
        session.evaluator.reset();

        let evaluated = session.tuner.gains();
        let step = session.tuner.on_episode_complete(&score);
        let target = session.target;
        let episode = session.tuner.num_episodes();
        let best_error = session.tuner.state().best_error.unwrap_or(std::f64::NAN);

        self.log_episode(episode, target, evaluated, &score, best_error);

        let gains = match step {
            TuneStep::NextEpisode(g) => {
                info!("Restarting the run with {}", g);
                g
            },
            TuneStep::Converged(g) => {
                info!("Tuning of the {:?} controller converged after {} episodes", target, episode);
                info!("    Final gains: {}", g);

                session::save(TUNING_RESULT_PATH, TuningResult {
                    target,
                    gains: g,
                    episodes: self.history.clone()
                });

                // The tuned gains replace the configured ones, and a tuned
                // speed controller stays in use once tuning stops
                match target {
                    TuneTarget::Steer => self.params.steer_gains = g,
                    TuneTarget::Speed => {
                        self.params.speed_gains = g;
                        self.params.enable_speed_ctrl = true;
                    }
                }

                self.tuning = None;
                report.converged = Some(g);
                g
            }
        };

        // The run restarts from its initial conditions, so neither controller
        // keeps the error terms of the last episode
        match target {
            TuneTarget::Steer => {
                self.steer_ctrl.init(gains);
                self.speed_ctrl.init(self.speed_ctrl.gains());
            },
            TuneTarget::Speed => {
                self.steer_ctrl.init(self.steer_ctrl.gains());
                self.speed_ctrl.init(gains);
            }
        }

        report.episode_complete = true;
        Some(SimCmd::Reset)
    }

    fn log_episode(
        &mut self,
        episode: u32,
        target: TuneTarget,
        gains: GainVector,
        score: &EpisodeScore,
        best_error: f64
    ) {
        info!(
            "Episode {} complete: error = {:.6} over {} steps{} ({})",
            episode,
            score.accumulated_squared_error,
            score.step_count,
            if score.aborted { ", aborted" } else { "" },
            gains
        );

        let record = EpisodeRecord {
            episode,
            target,
            k_p: gains.k_p(),
            k_i: gains.k_i(),
            k_d: gains.k_d(),
            accumulated_squared_error: score.accumulated_squared_error,
            step_count: score.step_count,
            aborted: score.aborted,
            best_error
        };

        if let Err(e) = self.arch_episodes.serialise(record) {
            warn!("Could not archive episode {}: {}", episode, e);
        }
        self.history.push(record);
    }
}

impl Default for DriveCtrl {
    fn default() -> Self {
        Self::build(Params::default())
    }
}

impl State for DriveCtrl {
    type InitData = &'static str;
    type InitError = DriveCtrlError;

    type InputData = Telemetry;
    type OutputData = SimCmd;
    type StatusReport = StatusReport;
    type ProcError = DriveCtrlError;

    /// Initialise the DriveCtrl module.
    ///
    /// Expected init data is the path to the parameter file.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        let params: Params = params::load(init_data)
            .map_err(DriveCtrlError::ParamLoadError)?;

        *self = Self::new(params)?;

        if let Some(ref t) = self.tuning {
            info!(
                "Tuning the {:?} controller, starting from {}",
                t.target, t.tuner.gains()
            );

            self.arch_episodes = Archiver::from_path(session, EPISODES_ARCHIVE_PATH)
                .map_err(DriveCtrlError::ArchiveError)?;
        }

        Ok(())
    }

    /// Process one step of telemetry.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let t = input_data;
        if !(t.cte.is_finite() && t.speed.is_finite() && t.steering_angle.is_finite()) {
            return Err(DriveCtrlError::InvalidInput(*t))
        }

        let mut report = StatusReport::default();

        // At the end of an episode only the reset is sent
        if let Some(cmd) = self.proc_tuning(t.cte, &mut report) {
            return Ok((cmd, report))
        }

        self.steer_ctrl.update(t.cte);
        let steer_dem = self.steer_ctrl.output();
        let steering_angle = steer_dem.clamp(-1.0, 1.0);
        report.steering_limited = steering_angle != steer_dem;

        let throttle = if self.speed_ctrl_active() {
            self.speed_ctrl.update(t.cte.abs());
            1.0 + self.speed_ctrl.output()
        }
        else {
            self.params.const_throttle
        };

        // Driving backwards can keep the error small without actually
        // following the path, so such candidates are failed outright
        if let Some(ref mut session) = self.tuning {
            if session.target == TuneTarget::Speed && throttle < 0.0 && t.speed < 1.0 {
                warn!("Vehicle reversing, penalising the episode");
                session.evaluator.penalise(self.params.tuning.reverse_penalty);
                report.reverse_penalty_applied = true;
            }
        }

        trace!(
            "CTE: {:.4}, steering: {:.4}, throttle: {:.4}",
            t.cte, steering_angle, throttle
        );

        Ok((SimCmd::Steer { steering_angle, throttle }, report))
    }
}

impl TuningSession {
    fn new(params: &TuningParams) -> Self {
        Self {
            target: params.target,
            evaluator: RunEvaluator::new(
                params.warmup_steps,
                params.max_steps,
                params.abort_threshold
            ),
            tuner: Tuner::new(
                params.initial_gains,
                params.initial_step_sizes,
                params.convergence_threshold
            )
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn telem(cte: f64, speed: f64) -> Telemetry {
        Telemetry {
            cte,
            speed,
            steering_angle: 0.0
        }
    }

    fn tuning_params(target: TuneTarget) -> Params {
        let mut params = Params::default();
        params.tuning = TuningParams {
            enable_tuning: true,
            target,
            warmup_steps: 0,
            max_steps: 3,
            abort_threshold: 1e9,
            ..TuningParams::default()
        };
        params
    }

    #[test]
    fn test_constant_throttle() {
        let mut params = Params::default();
        params.steer_gains = GainVector::new(0.1, 0.0, 0.0);
        let mut dc = DriveCtrl::new(params).unwrap();

        let (cmd, report) = dc.proc(&telem(2.0, 10.0)).unwrap();

        assert_eq!(cmd, SimCmd::Steer { steering_angle: -0.2, throttle: 0.3 });
        assert!(!report.steering_limited);
        assert!(!report.episode_complete);
    }

    #[test]
    fn test_steering_clamped() {
        let mut params = Params::default();
        params.steer_gains = GainVector::new(1.0, 0.0, 0.0);
        let mut dc = DriveCtrl::new(params).unwrap();

        let (cmd, report) = dc.proc(&telem(5.0, 10.0)).unwrap();
        assert_eq!(cmd, SimCmd::Steer { steering_angle: -1.0, throttle: 0.3 });
        assert!(report.steering_limited);

        let (cmd, _) = dc.proc(&telem(-5.0, 10.0)).unwrap();
        assert!(matches!(cmd, SimCmd::Steer { steering_angle, .. } if steering_angle == 1.0));
    }

    #[test]
    fn test_speed_ctrl_throttle() {
        let mut params = Params::default();
        params.enable_speed_ctrl = true;
        params.speed_gains = GainVector::new(0.5, 0.0, 0.0);
        let mut dc = DriveCtrl::new(params).unwrap();

        // The speed controller sees the magnitude of the error
        let (cmd, _) = dc.proc(&telem(-0.5, 10.0)).unwrap();
        assert!(matches!(cmd, SimCmd::Steer { throttle, .. } if throttle == 0.75));
        assert_eq!(dc.speed_ctrl().p_error(), 0.5);
    }

    #[test]
    fn test_invalid_input() {
        let mut dc = DriveCtrl::new(tuning_params(TuneTarget::Steer)).unwrap();

        for t in &[telem(std::f64::NAN, 1.0), telem(1.0, std::f64::INFINITY)] {
            assert!(matches!(dc.proc(t), Err(DriveCtrlError::InvalidInput(_))));
        }

        // Nothing was touched
        assert_eq!(dc.steer_ctrl().i_error(), 0.0);
        assert_eq!(dc.tuning.as_ref().unwrap().evaluator.step_index(), 0);
    }

    #[test]
    fn test_tuning_starts_on_first_candidate() {
        let dc = DriveCtrl::new(tuning_params(TuneTarget::Steer)).unwrap();

        assert_eq!(dc.steer_ctrl().gains(), GainVector::new(1.0, 0.0, 0.0));
        assert_eq!(dc.speed_ctrl().gains(), Params::default().speed_gains);
    }

    #[test]
    fn test_episode_reset() {
        let mut dc = DriveCtrl::new(tuning_params(TuneTarget::Steer)).unwrap();

        for _ in 0..3 {
            let (cmd, report) = dc.proc(&telem(1.0, 10.0)).unwrap();
            assert!(matches!(cmd, SimCmd::Steer { .. }));
            assert!(!report.episode_complete);
        }
        assert_eq!(dc.steer_ctrl().i_error(), 3.0);

        let (cmd, report) = dc.proc(&telem(1.0, 10.0)).unwrap();
        assert_eq!(cmd, SimCmd::Reset);
        assert!(report.episode_complete);
        assert_eq!(report.converged, None);

        // Controller restarted on the next candidate, the ending step wasn't
        // passed to it
        assert_eq!(dc.steer_ctrl().gains(), GainVector::new(1.0, 1.0, 0.0));
        assert_eq!(dc.steer_ctrl().i_error(), 0.0);

        assert_eq!(dc.history().len(), 1);
        assert_eq!(dc.history()[0].accumulated_squared_error, 3.0);
        assert_eq!(dc.history()[0].k_p, 1.0);
        assert_eq!(dc.tuner().unwrap().state().best_error, Some(3.0));
    }

    #[test]
    fn test_tuning_converges() {
        let mut params = tuning_params(TuneTarget::Steer);
        params.tuning.convergence_threshold = 10.0;
        let mut dc = DriveCtrl::new(params).unwrap();

        // Constant error so no candidate ever improves. Seeding then two
        // failed trials on each of Ki and Kd completes the first cycle.
        let mut converged = Vec::new();
        let mut resets = 0;
        for _ in 0..(5 * 4) {
            let (cmd, report) = dc.proc(&telem(1.0, 10.0)).unwrap();
            if cmd == SimCmd::Reset {
                resets += 1;
            }
            if let Some(g) = report.converged {
                converged.push(g);
            }
        }

        assert_eq!(resets, 5);
        assert_eq!(converged, vec![GainVector::new(1.0, 0.0, 0.0)]);
        assert!(dc.tuner().is_none());
        assert_eq!(dc.steer_ctrl().gains(), GainVector::new(1.0, 0.0, 0.0));
        assert_eq!(dc.history().len(), 5);

        // Keeps driving without further resets or reports
        for _ in 0..10 {
            let (cmd, report) = dc.proc(&telem(1.0, 10.0)).unwrap();
            assert!(matches!(cmd, SimCmd::Steer { .. }));
            assert_eq!(report.converged, None);
        }
    }

    #[test]
    fn test_speed_tuning_reverse_penalty() {
        let mut params = tuning_params(TuneTarget::Speed);
        params.tuning.max_steps = 100;
        params.tuning.abort_threshold = 500.0;
        let mut dc = DriveCtrl::new(params).unwrap();

        // Speed controller is on while it's tuned, even though it's disabled
        assert!(dc.speed_ctrl_active());
        assert_eq!(dc.speed_ctrl().gains(), GainVector::new(1.0, 0.0, 0.0));

        // throttle = 1 - 1 * |2| = -1 while nearly stationary
        let (cmd, report) = dc.proc(&telem(2.0, 0.5)).unwrap();
        assert!(matches!(cmd, SimCmd::Steer { throttle, .. } if throttle == -1.0));
        assert!(report.reverse_penalty_applied);

        // The penalty aborts the episode on the next step
        let (cmd, report) = dc.proc(&telem(0.0, 0.5)).unwrap();
        assert_eq!(cmd, SimCmd::Reset);
        assert!(report.episode_complete);
        assert!(dc.history()[0].aborted);
        assert_eq!(dc.history()[0].accumulated_squared_error, 50_000.0);
    }

    #[test]
    fn test_speed_ctrl_kept_after_speed_tuning() {
        let mut params = tuning_params(TuneTarget::Speed);
        params.tuning.convergence_threshold = 10.0;
        assert!(!params.enable_speed_ctrl);
        let mut dc = DriveCtrl::new(params).unwrap();

        // Same cycle as the steering case, five episodes of four steps
        let mut converged = None;
        for _ in 0..(5 * 4) {
            let (_, report) = dc.proc(&telem(0.1, 10.0)).unwrap();
            if report.converged.is_some() {
                converged = report.converged;
            }
        }

        assert_eq!(converged, Some(GainVector::new(1.0, 0.0, 0.0)));
        assert!(dc.tuner().is_none());
        assert_eq!(dc.speed_ctrl().gains(), GainVector::new(1.0, 0.0, 0.0));

        // throttle = 1 - 1 * |0.1|, not the constant throttle
        let (cmd, _) = dc.proc(&telem(0.1, 10.0)).unwrap();
        assert!(matches!(cmd, SimCmd::Steer { throttle, .. } if throttle == 0.9));
    }

    #[test]
    fn test_no_penalty_when_moving() {
        let mut dc = DriveCtrl::new(tuning_params(TuneTarget::Speed)).unwrap();

        let (_, report) = dc.proc(&telem(2.0, 5.0)).unwrap();
        assert!(!report.reverse_penalty_applied);
    }
}
