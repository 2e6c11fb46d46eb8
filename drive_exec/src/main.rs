//! Main drive executable entry point.
//!
//! # Architecture
//!
//! The simulator drives the execution, one step per telemetry frame:
//!
//!     - Initialise the session, logging and DriveCtrl
//!     - Main loop:
//!         - Wait for a frame from the simulator
//!         - Parse the frame
//!         - DriveCtrl processing, producing a steer or reset command
//!         - Reply to the simulator
//!
//! # Modules
//!
//! DriveCtrl implements the `util::module::State` trait, and is initialised from
//! `drive_ctrl.toml` in the parameters directory.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod sim_server;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::WrapErr};
use log::{debug, error, info, warn};

// Internal
use comms_if::{
    net::NetParams,
    sim::{self, SimCmd, SimFrame}
};
use drive_lib::drive_ctrl::DriveCtrl;
use sim_server::SimServer;
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new(
        "drive_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("PID Drive Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams = util::params::load(
        "net.toml"
    ).wrap_err("Could not load net params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut drive_ctrl = DriveCtrl::default();
    drive_ctrl.init("drive_ctrl.toml", &session)
        .wrap_err("Failed to initialise DriveCtrl")?;
    info!("DriveCtrl init complete");

    // ---- INITIALISE NETWORK ----

    let mut sim_server = SimServer::new(&net_params)
        .wrap_err("Failed to initialise SimServer")?;
    info!("SimServer listening on {}", net_params.sim_endpoint);

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut was_connected = false;

    let loop_result: Result<(), Report> = loop {

        // Report changes in the connection
        let connected = sim_server.connected();
        if connected != was_connected {
            if connected {
                info!("Simulator connected");
            }
            else {
                warn!("Simulator disconnected");
            }
            was_connected = connected;
        }

        // ---- DATA INPUT ----

        // Timeouts come back as `Ok(None)`, any other recieve error won't
        // clear by retrying
        let frame = match sim_server.get_frame() {
            Ok(Some(f)) => f,
            Ok(None) => continue,
            Err(e) => {
                error!("{}", e);
                break Err(Report::new(e))
            }
        };

        // ---- CONTROL PROCESSING ----

        let cmd = match sim::parse_frame(&frame) {
            Ok(SimFrame::Telemetry(t)) => match drive_ctrl.proc(&t) {
                Ok((cmd, report)) => {
                    if let Some(gains) = report.converged {
                        info!("Tuning complete, continuing with {}", gains);
                    }
                    if report.steering_limited {
                        debug!("Steering demand limited");
                    }
                    Some(cmd)
                },
                Err(e) => {
                    warn!("Error during DriveCtrl processing: {}", e);
                    None
                }
            },
            Ok(SimFrame::NoData) => Some(SimCmd::Manual),
            Ok(SimFrame::Other(event)) => {
                debug!("Ignoring \"{}\" event", event);
                None
            },
            Ok(SimFrame::NotEvent) => None,
            Err(e) => {
                warn!("Could not parse frame from the simulator: {}", e);
                None
            }
        };

        // ---- OUTPUT ----

        // The socket can't recieve again until it has replied, so a failed
        // reply ends the execution
        if let Err(e) = sim_server.send_cmd(cmd.as_ref()) {
            error!("{}", e);
            break Err(Report::new(e))
        }
    };

    // ---- SHUTDOWN ----

    info!("End of execution");

    session.exit();

    loop_result.wrap_err("The connection to the simulator failed")
}
