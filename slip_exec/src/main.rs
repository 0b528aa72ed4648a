//! Main sandbox executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Load the telecommand script
//!     - Initialise the sandbox
//!     - Main loop:
//!         - Telecommand processing, for every TC due at the current simulated time
//!         - Sandbox tick
//!         - Archiving
//!         - Cycle management
//!
//! Execution stops once the script is exhausted and the sandbox is idle, or the maximum duration
//! has been simulated.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod tc_processor;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use params::ExecParams;
use sandbox_if::tm::TickTm;
use slip_lib::sandbox::{Sandbox, SandboxParams};
use util::{
    archive::Archived,
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    script_interpreter::{PendingTcs, ScriptInterpreter},
    session::Session,
    time,
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// SlipBot sandbox executable
#[derive(Debug, StructOpt)]
#[structopt(name = "slip_exec")]
struct Opt {
    /// Telecommand script to run
    #[structopt(parse(from_os_str))]
    script: PathBuf,

    /// Sandbox parameter file, relative to the params directory
    #[structopt(long, default_value = "sandbox.toml")]
    params: String,

    /// Executable parameter file, relative to the params directory
    #[structopt(long = "exec-params", default_value = "exec.toml")]
    exec_params: String,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session =
        Session::new("slip_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("SlipBot Sandbox Executable\n");
    info!("Running on: {}", host::get_platform());
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", opt);

    // ---- LOAD PARAMETERS ----

    let sandbox_params: SandboxParams =
        util::params::load(&opt.params).wrap_err("Could not load sandbox params")?;
    let exec_params: ExecParams =
        util::params::load(&opt.exec_params).wrap_err("Could not load exec params")?;

    info!("Parameters loaded");

    // ---- LOAD SCRIPT ----

    info!("Loading script from {:?}", opt.script);

    let mut si = ScriptInterpreter::new(&opt.script).wrap_err("Failed to load script")?;

    info!(
        "Loaded script lasts {:.02} s and contains {} TCs\n",
        si.get_duration(),
        si.get_num_tcs()
    );

    // ---- INITIALISE SANDBOX ----

    let mut sandbox = Sandbox::new(sandbox_params).wrap_err("Failed to create the sandbox")?;
    sandbox
        .init((), &session)
        .wrap_err("Failed to initialise the sandbox")?;

    info!("Sandbox initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut script_finished = false;
    let mut last_tm = TickTm::default();
    let mut num_cycles: u64 = 0;
    let loop_start = chrono::Utc::now();

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- TELECOMMAND PROCESSING ----

        if !script_finished {
            match si.get_pending_tcs(sandbox.sim_time_s()) {
                PendingTcs::None => (),
                PendingTcs::Some(tc_vec) => {
                    for tc in tc_vec.iter() {
                        tc_processor::exec(&mut sandbox, tc);
                    }
                }
                PendingTcs::EndOfScript => {
                    info!("End of TC script reached");
                    script_finished = true;
                }
            }
        }

        // ---- SANDBOX PROCESSING ----

        let output = sandbox.tick(exec_params.cycle_period_s);

        for event in output.events.iter() {
            info!("Event at {:.2} s: {:?}", output.sim_time_s, event);
        }

        // ---- WRITE ARCHIVES ----

        if let Err(e) = sandbox.write(output.sim_time_s) {
            warn!("Could not write sandbox archives: {}", e);
        }

        last_tm = output.to_tm();

        // ---- CYCLE MANAGEMENT ----

        num_cycles += 1;

        if script_finished && sandbox.is_idle() {
            info!("Script complete and sandbox idle, stopping");
            break;
        }

        if sandbox.sim_time_s() >= exec_params.max_duration_s {
            warn!(
                "Maximum duration of {:.1} s reached, stopping",
                exec_params.max_duration_s
            );
            break;
        }

        if exec_params.realtime {
            let cycle_dur = Instant::now() - cycle_start_instant;
            let period = Duration::from_secs_f64(exec_params.cycle_period_s);

            // Get sleep duration
            match period.checked_sub(cycle_dur) {
                Some(d) => thread::sleep(d),
                None => warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - period.as_secs_f64()
                ),
            }
        }
    }

    // ---- SHUTDOWN ----

    info!(
        "Ran {} cycles, {:.2} s simulated in {:.3} s",
        num_cycles,
        sandbox.sim_time_s(),
        time::duration_to_seconds(chrono::Utc::now() - loop_start).unwrap_or(f64::NAN)
    );

    session.save("final_tm.json", last_tm);

    info!("End of execution");

    session.exit();

    Ok(())
}
