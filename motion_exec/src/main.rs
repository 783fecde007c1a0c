//! Main motion-control executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the actuator bus, attitude service and all modules
//!     - Main loop:
//!         - Gait control processing, demands applied to the actuator bus
//!         - Attitude snapshot acquisition
//!         - Stabilization processing, levels applied through the body
//!           mappers
//!         - Archive writing on the 1 Hz boundary
//!         - Cycle management
//!
//! The attitude fusion task is the only other execution context, everything
//! above runs cooperatively on this thread at the fixed cycle rate.
//!
//! # Modules
//!
//! All cyclic modules (e.g. `gait_ctrl`) shall meet the following
//! requirements:
//!     1. Provide a public struct implementing the `util::module::State`
//!        trait.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use motion_lib::{
    actuator_bus::{self, ActuatorBus},
    attitude::{self, AttitudeService},
    body_ctrl::{self, BodyCtrl},
    data_store::{DataStore, SafeModeCause},
    gait_ctrl::WalkDirection,
    stab_ctrl,
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use std::env;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    archive::Archived,
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.02;

/// Number of cycles per second
const CYCLE_FREQUENCY_HZ: f64 = 1.0 / CYCLE_PERIOD_S;

/// Limit of the number of consecutive cycle overruns before safe mode is
/// engaged and the actuators are powered down.
const MAX_CONSEC_CYCLE_OVERRUNS: u64 = 50;

/// Length of a demo run before the executable exits.
///
/// Units: seconds
const DEMO_DURATION_S: f64 = 30.0;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "motion_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Strider Motion Control Executable\n");
    info!("Running on: {}", host::get_hostname());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let bus_params: actuator_bus::Params = util::params::load("actuator_bus.toml")
        .wrap_err("Could not load actuator bus params")?;
    let attitude_params: attitude::Params = util::params::load("attitude.toml")
        .wrap_err("Could not load attitude params")?;
    let body_params: body_ctrl::Params = util::params::load("body_ctrl.toml")
        .wrap_err("Could not load body mapper params")?;

    info!("Exec parameters loaded");

    // ---- PROCESS ARGUMENTS ----

    let args: Vec<String> = env::args().collect();

    let demo = if args.len() == 2 && args[1] == "demo" {
        info!("Demo mode requested");
        true
    }
    else if args.len() == 1 {
        false
    }
    else {
        return Err(eyre!(
            "Expected either zero arguments or \"demo\", found {:?}",
            &args[1..]
        ));
    };

    // ---- INITIALISE ACTUATOR BUS ----

    let mut bus = init_bus(&bus_params)?;

    // ---- INITIALISE ATTITUDE SERVICE ----

    let task_rate_hz = attitude_params.task_rate_hz;
    let mut attitude_service = AttitudeService::new(create_imu(), attitude_params);

    match attitude_service.begin() {
        Ok(()) => {
            attitude_service.start_task(task_rate_hz);
            info!("Attitude service initialised");
        }
        Err(e) => warn!(
            "IMU initialisation failed ({}), continuing in degraded mode without stabilization",
            e
        ),
    }

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();

    ds.gait_ctrl.init("gait_ctrl.toml", &session)
        .wrap_err("Failed to initialise GaitCtrl")?;
    info!("GaitCtrl init complete");

    ds.stab_ctrl.init("stab_ctrl.toml", &session)
        .wrap_err("Failed to initialise StabCtrl")?;
    info!("StabCtrl init complete");

    ds.gait_ctrl.attach_legs(&mut bus);

    let mut body_ctrl = BodyCtrl::new(body_params, &mut bus);

    info!("Module initialisation complete\n");

    if demo {
        info!("Walking forward at 1 Hz for {} s", DEMO_DURATION_S);
        ds.gait_ctrl.walk(WalkDirection::Forward, 1.0);
    }

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {

        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start(CYCLE_FREQUENCY_HZ);

        // Demo runs are time-limited so the executable can exit cleanly
        if demo && ds.cycle_time_s > DEMO_DURATION_S {
            info!("Demo complete, stopping");
            ds.gait_ctrl.stop();
            break;
        }

        // ---- GAIT PROCESSING ----

        ds.gait_ctrl_input.time_s = ds.cycle_time_s;

        match ds.gait_ctrl.proc(&ds.gait_ctrl_input) {
            Ok((o, r)) => {
                ds.gait_ctrl_output = o;
                ds.gait_ctrl_status_rpt = r;
            },
            Err(e) => {
                // GaitCtrl errors indicate an internal inconsistency, issue
                // the warning and hold the previous demands
                warn!("Error during GaitCtrl processing: {}", e)
            }
        };

        // Forward the demands to the actuator bus
        if !ds.safe {
            for (channel, deg) in ds.gait_ctrl_output.angles_deg.iter() {
                bus.write_degrees(*channel, *deg);
            }
        }

        // ---- STABILIZATION PROCESSING ----

        ds.attitude_est = attitude_service.get_snapshot();

        let stab_input = stab_ctrl::InputData {
            estimate: ds.attitude_est,
            gains: attitude_service.gains(),
            enabled: attitude_service.is_enabled(),
        };

        match ds.stab_ctrl.proc(&stab_input) {
            Ok((o, r)) => {
                ds.stab_ctrl_output = o;
                ds.stab_ctrl_status_rpt = r;
            },
            Err(e) => warn!("Error during StabCtrl processing: {}", e)
        };

        // Forward the levels to the body mappers. An unhealthy cycle
        // produces no levels and the previous command is held.
        if !ds.safe {
            if let Some(levels) = ds.stab_ctrl_output.levels {
                if ds.stab_ctrl.stabilize_pelvis() {
                    body_ctrl.pelvis.set_level(levels.roll_level, &mut bus);
                }
                if ds.stab_ctrl.stabilize_spine() {
                    body_ctrl.spine.set_level(levels.pitch_level, &mut bus);
                }
            }
        }

        // ---- WRITE ARCHIVES ----

        if ds.is_1_hz_cycle {
            if let Err(e) = ds.gait_ctrl.write() {
                warn!("Couldn't write GaitCtrl archives: {}", e);
            }

            util::session::save("attitude/estimate.json", ds.attitude_est);
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(CYCLE_PERIOD_S)
            .checked_sub(cycle_dur)
        {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;

                // Overrun-driven safe mode clears once the loop recovers, at
                // which point the powered-down actuators must be re-engaged
                let was_safe = ds.safe;
                ds.make_unsafe(SafeModeCause::PersistentCycleOverrun).ok();
                if was_safe && !ds.safe {
                    ds.gait_ctrl.attach_legs(&mut bus);
                    body_ctrl.reattach(&mut bus);
                }

                thread::sleep(d);
            },
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
                );
                ds.num_consec_cycle_overruns += 1;

                // If number of overruns greater than the limit power down
                if ds.num_consec_cycle_overruns > MAX_CONSEC_CYCLE_OVERRUNS {
                    let was_safe = ds.safe;
                    ds.make_safe(SafeModeCause::PersistentCycleOverrun);
                    if !was_safe && ds.safe {
                        bus.set_all_off();
                    }
                }
            }
        }

        // Increment cycle counter
        ds.num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    attitude_service.stop_task();
    bus.set_all_off();

    info!("End of execution");

    Ok(())
}

/// Create the actuator bus over the robot's hardware drivers.
#[cfg(all(target_arch = "arm", target_os = "linux"))]
fn init_bus(params: &actuator_bus::Params) -> Result<ActuatorBus, Report> {
    use motion_lib::actuator_bus::rppal_pwm::RppalSoftPwm;
    use pwm_pca9685::{Pca9685, SlaveAddr};

    let i2c = rppal::i2c::I2c::new()
        .wrap_err("Couldn't open the expander I2C bus")?;
    let expander = Pca9685::new(i2c, SlaveAddr::default());

    let direct = RppalSoftPwm::new()
        .map_err(|e| eyre!("Couldn't initialise GPIO PWM: {}", e))?;

    Ok(ActuatorBus::new(
        Box::new(expander),
        Box::new(direct),
        params,
    ))
}

/// Create the actuator bus over simulated drivers.
#[cfg(not(all(target_arch = "arm", target_os = "linux")))]
fn init_bus(params: &actuator_bus::Params) -> Result<ActuatorBus, Report> {
    use motion_lib::actuator_bus::sim::{SimDirect, SimExpander};

    info!("Not running on robot hardware, using simulated PWM drivers");

    Ok(ActuatorBus::new(
        Box::new(SimExpander::default()),
        Box::new(SimDirect::default()),
        params,
    ))
}

/// Create the inertial sensor for the attitude service.
#[cfg(all(target_arch = "arm", target_os = "linux"))]
fn create_imu() -> Box<dyn attitude::ImuSensor> {
    use motion_lib::attitude::{mpu6050::Mpu6050, sim::DisconnectedImu};

    match rppal::i2c::I2c::new() {
        Ok(i2c) => Box::new(Mpu6050::new(i2c)),
        Err(e) => {
            warn!(
                "Couldn't open the IMU I2C bus ({}), attitude will be unavailable",
                e
            );
            Box::new(DisconnectedImu::default())
        }
    }
}

/// Create the simulated inertial sensor.
#[cfg(not(all(target_arch = "arm", target_os = "linux")))]
fn create_imu() -> Box<dyn attitude::ImuSensor> {
    info!("Not running on robot hardware, using the simulated IMU");

    Box::new(attitude::sim::SimImu::default())
}
