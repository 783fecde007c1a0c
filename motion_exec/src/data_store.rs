//! # Data Store

use log::{info, warn};

use crate::{attitude::AttitudeEstimate, gait_ctrl, stab_ctrl};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Gives the reason the robot has been put into safe mode
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SafeModeCause {
    PersistentCycleOverrun,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    /// Executive time of the current cycle
    ///
    /// Units: seconds
    pub cycle_time_s: f64,

    // Safe mode variables
    /// Determines if the robot is in safe mode.
    pub safe: bool,

    /// Gives the reason for the robot being in safe mode.
    pub safe_cause: Option<SafeModeCause>,

    // GaitCtrl
    pub gait_ctrl: gait_ctrl::GaitCtrl,
    pub gait_ctrl_input: gait_ctrl::InputData,
    pub gait_ctrl_output: gait_ctrl::JointDems,
    pub gait_ctrl_status_rpt: gait_ctrl::StatusReport,

    // StabCtrl
    pub stab_ctrl: stab_ctrl::StabCtrl,
    pub stab_ctrl_output: stab_ctrl::OutputData,
    pub stab_ctrl_status_rpt: stab_ctrl::StatusReport,

    // Attitude
    /// Snapshot copied from the attitude service this cycle.
    pub attitude_est: AttitudeEstimate,

    // Monitoring Counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Puts the robot into safe mode with the given cause.
    ///
    /// The gait is emergency-stopped, the executive is expected to power the
    /// actuators down as well.
    pub fn make_safe(&mut self, cause: SafeModeCause) {
        if !self.safe {
            warn!("Make safe requested, cause: {:?}", cause);
            self.safe = true;
            self.safe_cause = Some(cause);

            // Make gait_ctrl safe
            self.gait_ctrl.emergency_stop();
        }
    }

    /// Attempts to disable the safe mode by clearing the given cause.
    ///
    /// Returns `Ok(())` if this cause was cleared and safe mode was disabled, or `Err(())`
    /// otherwise. To remove safe mode the provided cause must match the initial reason for safe
    /// mode being enabled.
    ///
    /// If safe mode was not enabled `Ok(())` is returned
    pub fn make_unsafe(&mut self, cause: SafeModeCause) -> Result<(), ()> {
        if !self.safe {
            return Ok(());
        }

        match self.safe_cause {
            Some(root_cause) => {
                if cause == root_cause {
                    self.safe = false;
                    self.safe_cause = None;
                    info!("Make unsafe requested, root cause match, safe mode disabled");
                    Ok(())
                } else {
                    Err(())
                }
            }
            None => Ok(()),
        }
    }

    /// Perform actions required at the start of a cycle.
    ///
    /// Clears those items that need clearing at the start of a cycle, and sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self, cycle_frequency_hz: f64) {
        if self.num_cycles % (cycle_frequency_hz as u128) == 0 {
            self.is_1_hz_cycle = true;
        } else {
            self.is_1_hz_cycle = false;
        }

        self.gait_ctrl_input = gait_ctrl::InputData::default();
        self.gait_ctrl_output = gait_ctrl::JointDems::default();
        self.gait_ctrl_status_rpt = gait_ctrl::StatusReport::default();

        self.stab_ctrl_output = stab_ctrl::OutputData::default();
        self.stab_ctrl_status_rpt = stab_ctrl::StatusReport::default();

        self.cycle_time_s = util::session::get_elapsed_seconds();
    }
}
