//! Implementations for the StabCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;

// Internal
use super::{Params, StabCtrlError};
use crate::attitude::{AttitudeEstimate, StabilizationGains};
use util::{maths, module::State, params, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Stabilization control module state
#[derive(Default)]
pub struct StabCtrl {
    pub(crate) params: Params,

    pub(crate) report: StatusReport,
}

/// Input data to Stabilization Control.
#[derive(Default)]
pub struct InputData {
    /// The latest attitude snapshot.
    pub estimate: AttitudeEstimate,

    /// Gains mapping angles onto correction levels.
    pub gains: StabilizationGains,

    /// Whether the attitude service output should be applied.
    pub enabled: bool,
}

/// Output correction levels from StabCtrl.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct OutputData {
    /// Correction levels, `None` when the correction is held this cycle.
    pub levels: Option<StabLevels>,
}

/// Normalised correction levels for the body mappers.
#[derive(Clone, Copy, Serialize, Debug)]
pub struct StabLevels {
    /// Pelvis roll correction, in [0, 1].
    pub roll_level: f64,

    /// Spine pitch correction, in [0, 1].
    pub pitch_level: f64,
}

/// Status report for StabCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// True if the correction was held rather than computed this cycle.
    pub held: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for StabCtrl {
    type InitData = &'static str;
    type InitError = params::LoadError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = StabCtrlError;

    /// Initialise the StabCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, _session: &Session)
        -> Result<(), Self::InitError>
    {
        self.params = params::load(init_data)?;

        Ok(())
    }

    /// Perform cyclic processing of Stabilization Control.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        self.report = StatusReport::default();

        // Hold the previous actuator command rather than writing a default
        // when the estimate can't be trusted
        if !input_data.enabled || !input_data.estimate.healthy {
            self.report.held = true;
            return Ok((OutputData { levels: None }, self.report));
        }

        let roll_deg = input_data.estimate.roll_deg;
        let pitch_deg = input_data.estimate.pitch_deg;

        if !roll_deg.is_finite() || !pitch_deg.is_finite() {
            return Err(StabCtrlError::NonFiniteAttitude);
        }

        let gains = &input_data.gains;

        let levels = StabLevels {
            roll_level: level_from_angle(roll_deg, gains.k_roll, gains.b_roll),
            pitch_level: level_from_angle(pitch_deg, gains.k_pitch, gains.b_pitch),
        };

        trace!(
            "StabCtrl levels: roll {:.3}, pitch {:.3}",
            levels.roll_level,
            levels.pitch_level
        );

        Ok((
            OutputData {
                levels: Some(levels),
            },
            self.report,
        ))
    }
}

impl StabCtrl {
    /// True if roll corrections should be forwarded to the pelvis mapper.
    pub fn stabilize_pelvis(&self) -> bool {
        self.params.stabilize_pelvis
    }

    /// True if pitch corrections should be forwarded to the spine mapper.
    pub fn stabilize_spine(&self) -> bool {
        self.params.stabilize_spine
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Linear angle to level mapping, clamped into [0, 1].
fn level_from_angle(angle_deg: f64, k: f64, b: f64) -> f64 {
    maths::clamp(&(k * angle_deg + b), &0.0, &1.0)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const EPS: f64 = 1e-12;

    fn healthy_input(roll_deg: f64, pitch_deg: f64) -> InputData {
        InputData {
            estimate: AttitudeEstimate {
                roll_deg,
                pitch_deg,
                healthy: true,
                ..Default::default()
            },
            gains: StabilizationGains::default(),
            enabled: true,
        }
    }

    #[test]
    fn test_level_mapping() {
        let mut stab = StabCtrl::default();

        // Default gains: level = 0.01 * angle + 0.5
        let (output, report) = stab.proc(&healthy_input(10.0, -20.0)).unwrap();
        let levels = output.levels.unwrap();

        assert!(!report.held);
        assert!((levels.roll_level - 0.6).abs() < EPS);
        assert!((levels.pitch_level - 0.3).abs() < EPS);
    }

    #[test]
    fn test_levels_clamped_to_unit_range() {
        let mut stab = StabCtrl::default();

        let (output, _) = stab.proc(&healthy_input(1000.0, -1000.0)).unwrap();
        let levels = output.levels.unwrap();

        assert_eq!(levels.roll_level, 1.0);
        assert_eq!(levels.pitch_level, 0.0);
    }

    #[test]
    fn test_unhealthy_estimate_holds() {
        let mut stab = StabCtrl::default();

        let mut input = healthy_input(10.0, 10.0);
        input.estimate.healthy = false;

        let (output, report) = stab.proc(&input).unwrap();

        assert!(output.levels.is_none());
        assert!(report.held);
    }

    #[test]
    fn test_disabled_service_holds() {
        let mut stab = StabCtrl::default();

        let mut input = healthy_input(10.0, 10.0);
        input.enabled = false;

        let (output, report) = stab.proc(&input).unwrap();

        assert!(output.levels.is_none());
        assert!(report.held);
    }

    #[test]
    fn test_non_finite_attitude_is_an_error() {
        let mut stab = StabCtrl::default();

        let input = healthy_input(f64::NAN, 0.0);
        assert!(stab.proc(&input).is_err());
    }
}
