//! Parameters structure for GaitCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::actuator_bus::ServoLimits;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Actuator bus channels for one leg's joints.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct LegMap {
    pub hip: u8,
    pub knee: u8,
    pub ankle: u8,
    pub foot: u8,
    pub toe: u8,
}

/// Neutral stance angles for a leg.
///
/// Units: degrees
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct NeutralAngles {
    pub hip_deg: f64,
    pub knee_deg: f64,
    pub ankle_deg: f64,
    pub foot_deg: f64,
    pub toe_deg: f64,
}

/// Parameters for gait control.
#[derive(Debug, Deserialize)]
pub struct Params {
    // ---- CHANNEL MAPPING ----

    /// Channels for the left leg's joints.
    pub left_leg: LegMap,

    /// Channels for the right leg's joints.
    pub right_leg: LegMap,

    /// Limits to attach all leg joints with.
    pub servo_limits: ServoLimits,

    // ---- KINEMATICS ----

    /// Neutral stance, shared by both legs.
    pub neutral: NeutralAngles,

    /// Hip travel produced by a full swing at full stride.
    ///
    /// Units: degrees
    pub hip_swing_deg: f64,

    /// Knee travel produced by a full lift.
    ///
    /// Units: degrees
    pub knee_lift_deg: f64,

    /// Ankle travel produced by a full lift.
    ///
    /// Units: degrees
    pub ankle_lift_deg: f64,

    /// Foot travel produced by a full lift.
    ///
    /// Units: degrees
    pub foot_lift_deg: f64,

    /// Toe travel produced by a full lift.
    ///
    /// Units: degrees
    pub toe_lift_deg: f64,

    /// Full-scale posture trim, applied as `(posture - 0.5) * this`.
    ///
    /// Units: degrees
    pub posture_trim_deg: f64,

    // ---- WAVEFORM SHAPING ----

    /// Swing scale for the inner leg during a turn.
    pub turn_inner_scale: f64,

    /// Swing scale for the outer leg during a turn.
    pub turn_outer_scale: f64,

    /// Exponent sharpening the lift waveform.
    pub lift_sharpness: f64,

    /// Speed multiplier applied by the "run" gait tag.
    pub run_speed_scale: f64,

    /// Lift multiplier applied by the "run" gait tag.
    pub run_lift_scale: f64,

    // ---- BOOT DEFAULTS ----

    /// Leg cycle rate at boot.
    ///
    /// Units: Hertz
    pub default_speed_hz: f64,

    /// Stride amplitude at boot, in [0, 1].
    pub default_stride: f64,

    /// Lift amplitude at boot, in [0, 1].
    pub default_lift: f64,

    /// Posture at boot, in [0, 1].
    pub default_posture: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for NeutralAngles {
    fn default() -> Self {
        NeutralAngles {
            hip_deg: 90.0,
            knee_deg: 90.0,
            ankle_deg: 90.0,
            foot_deg: 90.0,
            toe_deg: 90.0,
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Params {
            left_leg: LegMap {
                hip: 0,
                knee: 1,
                ankle: 2,
                foot: 3,
                toe: 4,
            },
            right_leg: LegMap {
                hip: 5,
                knee: 6,
                ankle: 7,
                foot: 8,
                toe: 9,
            },
            servo_limits: ServoLimits::default(),
            neutral: NeutralAngles::default(),
            hip_swing_deg: 25.0,
            knee_lift_deg: 20.0,
            ankle_lift_deg: 15.0,
            foot_lift_deg: 10.0,
            toe_lift_deg: 5.0,
            posture_trim_deg: 10.0,
            turn_inner_scale: 0.6,
            turn_outer_scale: 1.2,
            lift_sharpness: 1.2,
            run_speed_scale: 1.3,
            run_lift_scale: 0.8,
            default_speed_hz: 1.0,
            default_stride: 0.6,
            default_lift: 0.4,
            default_posture: 0.5,
        }
    }
}
