//! Locomotion modes and gait parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use super::Params;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The locomotion mode the gait engine is currently executing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LocomotionMode {
    /// Holding the neutral stance, no phase advance.
    Idle,
    /// Walking forwards with anti-phase legs.
    WalkForward,
    /// Walking backwards (negated swing).
    WalkBackward,
    /// Rotating left using asymmetric stride.
    TurnLeft,
    /// Rotating right using asymmetric stride.
    TurnRight,
}

/// Direction for a walk command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkDirection {
    Forward,
    Backward,
}

/// Direction for a turn command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnDirection {
    Left,
    Right,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// High level parameters shaping the synthesised gait.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct GaitParameters {
    /// Leg cycle rate.
    ///
    /// Units: Hertz
    pub speed_hz: f64,

    /// Fore/aft stride amplitude, normalised to [0, 1].
    pub stride_amplitude: f64,

    /// Ground clearance amplitude, normalised to [0, 1].
    pub lift_amplitude: f64,

    /// Overall stance trim, 0 = crouched, 1 = extended.
    pub posture: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for LocomotionMode {
    fn default() -> Self {
        LocomotionMode::Idle
    }
}

impl LocomotionMode {
    /// True if the mode advances the phase clock.
    pub fn is_moving(&self) -> bool {
        !matches!(self, LocomotionMode::Idle)
    }
}

impl GaitParameters {
    /// Boot-time gait parameters from the module parameter file.
    pub fn from_params(params: &Params) -> Self {
        GaitParameters {
            speed_hz: params.default_speed_hz,
            stride_amplitude: params.default_stride,
            lift_amplitude: params.default_lift,
            posture: params.default_posture,
        }
    }
}
