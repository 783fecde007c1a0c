//! Gait control module
//!
//! Converts high level locomotion intents (walk, turn, stop) into per-leg
//! joint angle demands, synthesised from a phase clock and a small set of
//! gait parameters.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod mode;
mod params;
mod state;
mod calc_walk;
mod calc_turn;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use mode::*;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of legs on the robot.
pub const NUM_LEGS: usize = 2;

/// The number of actuated joints in each leg.
pub const JOINTS_PER_LEG: usize = 5;

/// Speed band applied when entering a moving mode directly.
///
/// Units: Hertz
pub const MODE_ENTRY_SPEED_BAND_HZ: (f64, f64) = (0.1, 3.0);

/// Speed band applied to live gait adjustments.
///
/// Units: Hertz
pub const LIVE_SPEED_BAND_HZ: (f64, f64) = (0.05, 4.0);

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during GaitCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum GaitCtrlError {
    #[error("In a moving mode but no phase origin is set")]
    NoPhaseOrigin,
}
