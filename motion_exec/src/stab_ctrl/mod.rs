//! Stabilization control module
//!
//! Maps the attitude estimate onto normalised correction levels for the
//! pelvis and spine mappers. When the estimate is unhealthy or the attitude
//! service is disabled, no levels are produced and the executive holds the
//! previous actuator command.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during StabCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum StabCtrlError {
    #[error("The attitude estimate contains non-finite angles")]
    NonFiniteAttitude,
}
