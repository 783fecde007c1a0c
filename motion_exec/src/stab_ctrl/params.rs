//! Parameters structure for StabCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for stabilization control.
#[derive(Debug, Deserialize)]
pub struct Params {
    /// Forward roll corrections to the pelvis mapper.
    pub stabilize_pelvis: bool,

    /// Forward pitch corrections to the spine mapper.
    pub stabilize_spine: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Params {
            stabilize_pelvis: true,
            stabilize_spine: true,
        }
    }
}
