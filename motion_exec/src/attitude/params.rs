//! Parameters structure for the attitude service

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::{CalibrationOffsets, StabilizationGains};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the attitude service.
#[derive(Debug, Deserialize)]
pub struct Params {
    /// Target rate of the fusion task.
    ///
    /// Units: Hertz
    pub task_rate_hz: f64,

    /// Gradient gain of the orientation filter.
    ///
    /// Higher values track the accelerometer faster at the cost of noise.
    pub filter_beta: f64,

    /// Consecutive read failures before the task attempts to reinitialise
    /// the sensor.
    pub reinit_failure_limit: u32,

    /// Trim offsets applied after filtering.
    pub offsets: CalibrationOffsets,

    /// Boot-time stabilization gains.
    pub gains: StabilizationGains,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Params {
            task_rate_hz: 200.0,
            filter_beta: 0.1,
            reinit_failure_limit: 10,
            offsets: CalibrationOffsets::default(),
            gains: StabilizationGains::default(),
        }
    }
}
