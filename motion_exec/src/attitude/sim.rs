//! Simulated inertial sensors
//!
//! Stand-ins for the real IMU when the executable runs on a development host
//! or when the hardware bus cannot be opened.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use nalgebra::Vector3;

use super::{AttitudeError, ImuSample, ImuSensor};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Sensor reporting a level, motionless robot.
#[derive(Default)]
pub struct SimImu;

/// Sensor standing in for hardware that could not be opened.
///
/// Every operation fails, leaving the service permanently unhealthy, which
/// consumers already handle as degraded mode.
#[derive(Default)]
pub struct DisconnectedImu;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ImuSensor for SimImu {
    fn initialise(&mut self) -> Result<(), AttitudeError> {
        debug!("sim imu: initialised");
        Ok(())
    }

    fn read_sample(&mut self) -> Result<ImuSample, AttitudeError> {
        Ok(ImuSample {
            accel_mss: Vector3::new(0.0, 0.0, 9.80665),
            gyro_rads: Vector3::zeros(),
        })
    }
}

impl ImuSensor for DisconnectedImu {
    fn initialise(&mut self) -> Result<(), AttitudeError> {
        Err(AttitudeError::NoDevice)
    }

    fn read_sample(&mut self) -> Result<ImuSample, AttitudeError> {
        Err(AttitudeError::NoDevice)
    }
}
