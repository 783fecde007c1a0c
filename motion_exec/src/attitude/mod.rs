//! # Attitude Service Module
//!
//! This module estimates the robot's orientation from an inertial sensor. A
//! dedicated fusion task reads the sensor at a fixed rate, integrates the
//! gyro and corrects drift toward the accelerometer's gravity direction, then
//! publishes a roll/pitch/yaw snapshot under a lock.
//!
//! Consumers on the main loop read the snapshot through [`AttitudeService::
//! get_snapshot`], which uses a bounded wait and falls back to the last good
//! copy so the control loop never blocks on the fusion task.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Gradient-descent orientation filter.
pub mod filter;

/// [`ImuSensor`] implementation for MPU6050-class devices.
pub mod mpu6050;

/// Simulated sensors used when not running on the robot's hardware.
pub mod sim;

/// Fixed-period fusion task.
mod task;

/// Parameters for the attitude service.
mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use nalgebra::Vector3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// Internal
pub use params::*;
use task::FusionTask;
use util::maths;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Bounded wait applied when copying the shared snapshot.
///
/// On expiry the reader keeps its previous copy, favouring control-loop
/// liveness over freshness.
const SNAPSHOT_LOCK_TIMEOUT: Duration = Duration::from_millis(2);

/// Band the fusion task rate is clamped into.
///
/// Units: Hertz
const TASK_RATE_BAND_HZ: (f64, f64) = (50.0, 1000.0);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The published attitude estimate.
///
/// Created zeroed and unhealthy at service init, mutated only by the fusion
/// task and read only via a locked copy.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct AttitudeEstimate {
    /// Roll angle, positive right side down, in (-180, 180].
    ///
    /// Units: degrees
    pub roll_deg: f64,

    /// Pitch angle, positive nose up, in (-180, 180].
    ///
    /// Units: degrees
    pub pitch_deg: f64,

    /// Heading relative to an arbitrary reference, in (-180, 180].
    ///
    /// Units: degrees
    pub yaw_deg: f64,

    /// Capture time of the sample, seconds since the service epoch.
    pub sample_time_s: f64,

    /// True while the sensor is being read successfully.
    pub healthy: bool,

    /// Total number of failed sensor reads.
    pub error_count: u32,

    /// Total number of successful sensor reads.
    pub success_count: u32,
}

/// Linear coefficients mapping measured angles onto normalised servo
/// correction levels, `level = clamp(k * angle_deg + b, 0, 1)`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StabilizationGains {
    pub k_roll: f64,
    pub b_roll: f64,
    pub k_pitch: f64,
    pub b_pitch: f64,
}

/// Trim offsets zeroing the reference attitude.
///
/// Units: degrees
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CalibrationOffsets {
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
}

/// One raw inertial sample.
#[derive(Clone, Copy, Debug)]
pub struct ImuSample {
    /// Specific force measured by the accelerometer.
    ///
    /// Units: m/s^2
    pub accel_mss: Vector3<f64>,

    /// Angular rate measured by the gyroscope.
    ///
    /// Units: rad/s
    pub gyro_rads: Vector3<f64>,
}

/// State shared between the fusion task and the service facade.
pub(crate) struct Shared {
    pub estimate: Mutex<AttitudeEstimate>,
    pub offsets: Mutex<CalibrationOffsets>,
    pub gains: Mutex<StabilizationGains>,
    pub running: AtomicBool,
    pub enabled: AtomicBool,
}

/// The attitude service itself.
pub struct AttitudeService {
    params: Params,

    shared: Arc<Shared>,

    /// The sensor, present until it is handed to the fusion task.
    sensor: Option<Box<dyn ImuSensor>>,

    task: Option<JoinHandle<()>>,

    /// Monotonic epoch all snapshot timestamps are relative to.
    epoch: Instant,

    /// Fallback returned when the snapshot lock times out.
    last_snapshot: AttitudeEstimate,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for inertial sensors.
pub trait ImuSensor: Send {
    /// Probe, wake and configure the device.
    ///
    /// Called once at `begin()` and again during self-healing
    /// reinitialisation after persistent read failures.
    fn initialise(&mut self) -> Result<(), AttitudeError>;

    /// Read one inertial sample.
    fn read_sample(&mut self) -> Result<ImuSample, AttitudeError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the attitude service.
#[derive(thiserror::Error, Debug)]
pub enum AttitudeError {
    #[error("No IMU responded at any known address")]
    NoDevice,

    #[error("I2C communication with the IMU failed")]
    I2c,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for StabilizationGains {
    fn default() -> Self {
        StabilizationGains {
            k_roll: 0.010,
            b_roll: 0.50,
            k_pitch: 0.010,
            b_pitch: 0.50,
        }
    }
}

impl AttitudeService {
    /// Create a new service over the given sensor.
    ///
    /// The estimate starts zeroed and unhealthy, the service starts enabled.
    pub fn new(sensor: Box<dyn ImuSensor>, params: Params) -> Self {
        let shared = Arc::new(Shared {
            estimate: Mutex::new(AttitudeEstimate::default()),
            offsets: Mutex::new(params.offsets),
            gains: Mutex::new(params.gains),
            running: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
        });

        Self {
            params,
            shared,
            sensor: Some(sensor),
            task: None,
            epoch: Instant::now(),
            last_snapshot: AttitudeEstimate::default(),
        }
    }

    /// Probe and configure the sensor.
    ///
    /// Returns an error if no device responds at any known address, in which
    /// case the system may continue in degraded mode (gait without
    /// stabilization).
    pub fn begin(&mut self) -> Result<(), AttitudeError> {
        match self.sensor {
            Some(ref mut s) => s.initialise(),
            None => {
                debug!("begin called while the fusion task owns the sensor");
                Err(AttitudeError::NoDevice)
            }
        }
    }

    /// Launch the fusion task at the given fixed rate.
    ///
    /// Idempotent while the task is already running. The rate is clamped
    /// into the supported band.
    pub fn start_task(&mut self, rate_hz: f64) {
        if self.task.is_some() {
            debug!("Fusion task already running");
            return;
        }

        let sensor = match self.sensor.take() {
            Some(s) => s,
            None => {
                warn!("Cannot start the fusion task without a sensor");
                return;
            }
        };

        let rate_hz = maths::clamp(&rate_hz, &TASK_RATE_BAND_HZ.0, &TASK_RATE_BAND_HZ.1);

        self.shared.running.store(true, Ordering::SeqCst);

        let task = FusionTask::new(
            self.shared.clone(),
            sensor,
            self.params.filter_beta,
            self.params.reinit_failure_limit,
            self.epoch,
        );

        self.task = Some(std::thread::spawn(move || task.run(rate_hz)));

        info!("Attitude fusion task started at {} Hz", rate_hz);
    }

    /// Stop the fusion task.
    ///
    /// The running flag is checked once per loop iteration, so the task
    /// exits within one period of being signalled.
    pub fn stop_task(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.task.take() {
            if handle.join().is_err() {
                warn!("Fusion task panicked");
            }

            info!("Attitude fusion task stopped");
        }
    }

    /// Copy the latest published estimate.
    ///
    /// Uses a bounded-wait lock, on expiry the previous successfully copied
    /// snapshot is returned, so this call never blocks indefinitely.
    pub fn get_snapshot(&mut self) -> AttitudeEstimate {
        match self.shared.estimate.try_lock_for(SNAPSHOT_LOCK_TIMEOUT) {
            Some(estimate) => {
                self.last_snapshot = *estimate;
                self.last_snapshot
            }
            None => self.last_snapshot,
        }
    }

    /// Set the trim offsets zeroing the reference attitude.
    pub fn set_offsets(&mut self, roll_deg: f64, pitch_deg: f64, yaw_deg: f64) {
        *self.shared.offsets.lock() = CalibrationOffsets {
            roll_deg,
            pitch_deg,
            yaw_deg,
        };
    }

    /// Set the stabilization gains.
    pub fn set_gains(&mut self, gains: StabilizationGains) {
        *self.shared.gains.lock() = gains;
    }

    /// Get the current stabilization gains.
    pub fn gains(&self) -> StabilizationGains {
        *self.shared.gains.lock()
    }

    /// Signal consumers whether to apply the service's output.
    ///
    /// Disabling does not stop the fusion task.
    pub fn enable(&mut self, on: bool) {
        self.shared.enabled.store(on, Ordering::SeqCst);
    }

    /// True if consumers should apply the service's output.
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// True while the fusion task is running.
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for AttitudeService {
    fn drop(&mut self) {
        self.stop_task();
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::sim::SimImu;
    use super::*;

    #[test]
    fn test_snapshot_timestamps_are_monotonic() {
        let mut service = AttitudeService::new(Box::new(SimImu::default()), Params::default());

        service.begin().unwrap();
        service.start_task(1000.0);

        // Stress the reader against the writer, timestamps must never move
        // backwards and the estimate must become healthy
        let mut last_time_s = -1.0;
        let mut saw_healthy = false;

        for _ in 0..500 {
            let snapshot = service.get_snapshot();

            assert!(
                snapshot.sample_time_s >= last_time_s,
                "snapshot time went backwards: {} < {}",
                snapshot.sample_time_s,
                last_time_s
            );

            last_time_s = snapshot.sample_time_s;
            saw_healthy |= snapshot.healthy;

            std::thread::sleep(std::time::Duration::from_micros(200));
        }

        assert!(saw_healthy);

        service.stop_task();
        assert!(!service.is_running());
    }

    #[test]
    fn test_start_task_is_idempotent() {
        let mut service = AttitudeService::new(Box::new(SimImu::default()), Params::default());

        service.begin().unwrap();
        service.start_task(200.0);
        // Second start must be a no-op rather than spawning a second writer
        service.start_task(200.0);

        assert!(service.is_running());
        service.stop_task();
    }

    #[test]
    fn test_enable_does_not_stop_the_task() {
        let mut service = AttitudeService::new(Box::new(SimImu::default()), Params::default());

        service.begin().unwrap();
        service.start_task(200.0);

        service.enable(false);
        assert!(!service.is_enabled());
        assert!(service.is_running());

        service.enable(true);
        assert!(service.is_enabled());

        service.stop_task();
    }

    #[test]
    fn test_gains_roundtrip() {
        let mut service = AttitudeService::new(Box::new(SimImu::default()), Params::default());

        let gains = StabilizationGains {
            k_roll: 0.02,
            b_roll: 0.4,
            k_pitch: 0.03,
            b_pitch: 0.6,
        };
        service.set_gains(gains);

        let read = service.gains();
        assert_eq!(read.k_roll, 0.02);
        assert_eq!(read.b_pitch, 0.6);
    }
}
