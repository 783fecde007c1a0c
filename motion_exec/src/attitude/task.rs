//! Fixed-period fusion task
//!
//! The task owns the sensor and the filter. Each tick it reads a sample,
//! advances the filter and publishes a fresh snapshot; read failures are
//! absorbed locally and, when persistent, trigger a bounded sensor
//! reinitialisation. The task never terminates on a sensor fault, it keeps
//! retrying at the fixed period.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Internal
use super::filter::OrientationFilter;
use super::{AttitudeError, ImuSensor, Shared};
use util::maths;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The fusion task state.
pub(crate) struct FusionTask {
    shared: Arc<Shared>,

    sensor: Box<dyn ImuSensor>,

    filter: OrientationFilter,

    /// Monotonic epoch snapshot timestamps are relative to.
    epoch: Instant,

    /// Capture time of the previous successful sample.
    last_sample: Option<Instant>,

    /// Consecutive read failures since the last success.
    consec_failures: u32,

    /// Failure count at which reinitialisation is attempted.
    reinit_limit: u32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FusionTask {
    pub(crate) fn new(
        shared: Arc<Shared>,
        sensor: Box<dyn ImuSensor>,
        filter_beta: f64,
        reinit_limit: u32,
        epoch: Instant,
    ) -> Self {
        Self {
            shared,
            sensor,
            filter: OrientationFilter::new(filter_beta),
            epoch,
            last_sample: None,
            consec_failures: 0,
            reinit_limit,
        }
    }

    /// Run the fusion loop until the running flag clears.
    ///
    /// The flag is checked once per iteration, guaranteeing exit within one
    /// period of being signalled.
    pub(crate) fn run(mut self, rate_hz: f64) {
        let period = Duration::from_secs_f64(1.0 / rate_hz);

        while self.shared.running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();

            self.step(tick_start);

            if let Some(remaining) = period.checked_sub(tick_start.elapsed()) {
                std::thread::sleep(remaining);
            }
        }

        debug!("Fusion task exited");
    }

    /// One fusion tick.
    pub(crate) fn step(&mut self, now: Instant) {
        let sample = match self.sensor.read_sample() {
            Ok(s) => s,
            Err(e) => {
                self.handle_read_failure(e);
                return;
            }
        };

        self.consec_failures = 0;

        // dt from the monotonic clock. A non-positive dt (clock glitch or
        // first sample) skips the integration but the sample still counts.
        let dt_s = match self.last_sample {
            Some(prev) => now.saturating_duration_since(prev).as_secs_f64(),
            None => 0.0,
        };
        self.last_sample = Some(now);

        if dt_s > 0.0 {
            self.filter
                .update_imu(&sample.gyro_rads, &sample.accel_mss, dt_s);
        }

        let (mut roll_deg, mut pitch_deg, mut yaw_deg) = self.filter.euler_deg();

        // Mounting correction, then wrap back into (-180, 180]
        {
            let offsets = *self.shared.offsets.lock();
            roll_deg = maths::wrap_deg_180(roll_deg - offsets.roll_deg);
            pitch_deg = maths::wrap_deg_180(pitch_deg - offsets.pitch_deg);
            yaw_deg = maths::wrap_deg_180(yaw_deg - offsets.yaw_deg);
        }

        let sample_time_s = now.duration_since(self.epoch).as_secs_f64();

        // Publish. Only the copy happens under the lock.
        let mut estimate = self.shared.estimate.lock();
        estimate.roll_deg = roll_deg;
        estimate.pitch_deg = pitch_deg;
        estimate.yaw_deg = yaw_deg;
        estimate.sample_time_s = sample_time_s;
        estimate.healthy = true;
        estimate.success_count = estimate.success_count.wrapping_add(1);
    }

    /// Absorb a failed read, self-healing after persistent failures.
    ///
    /// The stale angle fields are left untouched so a consumer holding the
    /// snapshot can see the last known attitude alongside the health flag.
    fn handle_read_failure(&mut self, error: AttitudeError) {
        {
            let mut estimate = self.shared.estimate.lock();
            estimate.healthy = false;
            estimate.error_count = estimate.error_count.wrapping_add(1);
        }

        self.consec_failures = self.consec_failures.saturating_add(1);

        if self.consec_failures >= self.reinit_limit {
            warn!(
                "IMU read failed {} consecutive times ({}), reinitialising",
                self.consec_failures, error
            );

            match self.sensor.initialise() {
                Ok(()) => {
                    info!("IMU reinitialised");
                    self.consec_failures = 0;
                    self.last_sample = None;
                }
                Err(e) => debug!("IMU reinitialisation failed: {}", e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::super::{CalibrationOffsets, ImuSample, StabilizationGains};
    use super::*;
    use nalgebra::Vector3;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;

    /// Sensor following a script of pass/fail reads, then passing forever.
    struct ScriptedSensor {
        script: VecDeque<bool>,
        init_count: u32,
    }

    impl ScriptedSensor {
        fn new(script: &[bool]) -> Self {
            Self {
                script: script.iter().copied().collect(),
                init_count: 0,
            }
        }
    }

    impl ImuSensor for ScriptedSensor {
        fn initialise(&mut self) -> Result<(), AttitudeError> {
            self.init_count += 1;
            Ok(())
        }

        fn read_sample(&mut self) -> Result<ImuSample, AttitudeError> {
            match self.script.pop_front() {
                Some(false) => Err(AttitudeError::I2c),
                _ => Ok(ImuSample {
                    accel_mss: Vector3::new(0.0, 0.0, 9.80665),
                    gyro_rads: Vector3::zeros(),
                }),
            }
        }
    }

    fn test_shared() -> Arc<Shared> {
        Arc::new(Shared {
            estimate: Mutex::new(Default::default()),
            offsets: Mutex::new(CalibrationOffsets::default()),
            gains: Mutex::new(StabilizationGains::default()),
            running: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
        })
    }

    fn step_n(task: &mut FusionTask, n: usize) {
        for _ in 0..n {
            task.step(Instant::now());
            std::thread::sleep(Duration::from_micros(100));
        }
    }

    #[test]
    fn test_persistent_failure_recovery() {
        let shared = test_shared();
        let sensor = ScriptedSensor::new(&[false; 10]);

        let mut task = FusionTask::new(shared.clone(), Box::new(sensor), 0.1, 10, Instant::now());

        // Ten consecutive failures: unhealthy, errors counted, reinit fired
        step_n(&mut task, 10);
        {
            let estimate = shared.estimate.lock();
            assert!(!estimate.healthy);
            assert_eq!(estimate.error_count, 10);
            assert_eq!(estimate.success_count, 0);
        }
        assert_eq!(task.consec_failures, 0);

        // Next successful read restores health and the error count holds
        step_n(&mut task, 3);
        {
            let estimate = shared.estimate.lock();
            assert!(estimate.healthy);
            assert_eq!(estimate.error_count, 10);
            assert!(estimate.success_count >= 3);
        }
    }

    #[test]
    fn test_transient_failure_does_not_reinit() {
        let shared = test_shared();
        let sensor = ScriptedSensor::new(&[true, false, true, false, true]);

        let mut task = FusionTask::new(shared.clone(), Box::new(sensor), 0.1, 10, Instant::now());

        step_n(&mut task, 5);

        let estimate = shared.estimate.lock();
        assert_eq!(estimate.error_count, 2);
        assert_eq!(estimate.success_count, 3);
        assert!(estimate.healthy);
    }

    #[test]
    fn test_failure_leaves_stale_angles_untouched() {
        let shared = test_shared();
        let sensor = ScriptedSensor::new(&[true, true, false]);

        let mut task = FusionTask::new(shared.clone(), Box::new(sensor), 0.1, 10, Instant::now());

        step_n(&mut task, 2);
        let before = *shared.estimate.lock();
        assert!(before.healthy);

        step_n(&mut task, 1);
        let after = *shared.estimate.lock();

        assert!(!after.healthy);
        assert_eq!(after.roll_deg, before.roll_deg);
        assert_eq!(after.pitch_deg, before.pitch_deg);
        assert_eq!(after.sample_time_s, before.sample_time_s);
    }

    #[test]
    fn test_offsets_applied_and_wrapped() {
        let shared = test_shared();
        *shared.offsets.lock() = CalibrationOffsets {
            roll_deg: 359.0,
            pitch_deg: 0.0,
            yaw_deg: -359.0,
        };

        let sensor = ScriptedSensor::new(&[]);
        let mut task = FusionTask::new(shared.clone(), Box::new(sensor), 0.1, 10, Instant::now());

        step_n(&mut task, 2);

        let estimate = shared.estimate.lock();
        assert!(estimate.healthy);

        // Level sensor: raw angles near zero, offsets fold back into range
        assert!((estimate.roll_deg - 1.0).abs() < 0.1);
        assert!((estimate.yaw_deg + 1.0).abs() < 0.1);
        assert!(estimate.roll_deg > -180.0 && estimate.roll_deg <= 180.0);
        assert!(estimate.yaw_deg > -180.0 && estimate.yaw_deg <= 180.0);
    }
}
