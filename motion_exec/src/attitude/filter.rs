//! Gradient-descent orientation filter
//!
//! An IMU-only attitude filter: the gyro is integrated into a quaternion
//! orientation estimate and a gradient-descent step pulls the estimate
//! toward the gravity direction observed by the accelerometer, bounding the
//! integration drift in roll and pitch. Yaw has no absolute reference and
//! drifts at the gyro bias rate.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Quaternion attitude estimate with gravity drift correction.
pub struct OrientationFilter {
    /// Orientation quaternion, scalar first, sensor frame relative to world.
    q: [f64; 4],

    /// Gradient step gain.
    beta: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OrientationFilter {
    /// Create a new filter at the identity orientation.
    pub fn new(beta: f64) -> Self {
        Self {
            q: [1.0, 0.0, 0.0, 0.0],
            beta,
        }
    }

    /// Advance the estimate by one sample.
    ///
    /// The gyro rate is integrated over `dt_s` and, if the accelerometer
    /// reading is non-zero, a gradient step corrects the estimate toward the
    /// observed gravity direction.
    pub fn update_imu(&mut self, gyro_rads: &Vector3<f64>, accel_mss: &Vector3<f64>, dt_s: f64) {
        let [q0, q1, q2, q3] = self.q;
        let (gx, gy, gz) = (gyro_rads.x, gyro_rads.y, gyro_rads.z);

        // Quaternion rate of change from the gyro
        let mut q_dot0 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz);
        let mut q_dot1 = 0.5 * (q0 * gx + q2 * gz - q3 * gy);
        let mut q_dot2 = 0.5 * (q0 * gy - q1 * gz + q3 * gx);
        let mut q_dot3 = 0.5 * (q0 * gz + q1 * gy - q2 * gx);

        // Gravity correction, skipped in freefall where the accelerometer
        // observes nothing useful
        let accel_norm = accel_mss.norm();
        if accel_norm > f64::EPSILON {
            let ax = accel_mss.x / accel_norm;
            let ay = accel_mss.y / accel_norm;
            let az = accel_mss.z / accel_norm;

            // Objective function: difference between the gravity direction
            // predicted by q and the measured one
            let f1 = 2.0 * (q1 * q3 - q0 * q2) - ax;
            let f2 = 2.0 * (q0 * q1 + q2 * q3) - ay;
            let f3 = 2.0 * (0.5 - q1 * q1 - q2 * q2) - az;

            // Gradient = J^T * F
            let mut s0 = -2.0 * q2 * f1 + 2.0 * q1 * f2;
            let mut s1 = 2.0 * q3 * f1 + 2.0 * q0 * f2 - 4.0 * q1 * f3;
            let mut s2 = -2.0 * q0 * f1 + 2.0 * q3 * f2 - 4.0 * q2 * f3;
            let mut s3 = 2.0 * q1 * f1 + 2.0 * q2 * f2;

            let s_norm = (s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3).sqrt();
            if s_norm > f64::EPSILON {
                s0 /= s_norm;
                s1 /= s_norm;
                s2 /= s_norm;
                s3 /= s_norm;

                q_dot0 -= self.beta * s0;
                q_dot1 -= self.beta * s1;
                q_dot2 -= self.beta * s2;
                q_dot3 -= self.beta * s3;
            }
        }

        // Integrate and renormalise
        let mut q = [
            q0 + q_dot0 * dt_s,
            q1 + q_dot1 * dt_s,
            q2 + q_dot2 * dt_s,
            q3 + q_dot3 * dt_s,
        ];

        let q_norm = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
        if q_norm > f64::EPSILON {
            for component in q.iter_mut() {
                *component /= q_norm;
            }
            self.q = q;
        }
    }

    /// Derive the Euler angles of the current estimate.
    ///
    /// Returns `(roll, pitch, yaw)` in degrees. Pitch is clamped against
    /// numerical noise at the gimbal poles.
    pub fn euler_deg(&self) -> (f64, f64, f64) {
        let [q0, q1, q2, q3] = self.q;

        let roll = (2.0 * (q0 * q1 + q2 * q3)).atan2(1.0 - 2.0 * (q1 * q1 + q2 * q2));

        let sin_pitch = 2.0 * (q0 * q2 - q3 * q1);
        let pitch = sin_pitch.max(-1.0).min(1.0).asin();

        let yaw = (2.0 * (q0 * q3 + q1 * q2)).atan2(1.0 - 2.0 * (q2 * q2 + q3 * q3));

        (roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
    }

    /// Reset the estimate to the identity orientation.
    pub fn reset(&mut self) {
        self.q = [1.0, 0.0, 0.0, 0.0];
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const STANDARD_GRAVITY: f64 = 9.80665;

    #[test]
    fn test_level_at_rest_stays_level() {
        let mut filter = OrientationFilter::new(0.1);

        let gravity = Vector3::new(0.0, 0.0, STANDARD_GRAVITY);
        let still = Vector3::zeros();

        for _ in 0..1000 {
            filter.update_imu(&still, &gravity, 0.005);
        }

        let (roll, pitch, yaw) = filter.euler_deg();
        assert!(roll.abs() < 0.01);
        assert!(pitch.abs() < 0.01);
        assert!(yaw.abs() < 0.01);
    }

    #[test]
    fn test_converges_to_observed_roll() {
        let mut filter = OrientationFilter::new(0.5);

        // Gravity seen by a sensor rolled 30 degrees right
        let rolled = Vector3::new(
            0.0,
            STANDARD_GRAVITY * 30.0_f64.to_radians().sin(),
            STANDARD_GRAVITY * 30.0_f64.to_radians().cos(),
        );
        let still = Vector3::zeros();

        for _ in 0..5000 {
            filter.update_imu(&still, &rolled, 0.01);
        }

        let (roll, pitch, _) = filter.euler_deg();
        assert!((roll - 30.0).abs() < 0.5, "roll {} not near 30", roll);
        assert!(pitch.abs() < 0.5);
    }

    #[test]
    fn test_gyro_integration() {
        let mut filter = OrientationFilter::new(0.0);

        // Rotate at 10 deg/s about x for one second with no correction
        let rate = Vector3::new(10.0_f64.to_radians(), 0.0, 0.0);
        let freefall = Vector3::zeros();

        for _ in 0..1000 {
            filter.update_imu(&rate, &freefall, 0.001);
        }

        let (roll, _, _) = filter.euler_deg();
        assert!((roll - 10.0).abs() < 0.1, "roll {} not near 10", roll);
    }

    #[test]
    fn test_reset_returns_to_identity() {
        let mut filter = OrientationFilter::new(0.1);

        let rate = Vector3::new(1.0, 0.5, -0.2);
        filter.update_imu(&rate, &Vector3::zeros(), 0.1);
        filter.reset();

        let (roll, pitch, yaw) = filter.euler_deg();
        assert_eq!((roll, pitch, yaw), (0.0, 0.0, 0.0));
    }
}
