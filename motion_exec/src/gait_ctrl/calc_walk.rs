//! Walking gait calculations
//!
//! The gait is built from two normalised waveforms over the leg phase: a
//! sinusoidal fore/aft swing and a sharpened raised half-sine lift peaking
//! mid-swing for ground clearance.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::f64::consts::{FRAC_PI_2, TAU};

// Internal
use super::{GaitCtrl, GaitCtrlError, JointDems, LegJointAngles, LegMap, LocomotionMode};
use util::maths;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GaitCtrl {

    /// Calculate the neutral stance with posture trim applied.
    pub(crate) fn calc_idle(&self) -> JointDems {
        let stance = self.leg_angles(0.0, 0.0);

        self.build_dems(stance, stance)
    }

    /// Calculate both legs' joint angles for the current moving mode.
    ///
    /// The right leg runs at the base phase and the left leg half a cycle
    /// later, giving an anti-phase walk.
    pub(crate) fn calc_moving(&mut self, time_s: f64) -> Result<JointDems, GaitCtrlError> {
        let origin_s = self.phase_origin_s.ok_or(GaitCtrlError::NoPhaseOrigin)?;

        let base_phase = maths::frac((time_s - origin_s) * self.gait.speed_hz);
        self.last_phase = base_phase;

        let left_phase = maths::frac(base_phase + 0.5);

        let (left_scale, right_scale) = self.swing_scales();
        let sign = self.swing_sign();

        let left = self.leg_angles(
            swing_wave(left_phase) * left_scale * sign,
            lift_wave(left_phase, self.params.lift_sharpness),
        );
        let right = self.leg_angles(
            swing_wave(base_phase) * right_scale * sign,
            lift_wave(base_phase, self.params.lift_sharpness),
        );

        Ok(self.build_dems(left, right))
    }

    /// Map swing and lift signals onto one leg's joint angles.
    ///
    /// Swing drives the hip fore/aft, lift folds the lower joints, and the
    /// posture trim shifts every joint together.
    fn leg_angles(&self, swing: f64, lift: f64) -> LegJointAngles {
        let p = &self.params;
        let trim = (self.gait.posture - 0.5) * p.posture_trim_deg;

        let stride = self.gait.stride_amplitude;
        let clearance = self.gait.lift_amplitude;

        LegJointAngles {
            hip_deg: p.neutral.hip_deg + swing * p.hip_swing_deg * stride + trim,
            knee_deg: p.neutral.knee_deg - lift * p.knee_lift_deg * clearance + trim,
            ankle_deg: p.neutral.ankle_deg - lift * p.ankle_lift_deg * clearance + trim,
            foot_deg: p.neutral.foot_deg - lift * p.foot_lift_deg * clearance + trim,
            toe_deg: p.neutral.toe_deg - lift * p.toe_lift_deg * clearance + trim,
        }
    }

    /// Flatten both legs' angles into per-channel demands.
    fn build_dems(&self, left: LegJointAngles, right: LegJointAngles) -> JointDems {
        let mut angles_deg = JointDems::default().angles_deg;

        let legs = [(self.params.left_leg, left), (self.params.right_leg, right)];

        for (i, (map, angles)) in legs.iter().enumerate() {
            let base = i * super::JOINTS_PER_LEG;
            for (j, dem) in leg_dems(map, angles).iter().enumerate() {
                angles_deg[base + j] = *dem;
            }
        }

        JointDems { angles_deg }
    }

    /// Sign applied to the swing signal, negated when walking backwards.
    fn swing_sign(&self) -> f64 {
        match self.mode {
            LocomotionMode::WalkBackward => -1.0,
            _ => 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Normalised fore/aft swing signal over the leg phase, in [-1, 1].
pub(crate) fn swing_wave(phase: f64) -> f64 {
    (TAU * phase).sin()
}

/// Normalised ground-clearance signal over the leg phase, in [0, 1].
///
/// A raised half-sine, sharpened by the exponent, zero at phase 0 and peaking
/// at phase 0.5 (mid-swing).
pub(crate) fn lift_wave(phase: f64, sharpness: f64) -> f64 {
    let raised = 0.5 * ((TAU * phase - FRAC_PI_2).sin() + 1.0);

    maths::clamp(&raised.powf(sharpness), &0.0, &1.0)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// One leg's demands in channel order.
fn leg_dems(map: &LegMap, angles: &LegJointAngles) -> [(u8, f64); super::JOINTS_PER_LEG] {
    [
        (map.hip, angles.hip_deg),
        (map.knee, angles.knee_deg),
        (map.ankle, angles.ankle_deg),
        (map.foot, angles.foot_deg),
        (map.toe, angles.toe_deg),
    ]
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
