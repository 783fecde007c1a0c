//! Implementations for the GaitCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use serde::Serialize;

// Internal
use super::{
    GaitCtrlError, GaitParameters, LocomotionMode, Params, TurnDirection, WalkDirection,
    JOINTS_PER_LEG, LIVE_SPEED_BAND_HZ, MODE_ENTRY_SPEED_BAND_HZ, NUM_LEGS,
};
use util::{
    archive::{Archived, Archiver},
    maths,
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gait control module state
#[derive(Default)]
pub struct GaitCtrl {
    pub(crate) params: Params,

    pub(crate) report: StatusReport,
    arch_report: Archiver,

    pub(crate) gait: GaitParameters,

    pub(crate) mode: LocomotionMode,

    /// Phase clock origin on the executive time base, `None` while idle.
    ///
    /// Units: seconds
    pub(crate) phase_origin_s: Option<f64>,

    /// Executive time of the most recent tick, used as "now" when a
    /// directional call resets the phase origin.
    ///
    /// Units: seconds
    pub(crate) last_tick_time_s: f64,

    /// Base-leg phase computed on the most recent moving tick, in [0, 1).
    pub(crate) last_phase: f64,

    pub(crate) output: Option<JointDems>,
    arch_output: Archiver,
}

/// Input data to Gait Control.
#[derive(Default)]
pub struct InputData {
    /// Time of this tick on the executive time base.
    ///
    /// Units: seconds
    pub time_s: f64,
}

/// Joint angles for a single leg.
///
/// Recomputed every tick and never persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LegJointAngles {
    pub hip_deg: f64,
    pub knee_deg: f64,
    pub ankle_deg: f64,
    pub foot_deg: f64,
    pub toe_deg: f64,
}

/// Output demands from GaitCtrl that the executive must forward to the
/// actuator bus.
#[derive(Clone, Copy, Serialize, Debug, PartialEq)]
pub struct JointDems {
    /// Angle demand per actuator bus channel.
    ///
    /// Units: degrees
    pub angles_deg: [(u8, f64); NUM_LEGS * JOINTS_PER_LEG],
}

/// Status report for GaitCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// Mode executed on this tick.
    pub mode: Option<LocomotionMode>,

    /// Base-leg phase on this tick, in [0, 1). Zero while idle.
    pub phase: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for JointDems {
    fn default() -> Self {
        JointDems {
            angles_deg: [(0, 0.0); NUM_LEGS * JOINTS_PER_LEG],
        }
    }
}

impl State for GaitCtrl {
    type InitData = &'static str;
    type InitError = params::LoadError;

    type InputData = InputData;
    type OutputData = JointDems;
    type StatusReport = StatusReport;
    type ProcError = GaitCtrlError;

    /// Initialise the GaitCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        // Load the parameters
        self.params = params::load(init_data)?;

        // Gait parameters start at the boot defaults
        self.gait = GaitParameters::from_params(&self.params);

        // Create the arch folder for gait_ctrl
        let mut arch_path = session.arch_root.clone();
        arch_path.push("gait_ctrl");
        if let Err(e) = std::fs::create_dir_all(arch_path) {
            warn!("Couldn't create gait_ctrl archive directory: {}", e);
        }

        // Initialise the archivers
        self.arch_report = Archiver::from_path(session, "gait_ctrl/status_report.csv")
            .unwrap_or_default();
        self.arch_output = Archiver::from_path(session, "gait_ctrl/output.csv")
            .unwrap_or_default();

        Ok(())
    }

    /// Perform cyclic processing of Gait Control.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();

        self.last_tick_time_s = input_data.time_s;

        let output = if self.mode.is_moving() {
            self.calc_moving(input_data.time_s)?
        }
        else {
            self.last_phase = 0.0;
            self.calc_idle()
        };

        self.report.mode = Some(self.mode);
        self.report.phase = self.last_phase;

        trace!("GaitCtrl output: {:?}", output.angles_deg);

        // Update the output in self
        self.output = Some(output);

        Ok((output, self.report))
    }
}

impl Archived for GaitCtrl {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Write each one individually
        self.arch_report.serialise(self.report)?;
        self.arch_output.serialise(self.output)?;

        Ok(())
    }
}

impl GaitCtrl {

    /// Start walking in the given direction.
    ///
    /// The requested speed is clamped into the mode entry band and the phase
    /// clock restarts from the current tick time.
    pub fn walk(&mut self, direction: WalkDirection, speed_hz: f64) {
        self.gait.speed_hz = clamp_speed(speed_hz, MODE_ENTRY_SPEED_BAND_HZ);

        self.mode = match direction {
            WalkDirection::Forward => LocomotionMode::WalkForward,
            WalkDirection::Backward => LocomotionMode::WalkBackward,
        };

        self.reset_phase_origin();

        info!(
            "Walk {:?} at {} Hz",
            direction, self.gait.speed_hz
        );
    }

    /// Start turning in the given direction.
    ///
    /// The requested rate is clamped into the mode entry band and the phase
    /// clock restarts from the current tick time.
    pub fn turn(&mut self, direction: TurnDirection, rate_hz: f64) {
        self.gait.speed_hz = clamp_speed(rate_hz, MODE_ENTRY_SPEED_BAND_HZ);

        self.mode = match direction {
            TurnDirection::Left => LocomotionMode::TurnLeft,
            TurnDirection::Right => LocomotionMode::TurnRight,
        };

        self.reset_phase_origin();

        info!(
            "Turn {:?} at {} Hz",
            direction, self.gait.speed_hz
        );
    }

    /// Stop and return to the neutral stance.
    ///
    /// The stance is commanded in a single snap on the next tick, there is no
    /// ramp.
    pub fn stop(&mut self) {
        self.mode = LocomotionMode::Idle;
        self.phase_origin_s = None;

        info!("Gait stopped");
    }

    /// Stop and discard the stored posture.
    ///
    /// Posture is forced back to the 0.5 midpoint so the commanded stance and
    /// all subsequent idle ticks carry zero trim.
    pub fn emergency_stop(&mut self) {
        warn!("Gait emergency stop");

        self.gait.posture = 0.5;
        self.stop();
    }

    /// Set the gait parameters without changing the locomotion mode.
    ///
    /// The `"run"` tag selects a faster, lower-clearance variant of the
    /// requested gait.
    pub fn set_gait(&mut self, speed_hz: f64, stride: f64, lift: f64, mode_tag: &str) {
        let mut speed = clamp_speed(speed_hz, LIVE_SPEED_BAND_HZ);
        let mut lift = clamp_unit(lift);

        if mode_tag == "run" {
            speed = clamp_speed(speed * self.params.run_speed_scale, LIVE_SPEED_BAND_HZ);
            lift = clamp_unit(lift * self.params.run_lift_scale);
        }

        self.gait.speed_hz = speed;
        self.gait.stride_amplitude = clamp_unit(stride);
        self.gait.lift_amplitude = lift;

        debug!(
            "Gait set: {} Hz, stride {}, lift {} (tag {:?})",
            self.gait.speed_hz, self.gait.stride_amplitude, self.gait.lift_amplitude, mode_tag
        );
    }

    /// Adjust the current speed by a delta, clamped into the live band.
    pub fn adjust_speed(&mut self, delta_hz: f64) {
        self.gait.speed_hz = clamp_speed(self.gait.speed_hz + delta_hz, LIVE_SPEED_BAND_HZ);
    }

    /// Set the stride amplitude, clamped into [0, 1].
    pub fn set_stride(&mut self, stride: f64) {
        self.gait.stride_amplitude = clamp_unit(stride);
    }

    /// Set the posture trim, clamped into [0, 1].
    pub fn set_posture(&mut self, posture: f64) {
        self.gait.posture = clamp_unit(posture);
    }

    /// Get the current locomotion mode.
    pub fn mode(&self) -> LocomotionMode {
        self.mode
    }

    /// Get the current gait parameters.
    pub fn gait(&self) -> &GaitParameters {
        &self.gait
    }

    /// Get the base-leg phase of the most recent moving tick, in [0, 1).
    pub fn phase(&self) -> f64 {
        self.last_phase
    }

    /// Attach every leg joint on the actuator bus with the configured
    /// limits.
    ///
    /// Also used to re-engage the legs after an emergency power-down.
    pub fn attach_legs(&self, bus: &mut crate::actuator_bus::ActuatorBus) {
        for map in [self.params.left_leg, self.params.right_leg].iter() {
            for channel in [map.hip, map.knee, map.ankle, map.foot, map.toe].iter() {
                bus.attach(*channel, self.params.servo_limits);
            }
        }
    }

    /// Restart the phase clock from the most recent tick time.
    fn reset_phase_origin(&mut self) {
        self.phase_origin_s = Some(self.last_tick_time_s);
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Clamp a speed into the given band, logging if the request was modified.
fn clamp_speed(speed_hz: f64, band: (f64, f64)) -> f64 {
    let clamped = maths::clamp(&speed_hz, &band.0, &band.1);

    if clamped != speed_hz {
        debug!(
            "Requested speed {} Hz outside [{}, {}] Hz, clamped to {} Hz",
            speed_hz, band.0, band.1, clamped
        );
    }

    clamped
}

/// Clamp a normalised parameter into [0, 1].
fn clamp_unit(value: f64) -> f64 {
    maths::clamp(&value, &0.0, &1.0)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::gait_ctrl::calc_walk::swing_wave;

    const EPS: f64 = 1e-9;

    fn test_ctrl() -> GaitCtrl {
        let mut gc = GaitCtrl::default();
        gc.params = Params::default();
        gc.gait = GaitParameters::from_params(&gc.params);
        gc
    }

    /// Hip displacement from neutral (trim removed), normalised by the full
    /// swing travel, recovering the underlying swing value.
    fn hip_swing(gc: &GaitCtrl, dems: &JointDems, leg: &super::super::LegMap) -> f64 {
        let trim = (gc.gait.posture - 0.5) * gc.params.posture_trim_deg;
        let hip = dems
            .angles_deg
            .iter()
            .find(|(ch, _)| *ch == leg.hip)
            .map(|(_, deg)| *deg)
            .expect("no hip demand");

        (hip - gc.params.neutral.hip_deg - trim)
            / (gc.params.hip_swing_deg * gc.gait.stride_amplitude)
    }

    #[test]
    fn test_walk_forward_quarter_phase() {
        let mut gc = test_ctrl();

        gc.walk(WalkDirection::Forward, 1.0);

        let (dems, rpt) = gc.proc(&InputData { time_s: 0.25 }).unwrap();

        assert!((rpt.phase - 0.25).abs() < EPS);

        // Right leg runs at the base phase: sin(2 pi 0.25) = 1, the left leg
        // runs in anti-phase: sin(2 pi 0.75) = -1
        let left = gc.params.left_leg;
        let right = gc.params.right_leg;
        assert!((hip_swing(&gc, &dems, &right) - 1.0).abs() < EPS);
        assert!((hip_swing(&gc, &dems, &left) + 1.0).abs() < EPS);
    }

    #[test]
    fn test_legs_are_anti_phase() {
        let mut gc = test_ctrl();
        gc.walk(WalkDirection::Forward, 1.0);

        for i in 0..20 {
            let t = i as f64 * 0.037;
            let (dems, _) = gc.proc(&InputData { time_s: t }).unwrap();

            let l = hip_swing(&gc, &dems, &gc.params.left_leg.clone());
            let r = hip_swing(&gc, &dems, &gc.params.right_leg.clone());

            // sin(2 pi (p + 0.5)) = -sin(2 pi p)
            assert!((l + r).abs() < EPS, "legs not anti-phase at t = {}", t);
        }
    }

    #[test]
    fn test_swing_periodicity() {
        let mut gc = test_ctrl();
        gc.walk(WalkDirection::Forward, 1.0);

        let (d1, _) = gc.proc(&InputData { time_s: 0.3 }).unwrap();
        let (d2, _) = gc.proc(&InputData { time_s: 1.3 }).unwrap();

        for ((ch1, a1), (ch2, a2)) in d1.angles_deg.iter().zip(d2.angles_deg.iter()) {
            assert_eq!(ch1, ch2);
            assert!((a1 - a2).abs() < EPS);
        }

        assert!((swing_wave(0.3) - swing_wave(1.3_f64.fract())).abs() < EPS);
    }

    #[test]
    fn test_walk_backward_negates_swing() {
        let mut gc = test_ctrl();

        gc.walk(WalkDirection::Forward, 1.0);
        let (fwd, _) = gc.proc(&InputData { time_s: 0.25 }).unwrap();
        let fwd_swing = hip_swing(&gc, &fwd, &gc.params.right_leg.clone());

        let mut gc = test_ctrl();
        gc.walk(WalkDirection::Backward, 1.0);
        let (bwd, _) = gc.proc(&InputData { time_s: 0.25 }).unwrap();
        let bwd_swing = hip_swing(&gc, &bwd, &gc.params.right_leg.clone());

        assert!((fwd_swing + bwd_swing).abs() < EPS);
        assert!(fwd_swing > 0.0);
    }

    #[test]
    fn test_turn_asymmetry() {
        // Pick a time where the base swing is well away from zero
        let t = 0.1;

        let mut gc = test_ctrl();
        gc.turn(TurnDirection::Left, 1.0);
        let (dems, _) = gc.proc(&InputData { time_s: t }).unwrap();
        let l = hip_swing(&gc, &dems, &gc.params.left_leg.clone()).abs();
        let r = hip_swing(&gc, &dems, &gc.params.right_leg.clone()).abs();
        assert!(
            r > l,
            "TurnLeft should drive the right leg harder ({} <= {})",
            r,
            l
        );

        let mut gc = test_ctrl();
        gc.turn(TurnDirection::Right, 1.0);
        let (dems, _) = gc.proc(&InputData { time_s: t }).unwrap();
        let l = hip_swing(&gc, &dems, &gc.params.left_leg.clone()).abs();
        let r = hip_swing(&gc, &dems, &gc.params.right_leg.clone()).abs();
        assert!(l > r);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut gc = test_ctrl();

        gc.walk(WalkDirection::Forward, 1.0);
        gc.proc(&InputData { time_s: 0.4 }).unwrap();

        gc.stop();
        let (d1, _) = gc.proc(&InputData { time_s: 0.5 }).unwrap();

        gc.stop();
        let (d2, _) = gc.proc(&InputData { time_s: 0.6 }).unwrap();

        assert_eq!(d1, d2);
        assert_eq!(gc.mode(), LocomotionMode::Idle);
    }

    #[test]
    fn test_idle_holds_neutral_with_trim() {
        let mut gc = test_ctrl();

        gc.set_posture(1.0);
        let (dems, rpt) = gc.proc(&InputData { time_s: 1.0 }).unwrap();

        assert_eq!(rpt.phase, 0.0);

        // Full posture is a +5 degree trim on every joint with the default
        // 10 degree full-scale
        let expected = [
            (gc.params.left_leg.hip, gc.params.neutral.hip_deg + 5.0),
            (gc.params.left_leg.knee, gc.params.neutral.knee_deg + 5.0),
            (gc.params.left_leg.ankle, gc.params.neutral.ankle_deg + 5.0),
            (gc.params.left_leg.foot, gc.params.neutral.foot_deg + 5.0),
            (gc.params.left_leg.toe, gc.params.neutral.toe_deg + 5.0),
        ];

        for (ch, deg) in expected.iter() {
            let actual = dems
                .angles_deg
                .iter()
                .find(|(c, _)| c == ch)
                .map(|(_, d)| *d)
                .unwrap();
            assert!((actual - deg).abs() < EPS);
        }
    }

    #[test]
    fn test_run_tag_scales_speed_and_lift() {
        let mut gc = test_ctrl();

        gc.set_gait(1.0, 1.0, 0.8, "run");

        assert!((gc.gait().speed_hz - 1.3).abs() < 1e-12);
        assert!((gc.gait().lift_amplitude - 0.64).abs() < 1e-12);
        assert!((gc.gait().stride_amplitude - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_speed_clamp_bands() {
        let mut gc = test_ctrl();

        gc.walk(WalkDirection::Forward, 99.0);
        assert_eq!(gc.gait().speed_hz, 3.0);

        gc.walk(WalkDirection::Forward, 0.01);
        assert_eq!(gc.gait().speed_hz, 0.1);

        gc.adjust_speed(100.0);
        assert_eq!(gc.gait().speed_hz, 4.0);

        gc.adjust_speed(-100.0);
        assert_eq!(gc.gait().speed_hz, 0.05);

        gc.set_gait(0.001, 0.5, 0.5, "walk");
        assert_eq!(gc.gait().speed_hz, 0.05);
    }

    #[test]
    fn test_emergency_stop_forces_posture() {
        let mut gc = test_ctrl();

        gc.set_posture(1.0);
        gc.walk(WalkDirection::Forward, 2.0);
        gc.emergency_stop();

        assert_eq!(gc.mode(), LocomotionMode::Idle);
        assert_eq!(gc.gait().posture, 0.5);

        // Post e-stop stance carries zero trim
        let (dems, _) = gc.proc(&InputData { time_s: 2.0 }).unwrap();
        let hip = dems
            .angles_deg
            .iter()
            .find(|(c, _)| *c == gc.params.left_leg.hip)
            .map(|(_, d)| *d)
            .unwrap();
        assert!((hip - gc.params.neutral.hip_deg).abs() < EPS);
    }

    #[test]
    fn test_mode_entry_resets_phase_origin() {
        let mut gc = test_ctrl();

        gc.walk(WalkDirection::Forward, 1.0);
        gc.proc(&InputData { time_s: 10.3 }).unwrap();

        // Re-entering a moving mode restarts the clock from the last tick
        gc.walk(WalkDirection::Forward, 1.0);
        let (_, rpt) = gc.proc(&InputData { time_s: 10.55 }).unwrap();

        assert!((rpt.phase - 0.25).abs() < EPS);
    }
}
