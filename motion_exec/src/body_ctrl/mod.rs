//! Body mapper module
//!
//! Thin single-joint mappers for the pelvis roll and spine pitch servos.
//! Each accepts a normalised level in [0, 1] and translates it into a
//! joint-specific degree sub-range around the neutral angle, then writes
//! through the actuator bus. The stabilization path terminates here.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;
use serde::Deserialize;

// Internal
use crate::actuator_bus::{ActuatorBus, ServoLimits};
use util::maths;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for one single-joint mapper.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct MapperParams {
    /// Actuator bus channel the joint is wired to.
    pub channel: u8,

    /// Joint angle when the input level is 0.5.
    ///
    /// Units: degrees
    pub neutral_deg: f64,

    /// Half travel: level 0 maps to `neutral - swing`, level 1 to
    /// `neutral + swing`.
    ///
    /// Units: degrees
    pub swing_deg: f64,

    /// Limits to attach the joint's servo with.
    pub limits: ServoLimits,
}

/// Parameters for the body mappers.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Params {
    pub pelvis: MapperParams,
    pub spine: MapperParams,
}

/// A single-joint linear level mapper.
pub struct LevelMapper {
    params: MapperParams,

    /// Last commanded angle, used for relative nudges.
    ///
    /// Units: degrees
    current_deg: f64,
}

/// The pelvis and spine mappers.
pub struct BodyCtrl {
    pub pelvis: LevelMapper,
    pub spine: LevelMapper,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Params {
            pelvis: MapperParams {
                channel: 10,
                neutral_deg: 90.0,
                swing_deg: 20.0,
                limits: ServoLimits {
                    min_pulse_us: 700,
                    max_pulse_us: 2400,
                    min_deg: 0.0,
                    max_deg: 180.0,
                },
            },
            spine: MapperParams {
                channel: 11,
                neutral_deg: 90.0,
                swing_deg: 15.0,
                limits: ServoLimits::default(),
            },
        }
    }
}

impl LevelMapper {
    /// Create a mapper, attaching its servo and moving it to neutral.
    pub fn new(params: MapperParams, bus: &mut ActuatorBus) -> Self {
        let mut mapper = Self {
            params,
            current_deg: params.neutral_deg,
        };

        mapper.attach(bus);

        info!("Body mapper initialised on channel {}", params.channel);

        mapper
    }

    /// Attach the servo and move it to the neutral angle.
    ///
    /// Also used to re-engage after an emergency power-down.
    pub fn attach(&mut self, bus: &mut ActuatorBus) {
        bus.attach(self.params.channel, self.params.limits);
        self.center(bus);
    }

    /// Set the joint from a normalised level.
    ///
    /// 0.0 maps to `neutral - swing`, 0.5 to neutral, 1.0 to
    /// `neutral + swing`. Out of range levels are clamped.
    pub fn set_level(&mut self, level: f64, bus: &mut ActuatorBus) {
        let level = maths::clamp(&level, &0.0, &1.0);
        let deg = self.params.neutral_deg + (level - 0.5) * 2.0 * self.params.swing_deg;

        self.write(deg, bus);
    }

    /// Nudge the joint by a relative angle in degrees.
    pub fn nudge_deg(&mut self, delta_deg: f64, bus: &mut ActuatorBus) {
        self.write(self.current_deg + delta_deg, bus);
    }

    /// Move the joint to its neutral angle.
    pub fn center(&mut self, bus: &mut ActuatorBus) {
        self.write(self.params.neutral_deg, bus);
    }

    /// Get the last commanded angle in degrees.
    pub fn current_deg(&self) -> f64 {
        self.current_deg
    }

    /// Clamp an angle into the joint's travel limits and write it out.
    fn write(&mut self, deg: f64, bus: &mut ActuatorBus) {
        self.current_deg = maths::clamp(&deg, &self.params.limits.min_deg, &self.params.limits.max_deg);

        bus.write_degrees(self.params.channel, self.current_deg);
    }
}

impl BodyCtrl {
    /// Create both mappers, attaching their servos.
    pub fn new(params: Params, bus: &mut ActuatorBus) -> Self {
        Self {
            pelvis: LevelMapper::new(params.pelvis, bus),
            spine: LevelMapper::new(params.spine, bus),
        }
    }

    /// Re-engage both servos after an emergency power-down.
    pub fn reattach(&mut self, bus: &mut ActuatorBus) {
        self.pelvis.attach(bus);
        self.spine.attach(bus);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::actuator_bus::{sim::{SimDirect, SimExpander}, ChannelBackend, NUM_CHANNELS};

    const EPS: f64 = 1e-9;

    fn test_bus() -> ActuatorBus {
        let params = crate::actuator_bus::Params {
            pwm_freq_hz: 50.0,
            channels: (0..NUM_CHANNELS)
                .map(|i| {
                    if i < 6 {
                        ChannelBackend::DirectPwm { pin: (i + 1) as u8 }
                    } else {
                        ChannelBackend::ExpanderPwm { port: (i - 6) as u8 }
                    }
                })
                .collect(),
        };

        ActuatorBus::new(
            Box::new(SimExpander::default()),
            Box::new(SimDirect::default()),
            &params,
        )
    }

    #[test]
    fn test_level_maps_around_neutral() {
        let mut bus = test_bus();
        let mut pelvis = LevelMapper::new(Params::default().pelvis, &mut bus);

        pelvis.set_level(0.5, &mut bus);
        assert!((pelvis.current_deg() - 90.0).abs() < EPS);

        pelvis.set_level(0.0, &mut bus);
        assert!((pelvis.current_deg() - 70.0).abs() < EPS);

        pelvis.set_level(1.0, &mut bus);
        assert!((pelvis.current_deg() - 110.0).abs() < EPS);

        // Out of range levels clamp to the ends of the swing
        pelvis.set_level(7.0, &mut bus);
        assert!((pelvis.current_deg() - 110.0).abs() < EPS);
    }

    #[test]
    fn test_nudge_clamps_to_limits() {
        let mut bus = test_bus();
        let mut spine = LevelMapper::new(Params::default().spine, &mut bus);

        spine.nudge_deg(10.0, &mut bus);
        assert!((spine.current_deg() - 100.0).abs() < EPS);

        spine.nudge_deg(1000.0, &mut bus);
        assert!((spine.current_deg() - 180.0).abs() < EPS);

        spine.nudge_deg(-1000.0, &mut bus);
        assert!((spine.current_deg() - 0.0).abs() < EPS);
    }

    #[test]
    fn test_center_returns_to_neutral() {
        let mut bus = test_bus();
        let mut pelvis = LevelMapper::new(Params::default().pelvis, &mut bus);

        pelvis.set_level(1.0, &mut bus);
        pelvis.center(&mut bus);

        assert!((pelvis.current_deg() - 90.0).abs() < EPS);
    }
}
