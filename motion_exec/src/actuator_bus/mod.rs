//! # Actuator Bus Module
//!
//! This module provides a unified servo control interface over the robot's
//! heterogeneous outputs: channels driven directly from the controller's own
//! PWM hardware and channels driven through an I2C PWM-expander board.
//!
//! The bus owns a fixed table of logical channels. Each channel carries its
//! own travel limits and a tagged hardware backend, and every write is
//! clamped into the channel's limits before it reaches the hardware. Writes
//! are best-effort fire-and-forget: hardware errors are logged and never
//! propagated into the control loop.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`ExpanderDriver`] implementation for the PCA9685 16 channel servo driver board.
pub mod pca9685;

/// Simulated drivers used when not running on the robot's hardware.
pub mod sim;

/// [`DirectPwmDriver`] implementation over rppal software PWM.
#[cfg(all(target_arch = "arm", target_os = "linux"))]
pub mod rppal_pwm;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use util::maths;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of logical servo channels on the bus.
pub const NUM_CHANNELS: usize = 16;

/// Lowest PWM frequency accepted by the bus.
///
/// Hobby servos expect a frame rate close to 50 Hz, values outside this band
/// risk damaging the servo electronics.
pub const PWM_FREQ_MIN_HZ: f64 = 40.0;

/// Highest PWM frequency accepted by the bus.
pub const PWM_FREQ_MAX_HZ: f64 = 200.0;

/// Resolution of the expander's duty registers (12 bit).
const EXPANDER_TICKS: f64 = 4096.0;

/// Highest tick value writable to an expander duty register.
const EXPANDER_MAX_TICKS: u16 = 4095;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for accessing I2C PWM-expander boards.
pub trait ExpanderDriver {
    /// Set the duty of an expander port in 12-bit ticks.
    fn set_duty_ticks(&mut self, port: u8, ticks: u16) -> Result<(), ServoError>;

    /// Set the PWM frame frequency of the expander.
    fn set_frequency(&mut self, freq_hz: f64) -> Result<(), ServoError>;

    /// Turn an expander port fully off.
    fn set_port_off(&mut self, port: u8) -> Result<(), ServoError>;
}

/// Trait to provide a unified API for the controller's own PWM outputs.
pub trait DirectPwmDriver {
    /// Set the pulse width of the given pin in microseconds.
    fn set_pulse_width(&mut self, pin: u8, us: u16) -> Result<(), ServoError>;

    /// Release the given pin, stopping its PWM output.
    fn release(&mut self, pin: u8) -> Result<(), ServoError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Travel and pulse-width limits for a single servo channel.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ServoLimits {
    /// Shortest pulse the servo may be driven with.
    ///
    /// Units: microseconds
    pub min_pulse_us: u16,

    /// Longest pulse the servo may be driven with.
    ///
    /// Units: microseconds
    pub max_pulse_us: u16,

    /// Lowest allowed joint angle.
    ///
    /// Units: degrees
    pub min_deg: f64,

    /// Highest allowed joint angle.
    ///
    /// Units: degrees
    pub max_deg: f64,
}

/// A single logical servo channel.
///
/// Channels are created unattached with default limits when the bus is
/// constructed, and are owned exclusively by the bus.
#[derive(Clone, Copy, Debug)]
pub struct ServoChannel {
    /// Limits applied to every write on this channel.
    pub limits: ServoLimits,

    /// Whether the channel is currently engaged.
    pub attached: bool,

    /// The hardware backend this channel maps onto.
    pub backend: ChannelBackend,
}

/// Parameters for the actuator bus.
#[derive(Debug, Deserialize)]
pub struct Params {
    /// PWM frame frequency used for expander duty conversion.
    ///
    /// Units: Hertz
    pub pwm_freq_hz: f64,

    /// Backend mapping for each logical channel, in channel order.
    pub channels: Vec<ChannelBackend>,
}

/// The actuator bus itself.
pub struct ActuatorBus {
    channels: [ServoChannel; NUM_CHANNELS],

    freq_hz: f64,

    expander: Box<dyn ExpanderDriver>,

    direct: Box<dyn DirectPwmDriver>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur inside a hardware driver.
#[derive(thiserror::Error, Debug)]
pub enum ServoError {
    #[error("An I2C error occured")]
    I2c,

    #[error("A GPIO error occured")]
    Gpio,

    #[error("Duty value out of range")]
    InvalidDuty,
}

/// The hardware backend of a single channel.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelBackend {
    /// Driven from the controller's own PWM hardware on the given pin.
    DirectPwm { pin: u8 },

    /// Driven through the I2C PWM expander on the given port.
    ExpanderPwm { port: u8 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ServoLimits {
    fn default() -> Self {
        ServoLimits {
            min_pulse_us: 500,
            max_pulse_us: 2500,
            min_deg: 0.0,
            max_deg: 180.0,
        }
    }
}

impl ActuatorBus {
    /// Create a new bus over the given drivers.
    ///
    /// All channels start unattached with default limits. The PWM frequency
    /// from the parameters is clamped into the safe hobby-servo band and
    /// pushed to the expander.
    pub fn new(
        expander: Box<dyn ExpanderDriver>,
        direct: Box<dyn DirectPwmDriver>,
        params: &Params,
    ) -> Self {
        let freq_hz = maths::clamp(&params.pwm_freq_hz, &PWM_FREQ_MIN_HZ, &PWM_FREQ_MAX_HZ);

        if freq_hz != params.pwm_freq_hz {
            warn!(
                "Requested PWM frequency {} Hz outside [{}, {}] Hz, clamped to {} Hz",
                params.pwm_freq_hz, PWM_FREQ_MIN_HZ, PWM_FREQ_MAX_HZ, freq_hz
            );
        }

        if params.channels.len() != NUM_CHANNELS {
            warn!(
                "Channel backend table has {} entries, expected {}, \
                 missing channels use the default mapping",
                params.channels.len(),
                NUM_CHANNELS
            );
        }

        let mut bus = Self {
            channels: core::array::from_fn(|i| ServoChannel {
                limits: ServoLimits::default(),
                attached: false,
                backend: params
                    .channels
                    .get(i)
                    .copied()
                    .unwrap_or_else(|| default_backend(i)),
            }),
            freq_hz,
            expander,
            direct,
        };

        if let Err(e) = bus.expander.set_frequency(freq_hz) {
            warn!("Couldn't set expander PWM frequency: {}", e);
        }

        info!("ActuatorBus initialised at {} Hz", freq_hz);

        bus
    }

    /// Attach a channel, storing its limits and marking it engaged.
    ///
    /// An out-of-range channel is a no-op.
    pub fn attach(&mut self, channel: u8, limits: ServoLimits) {
        let ch = match self.channels.get_mut(channel as usize) {
            Some(c) => c,
            None => {
                warn!("attach: channel {} out of range", channel);
                return;
            }
        };

        if limits.min_pulse_us > limits.max_pulse_us || limits.min_deg > limits.max_deg {
            warn!(
                "attach: channel {} limits are inverted ({:?}), keeping previous limits",
                channel, limits
            );
            return;
        }

        ch.limits = limits;
        ch.attached = true;

        debug!("Attached channel {} -> {:?}", channel, ch.backend);
    }

    /// Disengage a single channel.
    ///
    /// An out-of-range or unattached channel is a no-op.
    pub fn detach(&mut self, channel: u8) {
        let ch = match self.channels.get(channel as usize) {
            Some(c) => *c,
            None => return,
        };

        if !ch.attached {
            return;
        }

        let result = match ch.backend {
            ChannelBackend::DirectPwm { pin } => self.direct.release(pin),
            ChannelBackend::ExpanderPwm { port } => self.expander.set_port_off(port),
        };

        if let Err(e) = result {
            warn!("detach: couldn't disengage channel {}: {}", channel, e);
        }

        self.channels[channel as usize].attached = false;

        debug!("Detached channel {}", channel);
    }

    /// Write a joint angle to a channel.
    ///
    /// The angle is clamped into the channel's travel limits and mapped
    /// linearly onto the channel's pulse-width limits. Invalid or unattached
    /// channels are a no-op.
    pub fn write_degrees(&mut self, channel: u8, deg: f64) {
        let ch = match self.channels.get(channel as usize) {
            Some(c) => *c,
            None => {
                trace!("write_degrees: channel {} out of range", channel);
                return;
            }
        };

        if !ch.attached {
            trace!("write_degrees: channel {} not attached", channel);
            return;
        }

        let us = deg_to_us(&ch.limits, deg);
        self.write_pulse(channel, &ch, us);
    }

    /// Write a raw pulse width to a channel.
    ///
    /// The pulse is clamped into the channel's pulse-width limits. Invalid or
    /// unattached channels are a no-op.
    pub fn write_microseconds(&mut self, channel: u8, us: u16) {
        let ch = match self.channels.get(channel as usize) {
            Some(c) => *c,
            None => return,
        };

        if !ch.attached {
            return;
        }

        self.write_pulse(channel, &ch, us);
    }

    /// Drive a channel to the midpoint of its travel limits.
    pub fn write_neutral(&mut self, channel: u8) {
        let mid = match self.channels.get(channel as usize) {
            Some(c) => 0.5 * (c.limits.min_deg + c.limits.max_deg),
            None => return,
        };

        self.write_degrees(channel, mid);
    }

    /// Disengage every attached channel (emergency power-down).
    pub fn set_all_off(&mut self) {
        info!("set_all_off - detaching all channels");

        for channel in 0..NUM_CHANNELS {
            self.detach(channel as u8);
        }
    }

    /// Change the PWM frame frequency.
    ///
    /// The frequency is clamped into the safe hobby-servo band before being
    /// stored and pushed to the expander.
    pub fn set_frequency(&mut self, freq_hz: f64) {
        self.freq_hz = maths::clamp(&freq_hz, &PWM_FREQ_MIN_HZ, &PWM_FREQ_MAX_HZ);

        if let Err(e) = self.expander.set_frequency(self.freq_hz) {
            warn!("Couldn't set expander PWM frequency: {}", e);
        }

        info!("PWM frequency set to {} Hz", self.freq_hz);
    }

    /// Get the current PWM frame frequency in Hertz.
    pub fn frequency_hz(&self) -> f64 {
        self.freq_hz
    }

    /// Determine whether a channel is currently attached.
    pub fn is_attached(&self, channel: u8) -> bool {
        self.channels
            .get(channel as usize)
            .map(|c| c.attached)
            .unwrap_or(false)
    }

    /// Clamp a pulse into the channel's limits and dispatch it to the
    /// channel's backend.
    fn write_pulse(&mut self, channel: u8, ch: &ServoChannel, us: u16) {
        let clamped = clamp_u16(us, ch.limits.min_pulse_us, ch.limits.max_pulse_us);

        let result = match ch.backend {
            ChannelBackend::DirectPwm { pin } => self.direct.set_pulse_width(pin, clamped),
            ChannelBackend::ExpanderPwm { port } => {
                let ticks = us_to_ticks(clamped, self.freq_hz);
                self.expander.set_duty_ticks(port, ticks)
            }
        };

        if let Err(e) = result {
            warn!("write: channel {} failed: {}", channel, e);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Default backend mapping: the first six channels are direct outputs on
/// pins 1-6, the remainder map onto expander ports 0-9.
fn default_backend(channel: usize) -> ChannelBackend {
    if channel < 6 {
        ChannelBackend::DirectPwm {
            pin: (channel + 1) as u8,
        }
    } else {
        ChannelBackend::ExpanderPwm {
            port: (channel - 6) as u8,
        }
    }
}

/// Map a joint angle onto the channel's pulse-width range.
///
/// The angle is clamped into the travel limits first and the resulting pulse
/// is clamped into the pulse limits. A degenerate travel span (max == min)
/// yields the minimum pulse rather than dividing by zero.
fn deg_to_us(limits: &ServoLimits, deg: f64) -> u16 {
    let d = maths::clamp(&deg, &limits.min_deg, &limits.max_deg);

    let span_deg = limits.max_deg - limits.min_deg;
    if span_deg <= 0.0 {
        return limits.min_pulse_us;
    }

    let us = maths::lin_map(
        (limits.min_deg, limits.max_deg),
        (limits.min_pulse_us as f64, limits.max_pulse_us as f64),
        d,
    );

    clamp_u16(us.round() as u16, limits.min_pulse_us, limits.max_pulse_us)
}

/// Convert a pulse width into 12-bit expander duty ticks at the given frame
/// frequency.
fn us_to_ticks(us: u16, freq_hz: f64) -> u16 {
    let period_us = 1e6 / freq_hz;
    let ticks = ((us as f64) / period_us * EXPANDER_TICKS).round();

    if ticks < 0.0 {
        0
    } else if ticks > EXPANDER_MAX_TICKS as f64 {
        EXPANDER_MAX_TICKS
    } else {
        ticks as u16
    }
}

/// Clamp for u16 which cannot panic on inverted bounds.
fn clamp_u16(value: u16, min: u16, max: u16) -> u16 {
    if min > max {
        return min;
    }
    value.min(max).max(min)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Expander driver which records every duty write.
    #[derive(Default)]
    struct MockExpander {
        writes: Arc<Mutex<Vec<(u8, u16)>>>,
        offs: Arc<Mutex<Vec<u8>>>,
    }

    impl ExpanderDriver for MockExpander {
        fn set_duty_ticks(&mut self, port: u8, ticks: u16) -> Result<(), ServoError> {
            self.writes.lock().unwrap().push((port, ticks));
            Ok(())
        }

        fn set_frequency(&mut self, _freq_hz: f64) -> Result<(), ServoError> {
            Ok(())
        }

        fn set_port_off(&mut self, port: u8) -> Result<(), ServoError> {
            self.offs.lock().unwrap().push(port);
            Ok(())
        }
    }

    /// Direct driver which records every pulse write.
    #[derive(Default)]
    struct MockDirect {
        writes: Arc<Mutex<Vec<(u8, u16)>>>,
        released: Arc<Mutex<Vec<u8>>>,
    }

    impl DirectPwmDriver for MockDirect {
        fn set_pulse_width(&mut self, pin: u8, us: u16) -> Result<(), ServoError> {
            self.writes.lock().unwrap().push((pin, us));
            Ok(())
        }

        fn release(&mut self, pin: u8) -> Result<(), ServoError> {
            self.released.lock().unwrap().push(pin);
            Ok(())
        }
    }

    fn test_bus() -> (
        ActuatorBus,
        Arc<Mutex<Vec<(u8, u16)>>>,
        Arc<Mutex<Vec<(u8, u16)>>>,
    ) {
        let expander = MockExpander::default();
        let direct = MockDirect::default();
        let exp_writes = expander.writes.clone();
        let dir_writes = direct.writes.clone();

        let params = Params {
            pwm_freq_hz: 50.0,
            channels: (0..NUM_CHANNELS).map(default_backend).collect(),
        };

        let bus = ActuatorBus::new(Box::new(expander), Box::new(direct), &params);

        (bus, exp_writes, dir_writes)
    }

    #[test]
    fn test_pulse_always_within_limits() {
        let (mut bus, _exp, dir) = test_bus();

        let limits = ServoLimits {
            min_pulse_us: 600,
            max_pulse_us: 2400,
            min_deg: 10.0,
            max_deg: 170.0,
        };
        bus.attach(0, limits);

        for deg in [-1.0e6, -180.0, 0.0, 10.0, 90.0, 170.0, 500.0, 1.0e9, f64::NAN] {
            bus.write_degrees(0, deg);
        }

        let writes = dir.lock().unwrap();
        assert!(!writes.is_empty());
        for (_, us) in writes.iter() {
            assert!(*us >= 600 && *us <= 2400, "pulse {} outside limits", us);
        }
    }

    #[test]
    fn test_degenerate_limits_yield_min_pulse() {
        let (mut bus, _exp, dir) = test_bus();

        bus.attach(
            1,
            ServoLimits {
                min_pulse_us: 500,
                max_pulse_us: 2500,
                min_deg: 90.0,
                max_deg: 90.0,
            },
        );

        bus.write_degrees(1, 45.0);
        bus.write_degrees(1, 135.0);

        let writes = dir.lock().unwrap();
        assert_eq!(writes.len(), 2);
        for (_, us) in writes.iter() {
            assert_eq!(*us, 500);
        }
    }

    #[test]
    fn test_expander_tick_conversion() {
        let (mut bus, exp, _dir) = test_bus();

        // Channel 6 is the first expander channel (port 0)
        bus.attach(6, ServoLimits::default());
        bus.write_degrees(6, 90.0);

        // 1500 us at 50 Hz: 1500/20000 * 4096 = 307.2 -> 307
        let writes = exp.lock().unwrap();
        assert_eq!(writes.as_slice(), &[(0u8, 307u16)]);
    }

    #[test]
    fn test_unattached_and_invalid_channels_are_noops() {
        let (mut bus, exp, dir) = test_bus();

        // Never attached
        bus.write_degrees(2, 90.0);
        bus.write_microseconds(9, 1500);

        // Out of range
        bus.write_degrees(200, 90.0);
        bus.attach(200, ServoLimits::default());
        bus.write_neutral(200);

        assert!(exp.lock().unwrap().is_empty());
        assert!(dir.lock().unwrap().is_empty());
    }

    #[test]
    fn test_write_neutral_is_mid_travel() {
        let (mut bus, _exp, dir) = test_bus();

        bus.attach(0, ServoLimits::default());
        bus.write_neutral(0);

        let writes = dir.lock().unwrap();
        assert_eq!(writes.as_slice(), &[(1u8, 1500u16)]);
    }

    #[test]
    fn test_set_all_off_detaches_everything() {
        let expander = MockExpander::default();
        let direct = MockDirect::default();
        let offs = expander.offs.clone();
        let released = direct.released.clone();

        let params = Params {
            pwm_freq_hz: 50.0,
            channels: (0..NUM_CHANNELS).map(default_backend).collect(),
        };
        let mut bus = ActuatorBus::new(Box::new(expander), Box::new(direct), &params);

        for ch in 0..NUM_CHANNELS {
            bus.attach(ch as u8, ServoLimits::default());
        }

        bus.set_all_off();

        assert_eq!(released.lock().unwrap().len(), 6);
        assert_eq!(offs.lock().unwrap().len(), 10);
        for ch in 0..NUM_CHANNELS {
            assert!(!bus.is_attached(ch as u8));
        }
    }

    #[test]
    fn test_frequency_clamped_to_servo_band() {
        let (mut bus, _exp, _dir) = test_bus();

        bus.set_frequency(1000.0);
        assert_eq!(bus.frequency_hz(), PWM_FREQ_MAX_HZ);

        bus.set_frequency(1.0);
        assert_eq!(bus.frequency_hz(), PWM_FREQ_MIN_HZ);
    }

    #[test]
    fn test_microseconds_clamped() {
        let (mut bus, _exp, dir) = test_bus();

        bus.attach(
            0,
            ServoLimits {
                min_pulse_us: 1000,
                max_pulse_us: 2000,
                min_deg: 0.0,
                max_deg: 180.0,
            },
        );

        bus.write_microseconds(0, 50);
        bus.write_microseconds(0, 60000);

        let writes = dir.lock().unwrap();
        assert_eq!(writes.as_slice(), &[(1u8, 1000u16), (1u8, 2000u16)]);
    }
}
