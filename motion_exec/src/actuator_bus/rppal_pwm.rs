//! [`DirectPwmDriver`] implementation over rppal software PWM
//!
//! Pins are claimed lazily on first write and released on demand, allowing
//! the bus to power a servo down completely by releasing its pin.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;

use rppal::gpio::{Gpio, OutputPin};

use super::{DirectPwmDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// PWM frame period for directly-driven servos (50 Hz).
const PWM_PERIOD: Duration = Duration::from_micros(20_000);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Software PWM over the Pi's GPIO pins.
pub struct RppalSoftPwm {
    gpio: Gpio,

    pins: HashMap<u8, OutputPin>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RppalSoftPwm {
    /// Create a new driver over the Pi's GPIO peripheral.
    pub fn new() -> Result<Self, ServoError> {
        Ok(Self {
            gpio: Gpio::new().map_err(|_| ServoError::Gpio)?,
            pins: HashMap::new(),
        })
    }
}

impl DirectPwmDriver for RppalSoftPwm {
    fn set_pulse_width(&mut self, pin: u8, us: u16) -> Result<(), ServoError> {
        let output = match self.pins.entry(pin) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let p = self
                    .gpio
                    .get(pin)
                    .map_err(|_| ServoError::Gpio)?
                    .into_output();
                v.insert(p)
            }
        };

        output
            .set_pwm(PWM_PERIOD, Duration::from_micros(us as u64))
            .map_err(|_| ServoError::Gpio)
    }

    fn release(&mut self, pin: u8) -> Result<(), ServoError> {
        if let Some(mut output) = self.pins.remove(&pin) {
            output.clear_pwm().map_err(|_| ServoError::Gpio)?;
        }

        Ok(())
    }
}
