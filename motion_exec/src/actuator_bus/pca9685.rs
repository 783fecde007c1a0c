//! [`ExpanderDriver`] implementation for the PCA9685 driver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use pwm_pca9685::{Channel, Pca9685};
use embedded_hal::blocking::i2c::{Write, WriteRead};

use super::{ExpanderDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const MAX_PWM: u16 = 4096;

/// Internal oscillator frequency of the PCA9685.
///
/// Units: Hertz
const OSC_CLOCK_HZ: f64 = 25_000_000.0;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, E> ExpanderDriver for Pca9685<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>
{
    fn set_duty_ticks(&mut self, port: u8, ticks: u16) -> Result<(), ServoError> {

        // If the duty is out of range return an error
        if ticks >= MAX_PWM {
            return Err(ServoError::InvalidDuty)
        }

        let channel = port_to_channel(port).ok_or(ServoError::InvalidDuty)?;

        // The pulse starts at tick zero and ends after `ticks` ticks
        self.set_channel_on(channel, 0)
            .and_then(|_| self.set_channel_off(channel, ticks))
            .map_err(map_pca_err)
    }

    fn set_frequency(&mut self, freq_hz: f64) -> Result<(), ServoError> {

        // Prescale formula from the PCA9685 datasheet, the device only
        // accepts values in [3, 255]
        let prescale = (OSC_CLOCK_HZ / (MAX_PWM as f64 * freq_hz)).round() - 1.0;
        let prescale = prescale.max(3.0).min(255.0) as u8;

        // The prescale register can only be written while the oscillator is
        // asleep
        self.disable().map_err(map_pca_err)?;
        self.set_prescale(prescale).map_err(map_pca_err)?;
        self.enable().map_err(map_pca_err)
    }

    fn set_port_off(&mut self, port: u8) -> Result<(), ServoError> {
        let channel = port_to_channel(port).ok_or(ServoError::InvalidDuty)?;

        self.set_channel_full_off(channel).map_err(map_pca_err)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Map a port number onto the driver's channel type.
fn port_to_channel(port: u8) -> Option<Channel> {
    Some(match port {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return None
    })
}

fn map_pca_err<E>(e: pwm_pca9685::Error<E>) -> ServoError {
    match e {
        pwm_pca9685::Error::I2C(_) => ServoError::I2c,
        pwm_pca9685::Error::InvalidInputData => ServoError::InvalidDuty
    }
}
