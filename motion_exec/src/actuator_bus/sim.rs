//! Simulated PWM drivers
//!
//! These drivers stand in for the real hardware when the executable runs on a
//! development host. Writes are traced so a simulation run can be inspected
//! from the session log.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;

use super::{DirectPwmDriver, ExpanderDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulated I2C PWM expander.
#[derive(Default)]
pub struct SimExpander;

/// Simulated direct PWM output.
#[derive(Default)]
pub struct SimDirect;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ExpanderDriver for SimExpander {
    fn set_duty_ticks(&mut self, port: u8, ticks: u16) -> Result<(), ServoError> {
        trace!("sim expander: port {} duty {} ticks", port, ticks);
        Ok(())
    }

    fn set_frequency(&mut self, freq_hz: f64) -> Result<(), ServoError> {
        trace!("sim expander: frequency {} Hz", freq_hz);
        Ok(())
    }

    fn set_port_off(&mut self, port: u8) -> Result<(), ServoError> {
        trace!("sim expander: port {} off", port);
        Ok(())
    }
}

impl DirectPwmDriver for SimDirect {
    fn set_pulse_width(&mut self, pin: u8, us: u16) -> Result<(), ServoError> {
        trace!("sim direct: pin {} pulse {} us", pin, us);
        Ok(())
    }

    fn release(&mut self, pin: u8) -> Result<(), ServoError> {
        trace!("sim direct: pin {} released", pin);
        Ok(())
    }
}
