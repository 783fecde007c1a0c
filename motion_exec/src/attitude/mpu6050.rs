//! [`ImuSensor`] implementation for MPU6050-class devices
//!
//! Register-level driver over blocking I2C. The device powers up asleep, so
//! initialisation wakes it, selects the gyro PLL clock and configures the
//! sensing ranges used by the fusion filter.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::{debug, info};
use nalgebra::Vector3;

use super::{AttitudeError, ImuSample, ImuSensor};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// The two addresses the device can be strapped to.
const ADDRESSES: [u8; 2] = [0x68, 0x69];

const REG_SMPLRT_DIV: u8 = 0x19;
const REG_CONFIG: u8 = 0x1A;
const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;

/// Expected WHO_AM_I response.
const WHO_AM_I_VALUE: u8 = 0x68;

/// Accelerometer sensitivity at the +-4 g range.
///
/// Units: LSB per g
const ACCEL_LSB_PER_G: f64 = 8192.0;

/// Gyro sensitivity at the +-500 deg/s range.
///
/// Units: LSB per deg/s
const GYRO_LSB_PER_DPS: f64 = 65.5;

/// Units: m/s^2
const STANDARD_GRAVITY: f64 = 9.80665;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// MPU6050-class inertial sensor.
pub struct Mpu6050<I2C> {
    i2c: I2C,

    /// Address the device last responded at.
    address: u8,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, E> Mpu6050<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    /// Create a new driver over the given bus.
    ///
    /// No bus traffic happens until [`ImuSensor::initialise`] is called.
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            address: ADDRESSES[0],
        }
    }

    /// Find the device at one of its known addresses.
    fn probe(&mut self) -> Result<(), AttitudeError> {
        for address in ADDRESSES.iter() {
            let mut id = [0u8; 1];

            let responded = self
                .i2c
                .write_read(*address, &[REG_WHO_AM_I], &mut id)
                .is_ok();

            if responded && id[0] == WHO_AM_I_VALUE {
                self.address = *address;
                debug!("IMU found at address {:#04x}", address);
                return Ok(());
            }
        }

        Err(AttitudeError::NoDevice)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), AttitudeError> {
        self.i2c
            .write(self.address, &[reg, value])
            .map_err(|_| AttitudeError::I2c)
    }
}

impl<I2C, E> ImuSensor for Mpu6050<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E> + Send,
{
    fn initialise(&mut self) -> Result<(), AttitudeError> {
        self.probe()?;

        // Wake from sleep, clock from the gyro X PLL
        self.write_reg(REG_PWR_MGMT_1, 0x01)?;

        // ~21 Hz digital low-pass filter
        self.write_reg(REG_CONFIG, 0x04)?;

        // +-500 deg/s
        self.write_reg(REG_GYRO_CONFIG, 0x08)?;

        // +-4 g
        self.write_reg(REG_ACCEL_CONFIG, 0x08)?;

        // Sample at 1 kHz / (1 + 4) = 200 Hz
        self.write_reg(REG_SMPLRT_DIV, 0x04)?;

        info!("IMU initialised at address {:#04x}", self.address);

        Ok(())
    }

    fn read_sample(&mut self) -> Result<ImuSample, AttitudeError> {
        // Accel, temperature and gyro registers are contiguous, burst-read
        // all fourteen bytes in one transaction
        let mut buf = [0u8; 14];
        self.i2c
            .write_read(self.address, &[REG_ACCEL_XOUT_H], &mut buf)
            .map_err(|_| AttitudeError::I2c)?;

        let raw = |offset: usize| i16::from_be_bytes([buf[offset], buf[offset + 1]]) as f64;

        let accel_mss =
            Vector3::new(raw(0), raw(2), raw(4)) * (STANDARD_GRAVITY / ACCEL_LSB_PER_G);

        // Bytes 6-7 are the temperature, unused
        let gyro_rads = Vector3::new(raw(8), raw(10), raw(12))
            * (std::f64::consts::PI / 180.0 / GYRO_LSB_PER_DPS);

        Ok(ImuSample {
            accel_mss,
            gyro_rads,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// Fake bus exposing a device at one address with canned sample data.
    struct FakeI2c {
        device_address: u8,
        sample: [u8; 14],
        reg_writes: Vec<(u8, u8)>,
    }

    #[derive(Debug)]
    struct FakeError;

    impl Write for FakeI2c {
        type Error = FakeError;

        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), FakeError> {
            if address != self.device_address {
                return Err(FakeError);
            }
            if bytes.len() == 2 {
                self.reg_writes.push((bytes[0], bytes[1]));
            }
            Ok(())
        }
    }

    impl WriteRead for FakeI2c {
        type Error = FakeError;

        fn write_read(
            &mut self,
            address: u8,
            bytes: &[u8],
            buffer: &mut [u8],
        ) -> Result<(), FakeError> {
            if address != self.device_address {
                return Err(FakeError);
            }

            match bytes {
                [REG_WHO_AM_I] => buffer[0] = WHO_AM_I_VALUE,
                [REG_ACCEL_XOUT_H] => buffer.copy_from_slice(&self.sample),
                _ => return Err(FakeError),
            }

            Ok(())
        }
    }

    fn sample_bytes(accel: [i16; 3], gyro: [i16; 3]) -> [u8; 14] {
        let mut buf = [0u8; 14];
        for (i, v) in accel.iter().enumerate() {
            buf[i * 2..i * 2 + 2].copy_from_slice(&v.to_be_bytes());
        }
        for (i, v) in gyro.iter().enumerate() {
            buf[8 + i * 2..8 + i * 2 + 2].copy_from_slice(&v.to_be_bytes());
        }
        buf
    }

    #[test]
    fn test_initialise_probes_alternative_address() {
        let i2c = FakeI2c {
            device_address: 0x69,
            sample: [0u8; 14],
            reg_writes: Vec::new(),
        };

        let mut imu = Mpu6050::new(i2c);
        imu.initialise().unwrap();

        assert_eq!(imu.address, 0x69);

        // Wake write must come first
        assert_eq!(imu.i2c.reg_writes[0], (REG_PWR_MGMT_1, 0x01));
    }

    #[test]
    fn test_initialise_fails_without_device() {
        let i2c = FakeI2c {
            device_address: 0x42,
            sample: [0u8; 14],
            reg_writes: Vec::new(),
        };

        let mut imu = Mpu6050::new(i2c);
        assert!(matches!(imu.initialise(), Err(AttitudeError::NoDevice)));
    }

    #[test]
    fn test_sample_scaling() {
        // 1 g on z, 10 deg/s about x
        let i2c = FakeI2c {
            device_address: 0x68,
            sample: sample_bytes([0, 0, 8192], [655, 0, 0]),
            reg_writes: Vec::new(),
        };

        let mut imu = Mpu6050::new(i2c);
        imu.initialise().unwrap();

        let sample = imu.read_sample().unwrap();

        assert!((sample.accel_mss.z - STANDARD_GRAVITY).abs() < 1e-9);
        assert!((sample.gyro_rads.x - 10.0_f64.to_radians()).abs() < 1e-3);
        assert_eq!(sample.accel_mss.x, 0.0);
        assert_eq!(sample.gyro_rads.z, 0.0);
    }
}
