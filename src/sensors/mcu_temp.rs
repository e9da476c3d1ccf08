//! Internal MCU temperature channel — no bus, no framing, just a direct
//! peripheral read. Used by fusion's self-heat offset (§4.3) as the
//! co-located reference that every other channel's temperature is derived
//! from when a dedicated ambient sensor isn't present.

use crate::error::SensorError;
use crate::sensors::{SensorDriver, SensorId, SensorOutput};

pub trait McuTempPort {
    fn read_celsius(&mut self) -> Result<f32, SensorError>;
}

#[cfg(target_os = "espidf")]
pub struct EspMcuTemp {
    driver: esp_idf_hal::temp_sensor::TempSensorDriver<'static>,
}

#[cfg(target_os = "espidf")]
impl EspMcuTemp {
    pub fn new(
        temp_sensor: impl esp_idf_hal::peripheral::Peripheral<P = esp_idf_hal::temp_sensor::TempSensor> + 'static,
    ) -> Result<Self, SensorError> {
        let config = esp_idf_hal::temp_sensor::TempSensorConfig::default();
        let mut driver = esp_idf_hal::temp_sensor::TempSensorDriver::new(&config, temp_sensor)
            .map_err(|_| SensorError::Fatal("temp sensor init"))?;
        driver
            .enable()
            .map_err(|_| SensorError::Fatal("temp sensor enable"))?;
        Ok(Self { driver })
    }
}

#[cfg(target_os = "espidf")]
impl McuTempPort for EspMcuTemp {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        self.driver
            .get_celsius()
            .map_err(|_| SensorError::Transient("mcu temp read"))
    }
}

#[cfg(not(target_os = "espidf"))]
pub mod fake {
    use super::McuTempPort;
    use crate::error::SensorError;

    /// Host-side stand-in: a fixed value tests can override.
    pub struct FixedMcuTemp(pub f32);

    impl McuTempPort for FixedMcuTemp {
        fn read_celsius(&mut self) -> Result<f32, SensorError> {
            Ok(self.0)
        }
    }
}

pub struct McuTempSensor<P: McuTempPort> {
    port: P,
    enabled: bool,
}

impl<P: McuTempPort> McuTempSensor<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            enabled: true,
        }
    }
}

impl<P: McuTempPort> SensorDriver for McuTempSensor<P> {
    fn id(&self) -> SensorId {
        SensorId::McuTemp
    }

    fn init(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn read(&mut self) -> Result<SensorOutput, SensorError> {
        if !self.enabled {
            return Err(SensorError::NotReady);
        }
        let mcu_temp_c = self.port.read_celsius()?;
        Ok(SensorOutput::McuTemp { mcu_temp_c })
    }

    fn reset(&mut self) -> Result<(), SensorError> {
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use fake::FixedMcuTemp;

    #[test]
    fn reads_fixed_value() {
        let mut sensor = McuTempSensor::new(FixedMcuTemp(34.5));
        assert_eq!(
            sensor.read().unwrap(),
            SensorOutput::McuTemp { mcu_temp_c: 34.5 }
        );
    }
}
