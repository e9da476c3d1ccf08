//! Senseair S8-class CO2 sensor, Modbus RTU over UART.

use crate::bus::modbus;
use crate::bus::uart::UartBus;
use crate::error::SensorError;
use crate::sensors::{SensorDriver, SensorId, SensorOutput};

const READ_TIMEOUT_MS: u32 = 500;

pub struct Co2Sensor<U: UartBus> {
    uart: U,
    enabled: bool,
}

impl<U: UartBus> Co2Sensor<U> {
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            enabled: true,
        }
    }
}

impl<U: UartBus> SensorDriver for Co2Sensor<U> {
    fn id(&self) -> SensorId {
        SensorId::Co2
    }

    fn init(&mut self) -> Result<(), SensorError> {
        self.uart.flush_input();
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn read(&mut self) -> Result<SensorOutput, SensorError> {
        if !self.enabled {
            return Err(SensorError::NotReady);
        }
        let ppm = modbus::read_co2_ppm(&mut self.uart, READ_TIMEOUT_MS)?;
        Ok(SensorOutput::Co2 {
            co2_ppm: f32::from(ppm),
        })
    }

    fn reset(&mut self) -> Result<(), SensorError> {
        self.uart.flush_input();
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

    fn is_reporting_ready(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::modbus::crc16_modbus;
    use crate::bus::uart::fake::FakeUart;

    fn response_bytes(ppm: u16) -> Vec<u8> {
        let mut buf = vec![0xFE, 0x04, 0x02];
        buf.extend_from_slice(&ppm.to_be_bytes());
        let crc = crc16_modbus(&buf);
        buf.push((crc & 0xFF) as u8);
        buf.push((crc >> 8) as u8);
        buf
    }

    #[test]
    fn reads_valid_response() {
        let uart = FakeUart::with_frame(&response_bytes(612));
        let mut sensor = Co2Sensor::new(uart);
        let out = sensor.read().unwrap();
        assert_eq!(out, SensorOutput::Co2 { co2_ppm: 612.0 });
    }
}
