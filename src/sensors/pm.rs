//! PMS5003-class particulate sensor, UART-attached.
//!
//! Frame parsing lives in [`crate::bus::pms_frame`]; this module just owns
//! the UART handle and the enable/disable latch, matching the shape of the
//! teacher's per-peripheral driver structs (construct with the bus handle,
//! a thin `read()` wrapping the protocol module).

use crate::bus::pms_frame;
use crate::bus::uart::UartBus;
use crate::error::SensorError;
use crate::sensors::{SensorDriver, SensorId, SensorOutput};

const READ_TIMEOUT_MS: u32 = 1_500;

pub struct PmSensor<U: UartBus> {
    uart: U,
    enabled: bool,
}

impl<U: UartBus> PmSensor<U> {
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            enabled: true,
        }
    }
}

impl<U: UartBus> SensorDriver for PmSensor<U> {
    fn id(&self) -> SensorId {
        SensorId::Pm
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
        let frame = pms_frame::read_frame(&mut self.uart, READ_TIMEOUT_MS)?;
        Ok(SensorOutput::Pm {
            pm1_0: f32::from(frame.pm1_0_ugm3),
            pm2_5: f32::from(frame.pm2_5_ugm3),
            pm10: f32::from(frame.pm10_ugm3),
            temp_c: frame.temp_c,
            humidity_rh: frame.humidity_rh,
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
    use crate::bus::uart::fake::FakeUart;

    fn valid_frame_bytes() -> Vec<u8> {
        let words: [u16; 11] = [0, 0, 0, 5, 12, 18, 0, 0, 0, 215, 455];
        let mut buf = vec![0x42, 0x4D];
        let declared: u16 = (28 - 4) as u16;
        buf.extend_from_slice(&declared.to_be_bytes());
        for w in words {
            buf.extend_from_slice(&w.to_be_bytes());
        }
        let checksum = buf.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
        buf.extend_from_slice(&checksum.to_be_bytes());
        buf
    }

    #[test]
    fn reads_valid_frame() {
        let uart = FakeUart::with_frame(&valid_frame_bytes());
        let mut sensor = PmSensor::new(uart);
        let out = sensor.read().unwrap();
        match out {
            SensorOutput::Pm { pm2_5, .. } => assert_eq!(pm2_5, 12.0),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn disabled_sensor_reports_not_ready() {
        let uart = FakeUart::with_frame(&valid_frame_bytes());
        let mut sensor = PmSensor::new(uart);
        sensor.disable().unwrap();
        assert_eq!(sensor.read(), Err(SensorError::NotReady));
        assert!(!sensor.is_reporting_ready());
    }
}
