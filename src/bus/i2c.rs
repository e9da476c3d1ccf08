//! I²C bus access, used by the gas sensor (§4.2).
//!
//! Thin wrapper over `embedded_hal::i2c::I2c` so driver code names its own
//! trait rather than reaching into `embedded-hal` directly, matching the
//! teacher's convention of a per-concern port trait in each adapter module.

use crate::error::SensorError;

/// Blocking I²C transaction port. Implemented by the `espidf` HAL adapter on
/// target and by an in-memory fake in host tests.
pub trait I2cBus {
    fn write(&mut self, addr: u8, data: &[u8]) -> Result<(), SensorError>;
    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), SensorError>;
    fn write_read(&mut self, addr: u8, data: &[u8], buf: &mut [u8]) -> Result<(), SensorError>;
}

#[cfg(target_os = "espidf")]
impl<T> I2cBus for T
where
    T: embedded_hal::i2c::I2c,
{
    fn write(&mut self, addr: u8, data: &[u8]) -> Result<(), SensorError> {
        embedded_hal::i2c::I2c::write(self, addr, data)
            .map_err(|_| SensorError::Transient("i2c write"))
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        embedded_hal::i2c::I2c::read(self, addr, buf)
            .map_err(|_| SensorError::Transient("i2c read"))
    }

    fn write_read(&mut self, addr: u8, data: &[u8], buf: &mut [u8]) -> Result<(), SensorError> {
        embedded_hal::i2c::I2c::write_read(self, addr, data, buf)
            .map_err(|_| SensorError::Transient("i2c write_read"))
    }
}

#[cfg(not(target_os = "espidf"))]
pub mod fake {
    use super::I2cBus;
    use crate::error::SensorError;
    use std::collections::VecDeque;

    /// Host-side I²C fake: a queue of canned responses keyed by nothing more
    /// than call order, enough to drive the gas sensor's self-test and
    /// conditioning sequence in tests.
    #[derive(Default)]
    pub struct FakeI2c {
        pub responses: VecDeque<Vec<u8>>,
        pub last_write: Option<Vec<u8>>,
    }

    impl I2cBus for FakeI2c {
        fn write(&mut self, _addr: u8, data: &[u8]) -> Result<(), SensorError> {
            self.last_write = Some(data.to_vec());
            Ok(())
        }

        fn read(&mut self, _addr: u8, buf: &mut [u8]) -> Result<(), SensorError> {
            let Some(resp) = self.responses.pop_front() else {
                return Err(SensorError::Timeout);
            };
            if resp.len() != buf.len() {
                return Err(SensorError::Transient("short read"));
            }
            buf.copy_from_slice(&resp);
            Ok(())
        }

        fn write_read(
            &mut self,
            addr: u8,
            data: &[u8],
            buf: &mut [u8],
        ) -> Result<(), SensorError> {
            self.write(addr, data)?;
            self.read(addr, buf)
        }
    }
}
