//! UART bus access, used by the particulate and CO2 sensors (§4.2).
//!
//! Neither `embedded-hal` nor `esp-idf-hal` agree on a single blocking UART
//! trait, so this mirrors the teacher's `rpc::transport::Transport` shape —
//! a small read/write/available port each adapter implements directly
//! against `esp_idf_hal::uart::UartDriver`.

use crate::error::SensorError;

pub trait UartBus {
    /// Number of bytes currently buffered and ready to read without blocking.
    fn bytes_available(&self) -> usize;
    /// Read up to `buf.len()` bytes, blocking until at least one is
    /// available or `timeout_ms` elapses.
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, SensorError>;
    fn write(&mut self, data: &[u8]) -> Result<usize, SensorError>;
    fn flush_input(&mut self);
}

#[cfg(target_os = "espidf")]
impl UartBus for esp_idf_hal::uart::UartDriver<'_> {
    fn bytes_available(&self) -> usize {
        self.remaining_read().unwrap_or(0) as usize
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, SensorError> {
        esp_idf_hal::uart::UartDriver::read(self, buf, timeout_ms)
            .map_err(|_| SensorError::Transient("uart read"))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, SensorError> {
        esp_idf_hal::uart::UartDriver::write(self, data).map_err(|_| SensorError::Transient("uart write"))
    }

    fn flush_input(&mut self) {
        let _ = self.clear_rx();
    }
}

#[cfg(not(target_os = "espidf"))]
pub mod fake {
    use super::UartBus;
    use crate::error::SensorError;
    use std::collections::VecDeque;

    /// Host-side UART fake backed by a byte queue the test preloads.
    #[derive(Default)]
    pub struct FakeUart {
        pub rx: VecDeque<u8>,
        pub tx: Vec<u8>,
    }

    impl FakeUart {
        pub fn with_frame(frame: &[u8]) -> Self {
            Self {
                rx: frame.iter().copied().collect(),
                tx: Vec::new(),
            }
        }
    }

    impl UartBus for FakeUart {
        fn bytes_available(&self) -> usize {
            self.rx.len()
        }

        fn read(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize, SensorError> {
            if self.rx.is_empty() {
                return Err(SensorError::Timeout);
            }
            let mut n = 0;
            while n < buf.len() {
                let Some(b) = self.rx.pop_front() else {
                    break;
                };
                buf[n] = b;
                n += 1;
            }
            Ok(n)
        }

        fn write(&mut self, data: &[u8]) -> Result<usize, SensorError> {
            self.tx.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush_input(&mut self) {
            self.rx.clear();
        }
    }
}
