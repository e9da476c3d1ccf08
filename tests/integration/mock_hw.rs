//! Shared host-side bus test doubles for the integration suite.
//!
//! The crate's own `bus::uart::fake`/`bus::i2c::fake` modules are preloaded
//! once and handed straight to a driver — fine for driver-level unit tests,
//! but a `Coordinator` takes ownership of its drivers, so an integration test
//! that wants to feed bytes in *after* `Coordinator::start()` has already run
//! `init()` needs a handle it can keep. These wrap the same queues behind
//! `Arc<Mutex<..>>` for that purpose.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use iaqd::bus::i2c::I2cBus;
use iaqd::bus::uart::UartBus;
use iaqd::error::SensorError;

#[derive(Clone, Default)]
pub struct SharedUart {
    rx: Arc<Mutex<VecDeque<u8>>>,
}

impl SharedUart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for later reads. Safe to call after the driver holding
    /// the other clone has already been moved into a `Coordinator`.
    pub fn push(&self, bytes: &[u8]) {
        self.rx.lock().unwrap().extend(bytes.iter().copied());
    }
}

impl UartBus for SharedUart {
    fn bytes_available(&self) -> usize {
        self.rx.lock().unwrap().len()
    }

    fn read(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize, SensorError> {
        let mut rx = self.rx.lock().unwrap();
        if rx.is_empty() {
            return Err(SensorError::Timeout);
        }
        let mut n = 0;
        while n < buf.len() {
            let Some(b) = rx.pop_front() else { break };
            buf[n] = b;
            n += 1;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, SensorError> {
        Ok(data.len())
    }

    fn flush_input(&mut self) {
        self.rx.lock().unwrap().clear();
    }
}

#[derive(Clone, Default)]
pub struct SharedI2c {
    responses: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl SharedI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, bytes: Vec<u8>) {
        self.responses.lock().unwrap().push_back(bytes);
    }
}

impl I2cBus for SharedI2c {
    fn write(&mut self, _addr: u8, _data: &[u8]) -> Result<(), SensorError> {
        Ok(())
    }

    fn read(&mut self, _addr: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        let mut q = self.responses.lock().unwrap();
        let Some(resp) = q.pop_front() else {
            return Err(SensorError::Timeout);
        };
        if resp.len() != buf.len() {
            return Err(SensorError::Transient("short read"));
        }
        buf.copy_from_slice(&resp);
        Ok(())
    }

    fn write_read(&mut self, addr: u8, data: &[u8], buf: &mut [u8]) -> Result<(), SensorError> {
        self.write(addr, data)?;
        self.read(addr, buf)
    }
}

// ---------------------------------------------------------------------------
// Wire-format fixture builders, reimplemented from the drivers' own test
// helpers since the originals are private to their modules.
// ---------------------------------------------------------------------------

pub fn pm_frame_bytes(pm1: u16, pm2_5: u16, pm10: u16, temp_raw: i16, humi_raw: u16) -> Vec<u8> {
    let words: [u16; 11] = [0, 0, 0, pm1, pm2_5, pm10, 0, 0, 0, temp_raw as u16, humi_raw];
    let mut buf = vec![0x42, 0x4D];
    let declared: u16 = 24;
    buf.extend_from_slice(&declared.to_be_bytes());
    for w in words {
        buf.extend_from_slice(&w.to_be_bytes());
    }
    let checksum = buf.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
    buf.extend_from_slice(&checksum.to_be_bytes());
    buf
}

fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

pub fn co2_response_bytes(ppm: u16) -> Vec<u8> {
    let mut buf = vec![0xFE, 0x04, 0x02];
    buf.extend_from_slice(&ppm.to_be_bytes());
    let crc = crc16_modbus(&buf);
    buf.push((crc & 0xFF) as u8);
    buf.push((crc >> 8) as u8);
    buf
}

const GAS_CRC8_POLY: u8 = 0x31;
const GAS_CRC8_INIT: u8 = 0xFF;

fn gas_crc8(bytes: [u8; 2]) -> u8 {
    let mut crc = GAS_CRC8_INIT;
    for &b in &bytes {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ GAS_CRC8_POLY } else { crc << 1 };
        }
    }
    crc
}

fn gas_word_with_crc(word: u16) -> [u8; 3] {
    let bytes = word.to_be_bytes();
    [bytes[0], bytes[1], gas_crc8(bytes)]
}

pub fn gas_self_test_ok_response() -> Vec<u8> {
    vec![0, 0, gas_crc8([0, 0])]
}

pub fn gas_conditioning_response() -> Vec<u8> {
    gas_word_with_crc(0x8000).to_vec()
}

pub fn gas_measure_raw_response(voc_raw: u16, nox_raw: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(6);
    buf.extend_from_slice(&gas_word_with_crc(voc_raw));
    buf.extend_from_slice(&gas_word_with_crc(nox_raw));
    buf
}

pub fn pressure_raw_response(raw: u32) -> Vec<u8> {
    vec![
        ((raw >> 12) & 0xFF) as u8,
        ((raw >> 4) & 0xFF) as u8,
        ((raw << 4) & 0xF0) as u8,
    ]
}
