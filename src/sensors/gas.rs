//! SGP41-class VOC/NOx gas sensor, I2C-attached.
//!
//! Raw ticks are converted to 0-500 indices by the `gas-index-algorithm`
//! crate, which implements Sensirion's published index algorithm. The chip
//! needs a 10-second conditioning run (heater on, NOx not yet valid) before
//! its first real measurement — [`SensorDriver::conditioning_tick`] is
//! where the coordinator drives that countdown while other sensors warm up
//! in parallel.

use gas_index_algorithm::{NoxAlgorithm, VocAlgorithm};

use crate::bus::i2c::I2cBus;
use crate::error::SensorError;
use crate::sensors::{SensorDriver, SensorId, SensorOutput};

const I2C_ADDR: u8 = 0x59;
const CMD_SELF_TEST: [u8; 2] = [0x28, 0x0E];
const CMD_CONDITIONING: [u8; 2] = [0x26, 0x12];
const CMD_MEASURE_RAW: [u8; 2] = [0x26, 0x19];
const CMD_SOFT_RESET: [u8; 1] = [0x06];

const CONDITIONING_DURATION_MS: u32 = 10_000;
const CRC8_POLY: u8 = 0x31;
const CRC8_INIT: u8 = 0xFF;

fn crc8(bytes: [u8; 2]) -> u8 {
    let mut crc = CRC8_INIT;
    for &b in &bytes {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn rh_to_ticks(rh_pct: f32) -> u16 {
    ((rh_pct.clamp(0.0, 100.0)) * 65535.0 / 100.0) as u16
}

fn temp_to_ticks(temp_c: f32) -> u16 {
    ((temp_c.clamp(-45.0, 130.0) + 45.0) * 65535.0 / 175.0) as u16
}

fn word_with_crc(word: u16) -> [u8; 3] {
    let bytes = word.to_be_bytes();
    [bytes[0], bytes[1], crc8(bytes)]
}

pub struct GasSensor<I: I2cBus> {
    i2c: I,
    enabled: bool,
    conditioning_elapsed_ms: u32,
    conditioned: bool,
    ambient_temp_c: f32,
    ambient_rh_pct: f32,
    voc: VocAlgorithm,
    nox: NoxAlgorithm,
}

impl<I: I2cBus> GasSensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            i2c,
            enabled: true,
            conditioning_elapsed_ms: 0,
            conditioned: false,
            ambient_temp_c: 25.0,
            ambient_rh_pct: 50.0,
            voc: VocAlgorithm::new(),
            nox: NoxAlgorithm::new(),
        }
    }

    fn run_self_test(&mut self) -> Result<(), SensorError> {
        self.i2c
            .write(I2C_ADDR, &CMD_SELF_TEST)
            .map_err(|_| SensorError::Transient("self-test write"))?;
        let mut resp = [0u8; 3];
        self.i2c
            .read(I2C_ADDR, &mut resp)
            .map_err(|_| SensorError::Transient("self-test read"))?;
        if crc8([resp[0], resp[1]]) != resp[2] {
            return Err(SensorError::Transient("self-test crc"));
        }
        // 0x0000 = both VOC and NOx pixels passed.
        if resp[0] != 0 || resp[1] != 0 {
            return Err(SensorError::Fatal("self-test failed"));
        }
        Ok(())
    }

    fn measure_conditioning(&mut self, temp_c: f32, rh_pct: f32) -> Result<u16, SensorError> {
        let mut req = Vec::with_capacity(8);
        req.extend_from_slice(&CMD_CONDITIONING);
        req.extend_from_slice(&word_with_crc(rh_to_ticks(rh_pct)));
        req.extend_from_slice(&word_with_crc(temp_to_ticks(temp_c)));
        self.i2c
            .write(I2C_ADDR, &req)
            .map_err(|_| SensorError::Transient("conditioning write"))?;
        let mut resp = [0u8; 3];
        self.i2c
            .read(I2C_ADDR, &mut resp)
            .map_err(|_| SensorError::Transient("conditioning read"))?;
        if crc8([resp[0], resp[1]]) != resp[2] {
            return Err(SensorError::Transient("conditioning crc"));
        }
        Ok(u16::from_be_bytes([resp[0], resp[1]]))
    }

    fn measure_raw(&mut self, temp_c: f32, rh_pct: f32) -> Result<(u16, u16), SensorError> {
        let mut req = Vec::with_capacity(8);
        req.extend_from_slice(&CMD_MEASURE_RAW);
        req.extend_from_slice(&word_with_crc(rh_to_ticks(rh_pct)));
        req.extend_from_slice(&word_with_crc(temp_to_ticks(temp_c)));
        self.i2c
            .write(I2C_ADDR, &req)
            .map_err(|_| SensorError::Transient("measure write"))?;
        let mut resp = [0u8; 6];
        self.i2c
            .read(I2C_ADDR, &mut resp)
            .map_err(|_| SensorError::Transient("measure read"))?;
        if crc8([resp[0], resp[1]]) != resp[2] || crc8([resp[3], resp[4]]) != resp[5] {
            return Err(SensorError::Transient("measure crc"));
        }
        let voc_raw = u16::from_be_bytes([resp[0], resp[1]]);
        let nox_raw = u16::from_be_bytes([resp[3], resp[4]]);
        Ok((voc_raw, nox_raw))
    }
}

impl<I: I2cBus> SensorDriver for GasSensor<I> {
    fn id(&self) -> SensorId {
        SensorId::Gas
    }

    fn init(&mut self) -> Result<(), SensorError> {
        self.run_self_test()?;
        self.conditioning_elapsed_ms = 0;
        self.conditioned = false;
        self.voc = VocAlgorithm::new();
        self.nox = NoxAlgorithm::new();
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), SensorError> {
        self.i2c
            .write(I2C_ADDR, &CMD_SOFT_RESET)
            .map_err(|_| SensorError::Transient("soft reset"))
    }

    fn read(&mut self) -> Result<SensorOutput, SensorError> {
        if !self.enabled {
            return Err(SensorError::NotReady);
        }
        if !self.conditioned {
            return Err(SensorError::NotReady);
        }
        let (voc_raw, nox_raw) = self.measure_raw(self.ambient_temp_c, self.ambient_rh_pct)?;
        let voc_index = self.voc.process(i32::from(voc_raw)).clamp(0, 500) as u16;
        let nox_index = self.nox.process(i32::from(nox_raw)).clamp(0, 500) as u16;
        Ok(SensorOutput::Gas {
            voc_index,
            nox_index,
        })
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

    fn conditioning_tick(&mut self, ambient_temp_c: f32, ambient_rh_pct: f32) {
        // Stored regardless of conditioning state: `read()` keeps using the
        // latest ambient reading for continuous compensation for as long as
        // the sensor runs, not just during the one-time conditioning phase.
        self.ambient_temp_c = ambient_temp_c;
        self.ambient_rh_pct = ambient_rh_pct;
        if self.conditioned || !self.enabled {
            return;
        }
        // Called once per coordinator tick for this sensor; the conditioning
        // command itself takes ~50ms on the chip, so each call advances the
        // warm-up clock by one cadence period regardless of its length.
        if self
            .measure_conditioning(ambient_temp_c, ambient_rh_pct)
            .is_ok()
        {
            self.conditioning_elapsed_ms = self.conditioning_elapsed_ms.saturating_add(1_000);
            if self.conditioning_elapsed_ms >= CONDITIONING_DURATION_MS {
                self.conditioned = true;
            }
        }
    }

    fn is_reporting_ready(&self) -> bool {
        self.enabled && self.conditioned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc8_matches_known_vector() {
        // 0x00 0x00 -> CRC8(0x31, init 0xFF) = 0x81, a commonly cited
        // Sensirion test vector for this polynomial/init pair.
        assert_eq!(crc8([0x00, 0x00]), 0x81);
    }

    #[test]
    fn rh_and_temp_tick_conversion_bounds() {
        assert_eq!(rh_to_ticks(0.0), 0);
        assert_eq!(rh_to_ticks(100.0), 65535);
        assert_eq!(temp_to_ticks(-45.0), 0);
    }
}
