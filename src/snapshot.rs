//! The shared snapshot (C3) — a single process-wide structure mutated only
//! while its write lock is held, per §3.1/§4.1.
//!
//! Grounded in the teacher's `FsmContext`, owned as a single field by
//! `AppService` and accessed only through method calls, never as a raw guard
//! crossing a suspension point. Here that becomes `std::sync::Mutex<IaqData>`
//! behind [`SharedSnapshot::with_lock`]/[`SharedSnapshot::read`].

use std::sync::{Mutex, MutexGuard};

use crate::metrics::Metrics;
use crate::sensors::SensorId;

/// Per-channel raw/fused values. `None` until the first successful read of
/// that channel since boot; a stale-but-present value stays `Some` even
/// after `valid` is cleared by the coordinator's stale-threshold logic.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelValues {
    pub temp_c: Option<f32>,
    pub humidity_rh: Option<f32>,
    pub pressure_hpa: Option<f32>,
    pub mcu_temp_c: Option<f32>,
    pub pm1: Option<f32>,
    pub pm2_5: Option<f32>,
    pub pm10: Option<f32>,
    pub co2_ppm: Option<f32>,
    pub voc_index: Option<u16>,
    pub nox_index: Option<u16>,
}

/// Per-channel freshness flags (§3.1 `valid`). `true` only while the
/// channel's most recent accepted read is within the stale threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Valid {
    pub temp: bool,
    pub humidity: bool,
    pub pressure: bool,
    pub mcu_temp: bool,
    pub pm1: bool,
    pub pm2_5: bool,
    pub pm10: bool,
    pub co2: bool,
    pub voc: bool,
    pub nox: bool,
}

/// Monotonic microsecond timestamp of the most recent successful read, one
/// per physical sensor (not per channel — the PM sensor updates pm1/pm2_5/
/// pm10/temp/humidity together).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdatedAt {
    pub pm_us: u64,
    pub co2_us: u64,
    pub gas_us: u64,
    pub pressure_us: u64,
    pub mcu_temp_us: u64,
}

impl UpdatedAt {
    pub const fn get(&self, id: SensorId) -> u64 {
        match id {
            SensorId::Pm => self.pm_us,
            SensorId::Co2 => self.co2_us,
            SensorId::Gas => self.gas_us,
            SensorId::Pressure => self.pressure_us,
            SensorId::McuTemp => self.mcu_temp_us,
        }
    }

    pub fn set(&mut self, id: SensorId, value: u64) {
        match id {
            SensorId::Pm => self.pm_us = value,
            SensorId::Co2 => self.co2_us = value,
            SensorId::Gas => self.gas_us = value,
            SensorId::Pressure => self.pressure_us = value,
            SensorId::McuTemp => self.mcu_temp_us = value,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemInfo {
    pub uptime_s: u64,
    pub free_internal_ram: u32,
    pub free_spiram: u32,
    pub wifi_rssi: Option<i8>,
    pub wifi_connected: bool,
    pub mqtt_connected: bool,
}

/// Supplied by an external power component; absent when none is attached.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerSnapshot {
    pub battery_pct: Option<f32>,
    pub charging: Option<bool>,
    pub supply_voltage_v: Option<f32>,
}

/// Per-PM-channel RH-correction quality score (0-100), kept for symmetry
/// even though only `pm2_5` is exposed through the publisher contract (§4.3
/// AMBIENT note).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PmQuality {
    pub pm1: Option<u8>,
    pub pm2_5: Option<u8>,
    pub pm10: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IaqData {
    pub raw: ChannelValues,
    pub fused: ChannelValues,
    pub valid: Valid,
    pub pm_quality: PmQuality,
    pub metrics: Metrics,
    pub updated_at: UpdatedAt,
    pub system: SystemInfo,
    pub power: Option<PowerSnapshot>,
}

/// The snapshot behind a plain mutex. Hold-times must stay in the
/// low-hundreds-of-microseconds range — no bus I/O, no JSON construction,
/// while the lock is held (§4.1).
pub struct SharedSnapshot {
    inner: Mutex<IaqData>,
}

impl SharedSnapshot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(IaqData::default()),
        }
    }

    /// Acquire the lock, call `f`, release on every exit path including a
    /// panic unwind through `f`. Callers must never call `with_lock` again
    /// from inside `f` — the mutex is not reentrant.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut IaqData) -> R) -> R {
        let mut guard: MutexGuard<'_, IaqData> =
            self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    /// Return a stable owned copy. Callers hold no lock while using it.
    pub fn read(&self) -> IaqData {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Default for SharedSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_lock_mutates_and_read_observes() {
        let snap = SharedSnapshot::new();
        snap.with_lock(|s| {
            s.raw.temp_c = Some(21.5);
            s.valid.temp = true;
        });
        let copy = snap.read();
        assert_eq!(copy.raw.temp_c, Some(21.5));
        assert!(copy.valid.temp);
    }

    #[test]
    fn updated_at_get_set_roundtrip() {
        let mut ts = UpdatedAt::default();
        ts.set(SensorId::Co2, 42);
        assert_eq!(ts.get(SensorId::Co2), 42);
        assert_eq!(ts.get(SensorId::Pm), 0);
    }
}
