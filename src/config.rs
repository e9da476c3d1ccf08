//! System configuration parameters.
//!
//! All tunable parameters for the IAQ pipeline. Values can be overridden via
//! the key/value persistence port; `Config::validate()` is the single gate
//! values pass through before being accepted, whether they arrive from
//! compiled-in defaults, storage, or a runtime setter.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-sensor u32 millisecond values, one field per [`crate::sensors::SensorId`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerSensorMs {
    pub pm: u32,
    pub co2: u32,
    pub gas: u32,
    pub pressure: u32,
    pub mcu_temp: u32,
}

impl PerSensorMs {
    pub const fn get(&self, id: crate::sensors::SensorId) -> u32 {
        use crate::sensors::SensorId;
        match id {
            SensorId::Pm => self.pm,
            SensorId::Co2 => self.co2,
            SensorId::Gas => self.gas,
            SensorId::Pressure => self.pressure,
            SensorId::McuTemp => self.mcu_temp,
        }
    }

    pub fn set(&mut self, id: crate::sensors::SensorId, value: u32) {
        use crate::sensors::SensorId;
        match id {
            SensorId::Pm => self.pm = value,
            SensorId::Co2 => self.co2 = value,
            SensorId::Gas => self.gas = value,
            SensorId::Pressure => self.pressure = value,
            SensorId::McuTemp => self.mcu_temp = value,
        }
    }
}

/// Boot-time log verbosity. Not persisted — set once from env/console at
/// startup, matching the teacher's `esp_idf_logger` initialisation style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Core pipeline configuration (§6 plus the ambient logging knob).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // --- Coordinator (§4.5, §6) ---
    /// Warm-up duration per sensor, milliseconds.
    pub warmup_ms: PerSensorMs,
    /// Reading cadence per sensor, milliseconds. `0` disables periodic reads.
    pub cadence_ms: PerSensorMs,
    /// Transient failures tolerated before a sensor moves READY -> ERROR.
    pub max_consecutive_failures: u8,
    /// Depth of the coordinator's bounded command queue.
    pub command_queue_depth: usize,

    // --- Fusion (§4.3) ---
    /// PM relative-humidity correction coefficient `a`, range [0, 2].
    pub pm_rh_a: f32,
    /// PM relative-humidity correction exponent `b`, range [1, 10].
    pub pm_rh_b: f32,
    /// MCU self-heating temperature offset, °C, |x| <= 10.
    pub temp_offset_c: f32,
    /// CO2 ABC night window start hour-of-day, [0, 24).
    pub abc_night_start_hour: u8,
    /// CO2 ABC night window end hour-of-day (exclusive), [0, 24].
    pub abc_night_end_hour: u8,

    // --- Metrics (§4.4) ---
    /// Comfort score target temperature, °C.
    pub comfort_target_temp_c: f32,
    /// Comfort score target relative humidity, %.
    pub comfort_target_rh_pct: f32,
    /// Pressure trend normalisation window, hours.
    pub pressure_trend_window_hours: f32,
    /// Pressure trend rising/falling threshold, hPa.
    pub pressure_trend_threshold_hpa: f32,
    /// CO2 rate-of-change regression window, minutes.
    pub co2_rate_window_minutes: u32,
    /// PM spike baseline window, minutes.
    pub pm_spike_baseline_window_minutes: u32,
    /// PM spike detection threshold, µg/m³.
    pub pm_spike_threshold_ugm3: f32,
    /// Mold risk cold-surface offset, °C.
    pub mold_cold_surface_offset_c: f32,

    // --- History (§3.3) ---
    /// Tier 1 bucket resolution, seconds.
    pub history_t1_resolution_s: u32,
    /// Tier 1 retention window, seconds.
    pub history_t1_window_s: u32,
    /// Tier 2 bucket resolution, seconds. Must be an integer multiple of T1.
    pub history_t2_resolution_s: u32,
    /// Tier 2 retention window, seconds.
    pub history_t2_window_s: u32,
    /// Tier 3 bucket resolution, seconds. Must be an integer multiple of T2.
    pub history_t3_resolution_s: u32,
    /// Tier 3 retention window, seconds.
    pub history_t3_window_s: u32,

    // --- Ambient ---
    /// Boot-time log verbosity (not persisted).
    #[serde(skip)]
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warmup_ms: PerSensorMs {
                mcu_temp: 0,
                pressure: 1_000,
                pm: 30_000,
                co2: 60_000,
                gas: 10_000,
            },
            cadence_ms: PerSensorMs {
                mcu_temp: 5_000,
                pressure: 5_000,
                pm: 2_000,
                co2: 5_000,
                gas: 1_000,
            },
            max_consecutive_failures: 3,
            command_queue_depth: 16,

            pm_rh_a: 0.25,
            pm_rh_b: 1.30,
            temp_offset_c: 0.0,
            abc_night_start_hour: 1,
            abc_night_end_hour: 6,

            comfort_target_temp_c: 22.0,
            comfort_target_rh_pct: 45.0,
            pressure_trend_window_hours: 3.0,
            pressure_trend_threshold_hpa: 1.0,
            co2_rate_window_minutes: 60,
            pm_spike_baseline_window_minutes: 10,
            pm_spike_threshold_ugm3: 10.0,
            mold_cold_surface_offset_c: 5.0,

            history_t1_resolution_s: 1,
            history_t1_window_s: 3_600,
            history_t2_resolution_s: 60,
            history_t2_window_s: 86_400,
            history_t3_resolution_s: 600,
            history_t3_window_s: 7 * 86_400,

            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Validate every range named in §4.3/§6 plus the tier-ratio invariant
    /// from §9's Design Notes. Rejects the whole config on the first
    /// violation; callers never get a partially-applied update.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.pm_rh_a) {
            return Err(ConfigError::OutOfRange("pm_rh_a"));
        }
        if !(1.0..=10.0).contains(&self.pm_rh_b) {
            return Err(ConfigError::OutOfRange("pm_rh_b"));
        }
        if self.temp_offset_c.abs() > 10.0 {
            return Err(ConfigError::OutOfRange("temp_offset_c"));
        }
        if self.abc_night_start_hour > 23 || self.abc_night_end_hour > 24 {
            return Err(ConfigError::OutOfRange("abc_night_window"));
        }
        if self.pressure_trend_window_hours <= 0.0 {
            return Err(ConfigError::OutOfRange("pressure_trend_window_hours"));
        }
        if self.co2_rate_window_minutes == 0 {
            return Err(ConfigError::OutOfRange("co2_rate_window_minutes"));
        }
        if self.pm_spike_baseline_window_minutes == 0 {
            return Err(ConfigError::OutOfRange("pm_spike_baseline_window_minutes"));
        }
        if self.command_queue_depth == 0 {
            return Err(ConfigError::OutOfRange("command_queue_depth"));
        }

        let t1 = self.history_t1_resolution_s;
        let t2 = self.history_t2_resolution_s;
        let t3 = self.history_t3_resolution_s;
        if t1 == 0 || t2 == 0 || t3 == 0 {
            return Err(ConfigError::OutOfRange("history_resolution"));
        }
        if t2 % t1 != 0 || t3 % t2 != 0 {
            return Err(ConfigError::InvalidTierRatio);
        }

        Ok(())
    }
}
