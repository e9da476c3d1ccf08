//! Sensor drivers — one module per physical chip, each implementing
//! [`SensorDriver`] over the bus traits in [`crate::bus`].
//!
//! The coordinator ([`crate::coordinator`]) owns one driver instance per
//! [`SensorId`] and drives it through its lifecycle; drivers themselves hold
//! no FSM state beyond what the underlying chip requires (e.g. the gas
//! sensor's conditioning countdown).

pub mod co2;
pub mod gas;
pub mod mcu_temp;
pub mod pm;
pub mod pressure;

use crate::error::SensorError;

/// Identifies one of the five physical sensors named in §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorId {
    Pm,
    Co2,
    Gas,
    Pressure,
    McuTemp,
}

impl SensorId {
    pub const ALL: [SensorId; 5] = [
        SensorId::Pm,
        SensorId::Co2,
        SensorId::Gas,
        SensorId::Pressure,
        SensorId::McuTemp,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pm => "pm",
            Self::Co2 => "co2",
            Self::Gas => "gas",
            Self::Pressure => "pressure",
            Self::McuTemp => "mcu_temp",
        }
    }
}

/// One raw reading from a sensor driver, tagged by which chip produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorOutput {
    Pm {
        pm1_0: f32,
        pm2_5: f32,
        pm10: f32,
        temp_c: f32,
        humidity_rh: f32,
    },
    Co2 {
        co2_ppm: f32,
    },
    Gas {
        voc_index: u16,
        nox_index: u16,
    },
    Pressure {
        pressure_hpa: f32,
    },
    McuTemp {
        mcu_temp_c: f32,
    },
}

/// Capability set every sensor driver implements (§4.2).
///
/// `conditioning_tick` and `is_reporting_ready` default to no-op / always
/// ready; only the gas sensor overrides them, matching its multi-second
/// warm conditioning sequence before readings are trustworthy.
pub trait SensorDriver {
    fn id(&self) -> SensorId;
    fn init(&mut self) -> Result<(), SensorError>;
    fn deinit(&mut self) -> Result<(), SensorError>;
    fn read(&mut self) -> Result<SensorOutput, SensorError>;
    fn reset(&mut self) -> Result<(), SensorError>;
    fn enable(&mut self) -> Result<(), SensorError>;
    fn disable(&mut self) -> Result<(), SensorError>;

    /// Advance any chip-internal conditioning/compensation state that needs
    /// periodic ticks independent of `read()`. Default: no-op.
    fn conditioning_tick(&mut self, _ambient_temp_c: f32, _ambient_rh_pct: f32) {}

    /// Whether `read()` currently returns trustworthy data. Default: true.
    fn is_reporting_ready(&self) -> bool {
        true
    }
}
