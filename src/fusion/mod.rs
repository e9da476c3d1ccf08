//! Fusion stage (C4) — compensates raw channels into `fused`, per §4.3.
//!
//! Runs under the same write-lock as the read that triggered it. Never
//! fails outward: a missing/invalid input simply leaves the corresponding
//! `fused` field untouched, per §9's "fusion and metrics never fail" note.

use crate::error::FusionError;
use crate::snapshot::{IaqData, PmQuality};

const P_REF_PA: f32 = 101_325.0;
const CO2_PRESSURE_MIN_PA: f32 = 95_000.0;
const CO2_PRESSURE_MAX_PA: f32 = 106_000.0;
const ABC_RING_LEN: usize = 7;
const ABC_TARGET_PPM: f32 = 400.0;
const ABC_MIN_PLAUSIBLE_PPM: f32 = 300.0;
const ABC_MAX_PLAUSIBLE_PPM: f32 = 2_000.0;
const ABC_CONFIDENCE_THRESHOLD_PCT: f32 = 70.0;

/// Runtime-settable PM-RH and self-heat coefficients (§4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionCoefficients {
    pm_rh_a: f32,
    pm_rh_b: f32,
    temp_offset_c: f32,
}

impl FusionCoefficients {
    pub fn new(pm_rh_a: f32, pm_rh_b: f32, temp_offset_c: f32) -> Result<Self, FusionError> {
        let mut c = Self {
            pm_rh_a: 0.0,
            pm_rh_b: 1.0,
            temp_offset_c: 0.0,
        };
        c.set_pm_rh_a(pm_rh_a)?;
        c.set_pm_rh_b(pm_rh_b)?;
        c.set_temp_offset_c(temp_offset_c)?;
        Ok(c)
    }

    pub const fn pm_rh_a(&self) -> f32 {
        self.pm_rh_a
    }
    pub const fn pm_rh_b(&self) -> f32 {
        self.pm_rh_b
    }
    pub const fn temp_offset_c(&self) -> f32 {
        self.temp_offset_c
    }

    pub fn set_pm_rh_a(&mut self, value: f32) -> Result<(), FusionError> {
        if !(0.0..=2.0).contains(&value) {
            return Err(FusionError::InvalidArg("pm_rh_a"));
        }
        self.pm_rh_a = value;
        Ok(())
    }

    pub fn set_pm_rh_b(&mut self, value: f32) -> Result<(), FusionError> {
        if !(1.0..=10.0).contains(&value) {
            return Err(FusionError::InvalidArg("pm_rh_b"));
        }
        self.pm_rh_b = value;
        Ok(())
    }

    pub fn set_temp_offset_c(&mut self, value: f32) -> Result<(), FusionError> {
        if value.abs() > 10.0 {
            return Err(FusionError::InvalidArg("temp_offset_c"));
        }
        self.temp_offset_c = value;
        Ok(())
    }
}

impl Default for FusionCoefficients {
    fn default() -> Self {
        Self {
            pm_rh_a: 0.25,
            pm_rh_b: 1.30,
            temp_offset_c: 0.0,
        }
    }
}

/// Persisted CO2 automatic-baseline-correction state (§4.3 step 6).
#[derive(Debug, Clone, PartialEq)]
pub struct AbcState {
    ring: heapless::Deque<f32, ABC_RING_LEN>,
    daily_min_ppm: Option<f32>,
    in_night_window: bool,
    pub baseline_ppm: f32,
    pub confidence_pct: f32,
}

impl Default for AbcState {
    fn default() -> Self {
        Self {
            ring: heapless::Deque::new(),
            daily_min_ppm: None,
            in_night_window: false,
            baseline_ppm: ABC_TARGET_PPM,
            confidence_pct: 0.0,
        }
    }
}

impl AbcState {
    /// Feed one CO2 sample plus the current hour-of-day; call once per CO2
    /// reading. `night_start`/`night_end` are hour-of-day bounds, end
    /// exclusive, possibly wrapping past midnight.
    fn observe(&mut self, co2_ppm: f32, hour: u8, night_start: u8, night_end: u8) {
        let in_window = if night_start <= night_end {
            hour >= night_start && hour < night_end
        } else {
            hour >= night_start || hour < night_end
        };

        if in_window {
            self.daily_min_ppm = Some(match self.daily_min_ppm {
                Some(m) => m.min(co2_ppm),
                None => co2_ppm,
            });
        } else if self.in_night_window {
            // Window just closed: commit the minimum if plausible.
            if let Some(min) = self.daily_min_ppm.take() {
                if min > ABC_MIN_PLAUSIBLE_PPM && min < ABC_MAX_PLAUSIBLE_PPM {
                    if self.ring.len() == ABC_RING_LEN {
                        self.ring.pop_front();
                    }
                    let _ = self.ring.push_back(min);
                    let sum: f32 = self.ring.iter().sum();
                    self.baseline_ppm = sum / self.ring.len() as f32;
                    self.confidence_pct = (self.ring.len() as f32 / ABC_RING_LEN as f32) * 100.0;
                }
            }
        }
        self.in_night_window = in_window;
    }
}

/// Fused output reached by running every step of §4.3 in order. Always
/// succeeds; missing inputs leave fields untouched on `data`.
pub fn apply(
    data: &mut IaqData,
    coeffs: &FusionCoefficients,
    abc: &mut AbcState,
    night_start_hour: u8,
    night_end_hour: u8,
    current_hour: u8,
) {
    // 1. Temperature self-heat.
    if data.valid.temp {
        if let Some(t) = data.raw.temp_c {
            data.fused.temp_c = Some(t - coeffs.temp_offset_c);
        }
    }

    // 2. Humidity passthrough.
    if data.valid.humidity {
        data.fused.humidity_rh = data.raw.humidity_rh;
    }

    // 3. Pressure passthrough (hPa -> Pa).
    if data.valid.pressure {
        if let Some(p) = data.raw.pressure_hpa {
            data.fused.pressure_hpa = Some(p * 100.0);
        }
    }

    // 4. PM RH correction, applied identically to each PM channel.
    let rh = data.valid.humidity.then_some(data.raw.humidity_rh).flatten();
    apply_pm_correction(
        &mut data.fused.pm1,
        &mut data.pm_quality.pm1,
        data.valid.pm1.then_some(data.raw.pm1).flatten(),
        rh,
        coeffs,
    );
    apply_pm_correction(
        &mut data.fused.pm2_5,
        &mut data.pm_quality.pm2_5,
        data.valid.pm2_5.then_some(data.raw.pm2_5).flatten(),
        rh,
        coeffs,
    );
    apply_pm_correction(
        &mut data.fused.pm10,
        &mut data.pm_quality.pm10,
        data.valid.pm10.then_some(data.raw.pm10).flatten(),
        rh,
        coeffs,
    );

    // 5. CO2 pressure compensation.
    if data.valid.co2 {
        if let Some(co2) = data.raw.co2_ppm {
            let compensated = match data.fused.pressure_hpa {
                Some(p_pa) if (CO2_PRESSURE_MIN_PA..=CO2_PRESSURE_MAX_PA).contains(&p_pa) => {
                    co2 * (P_REF_PA / p_pa)
                }
                _ => co2,
            };
            data.fused.co2_ppm = Some(compensated);
        }
    }

    // 6. CO2 ABC baseline. Fed the pressure-compensated value so barometric
    // swings don't get tracked into the long-term drift baseline.
    if let Some(co2) = data.valid.co2.then_some(data.fused.co2_ppm).flatten() {
        abc.observe(co2, current_hour, night_start_hour, night_end_hour);
        if abc.confidence_pct >= ABC_CONFIDENCE_THRESHOLD_PCT {
            if let Some(co2) = data.fused.co2_ppm {
                data.fused.co2_ppm = Some(co2 + (ABC_TARGET_PPM - abc.baseline_ppm));
            }
        }
    }

    // VOC/NOx indices pass through unmodified.
    data.fused.voc_index = data.raw.voc_index;
    data.fused.nox_index = data.raw.nox_index;
    if data.valid.mcu_temp {
        data.fused.mcu_temp_c = data.raw.mcu_temp_c;
    }
}

fn apply_pm_correction(
    fused: &mut Option<f32>,
    quality: &mut Option<u8>,
    raw_pm: Option<f32>,
    rh: Option<f32>,
    coeffs: &FusionCoefficients,
) {
    let Some(pm) = raw_pm else {
        return;
    };
    let Some(rh) = rh else {
        *fused = Some(pm);
        *quality = None;
        return;
    };

    if rh < 90.0 {
        let denom = 1.0 + coeffs.pm_rh_a * (rh / 100.0).powf(coeffs.pm_rh_b);
        *fused = Some(pm / denom);
        *quality = Some(pm_quality_score(rh));
    } else {
        *fused = Some(pm);
        *quality = Some(pm_quality_score(rh).min(20));
    }
}

/// Linear decay from 100 at RH <= 60% to 20 at RH >= 90%.
fn pm_quality_score(rh: f32) -> u8 {
    if rh <= 60.0 {
        100
    } else if rh >= 90.0 {
        20
    } else {
        (100.0 - (rh - 60.0) * (80.0 / 30.0)) as u8
    }
}
