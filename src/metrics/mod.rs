//! Metrics stage (C5) — derives scalars and categories from fused values,
//! per §4.4.
//!
//! `MetricsStage` owns the three sampling rings (pressure-trend, CO2-rate,
//! PM-spike) and exposes a single `tick` entry point, grounded in the
//! teacher's `SafetySupervisor::evaluate` texture: a calculator struct that
//! reads context and writes fields, generalised here from a fault bitmask to
//! a `Metrics` struct.

mod rings;

use std::fmt;

use crate::config::Config;
use crate::snapshot::{ChannelValues, Valid};
use rings::{CadencedRing, RegressionSample};

// ---------------------------------------------------------------------------
// Categorical enums — internal tagged variants, display strings at the edge.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
    #[default]
    Unknown,
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very Unhealthy",
            Self::Hazardous => "Hazardous",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AqiDominant {
    Pm25,
    Pm10,
    #[default]
    None,
}

impl fmt::Display for AqiDominant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pm25 => "pm25",
            Self::Pm10 => "pm10",
            Self::None => "none",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComfortCategory {
    Comfortable,
    Acceptable,
    Uncomfortable,
    Poor,
    VeryPoor,
    #[default]
    Unknown,
}

impl fmt::Display for ComfortCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Comfortable => "Comfortable",
            Self::Acceptable => "Acceptable",
            Self::Uncomfortable => "Uncomfortable",
            Self::Poor => "Poor",
            Self::VeryPoor => "Very Poor",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PressureTrend {
    Rising,
    Stable,
    Falling,
    #[default]
    Unknown,
}

impl fmt::Display for PressureTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rising => "rising",
            Self::Stable => "stable",
            Self::Falling => "falling",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GasCategory {
    Excellent,
    Good,
    Moderate,
    Poor,
    VeryPoor,
    Severe,
    #[default]
    Unknown,
}

impl fmt::Display for GasCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::Poor => "Poor",
            Self::VeryPoor => "Very Poor",
            Self::Severe => "Severe",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl GasCategory {
    fn from_index(index: Option<u16>) -> Self {
        match index {
            None => Self::Unknown,
            Some(i) if i <= 100 => Self::Excellent,
            Some(i) if i <= 150 => Self::Good,
            Some(i) if i <= 200 => Self::Moderate,
            Some(i) if i <= 300 => Self::Poor,
            Some(i) if i <= 400 => Self::VeryPoor,
            Some(_) => Self::Severe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoldRiskCategory {
    Low,
    Moderate,
    High,
    Severe,
    #[default]
    Unknown,
}

impl fmt::Display for MoldRiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
            Self::Severe => "Severe",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Metrics struct (§3.1)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub aqi_value: Option<u16>,
    pub aqi_category: AqiCategory,
    pub aqi_dominant: AqiDominant,
    pub aqi_pm25_subindex: Option<u16>,
    pub aqi_pm10_subindex: Option<u16>,

    pub comfort_score: Option<u8>,
    pub comfort_category: ComfortCategory,
    pub dew_point_c: Option<f32>,
    pub abs_humidity_gm3: Option<f32>,
    pub heat_index_c: Option<f32>,

    pub pressure_trend: PressureTrend,
    pub pressure_delta_hpa: Option<f32>,
    pub pressure_window_hours: Option<f32>,

    pub co2_score: Option<u8>,
    pub voc_category: GasCategory,
    pub nox_category: GasCategory,
    pub overall_iaq_score: Option<u8>,

    pub mold_risk_score: Option<u8>,
    pub mold_risk_category: MoldRiskCategory,

    pub co2_rate_ppm_hr: Option<f32>,
    pub pm25_spike_detected: Option<bool>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            aqi_value: None,
            aqi_category: AqiCategory::Unknown,
            aqi_dominant: AqiDominant::None,
            aqi_pm25_subindex: None,
            aqi_pm10_subindex: None,
            comfort_score: None,
            comfort_category: ComfortCategory::Unknown,
            dew_point_c: None,
            abs_humidity_gm3: None,
            heat_index_c: None,
            pressure_trend: PressureTrend::Unknown,
            pressure_delta_hpa: None,
            pressure_window_hours: None,
            co2_score: None,
            voc_category: GasCategory::Unknown,
            nox_category: GasCategory::Unknown,
            overall_iaq_score: None,
            mold_risk_score: None,
            mold_risk_category: MoldRiskCategory::Unknown,
            co2_rate_ppm_hr: None,
            pm25_spike_detected: None,
        }
    }
}

// ---------------------------------------------------------------------------
// EPA AQI breakpoint tables
// ---------------------------------------------------------------------------

/// `(bp_lo, bp_hi, aqi_lo, aqi_hi)` per segment.
const PM25_BREAKPOINTS: [(f32, f32, u16, u16); 6] = [
    (0.0, 12.0, 0, 50),
    (12.1, 35.4, 51, 100),
    (35.5, 55.4, 101, 150),
    (55.5, 150.4, 151, 200),
    (150.5, 250.4, 201, 300),
    (250.5, 500.4, 301, 500),
];

const PM10_BREAKPOINTS: [(f32, f32, u16, u16); 6] = [
    (0.0, 54.0, 0, 50),
    (55.0, 154.0, 51, 100),
    (155.0, 254.0, 101, 150),
    (255.0, 354.0, 151, 200),
    (355.0, 424.0, 201, 300),
    (425.0, 604.0, 301, 500),
];

fn aqi_subindex(value: f32, table: &[(f32, f32, u16, u16); 6]) -> u16 {
    if value <= 0.0 {
        return 0;
    }
    for &(bp_lo, bp_hi, aqi_lo, aqi_hi) in table {
        if value <= bp_hi {
            let frac = (value - bp_lo) / (bp_hi - bp_lo);
            let aqi = f32::from(aqi_lo) + frac * f32::from(aqi_hi - aqi_lo);
            return aqi.round().clamp(0.0, 500.0) as u16;
        }
    }
    500
}

fn aqi_category_for(value: u16) -> AqiCategory {
    match value {
        0..=50 => AqiCategory::Good,
        51..=100 => AqiCategory::Moderate,
        101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
        151..=200 => AqiCategory::Unhealthy,
        201..=300 => AqiCategory::VeryUnhealthy,
        _ => AqiCategory::Hazardous,
    }
}

// ---------------------------------------------------------------------------
// MetricsStage
// ---------------------------------------------------------------------------

const PRESSURE_SAMPLE_INTERVAL_US: u64 = 150_000_000;
const PRESSURE_RING_CAPACITY: usize = (6 * 3600) / 150;
const CO2_SAMPLE_INTERVAL_US: u64 = 60_000_000;
const CO2_RING_CAPACITY: usize = 180;
const PM_SAMPLE_INTERVAL_US: u64 = 30_000_000;
const PM_RING_CAPACITY: usize = 120;

pub struct MetricsStage {
    pressure_ring: CadencedRing<PRESSURE_RING_CAPACITY>,
    co2_ring: CadencedRing<CO2_RING_CAPACITY>,
    pm_ring: CadencedRing<PM_RING_CAPACITY>,
}

impl MetricsStage {
    pub fn new() -> Self {
        Self {
            pressure_ring: CadencedRing::new(PRESSURE_SAMPLE_INTERVAL_US),
            co2_ring: CadencedRing::new(CO2_SAMPLE_INTERVAL_US),
            pm_ring: CadencedRing::new(PM_SAMPLE_INTERVAL_US),
        }
    }

    /// Read fused values, write the `Metrics` fields. Never fails; absent
    /// prerequisites leave the corresponding output at its sentinel/`None`.
    pub fn tick(
        &mut self,
        now_us: u64,
        fused: &ChannelValues,
        valid: &Valid,
        config: &Config,
    ) -> Metrics {
        let mut m = Metrics::default();

        self.compute_aqi(fused, valid, &mut m);
        self.compute_comfort_and_derived(fused, valid, config, &mut m);
        self.compute_co2_score(fused, valid, &mut m);
        m.voc_category =
            GasCategory::from_index(valid.voc.then_some(fused.voc_index).flatten());
        m.nox_category =
            GasCategory::from_index(valid.nox.then_some(fused.nox_index).flatten());
        self.compute_overall_iaq(&mut m);
        self.compute_mold_risk(fused, valid, config, &mut m);
        self.compute_pressure_trend(now_us, fused, valid, config, &mut m);
        self.compute_co2_rate(now_us, fused, valid, config, &mut m);
        self.compute_pm_spike(now_us, fused, valid, config, &mut m);

        m
    }

    fn compute_aqi(&self, fused: &ChannelValues, valid: &Valid, m: &mut Metrics) {
        let pm25_sub = valid
            .pm2_5
            .then_some(fused.pm2_5)
            .flatten()
            .map(|v| aqi_subindex(v, &PM25_BREAKPOINTS));
        let pm10_sub = valid
            .pm10
            .then_some(fused.pm10)
            .flatten()
            .map(|v| aqi_subindex(v, &PM10_BREAKPOINTS));

        m.aqi_pm25_subindex = pm25_sub;
        m.aqi_pm10_subindex = pm10_sub;

        match (pm25_sub, pm10_sub) {
            (None, None) => {
                m.aqi_value = None;
                m.aqi_dominant = AqiDominant::None;
                m.aqi_category = AqiCategory::Unknown;
            }
            (pm25, pm10) => {
                let pm25_v = pm25.unwrap_or(0);
                let pm10_v = pm10.unwrap_or(0);
                let (value, dominant) = if pm25.is_none() {
                    (pm10_v, AqiDominant::Pm10)
                } else if pm10.is_none() {
                    (pm25_v, AqiDominant::Pm25)
                } else if pm25_v >= pm10_v {
                    (pm25_v, AqiDominant::Pm25)
                } else {
                    (pm10_v, AqiDominant::Pm10)
                };
                m.aqi_value = Some(value);
                m.aqi_dominant = dominant;
                m.aqi_category = aqi_category_for(value);
            }
        }
    }

    fn compute_comfort_and_derived(
        &self,
        fused: &ChannelValues,
        valid: &Valid,
        config: &Config,
        m: &mut Metrics,
    ) {
        let Some(t) = valid.temp.then_some(fused.temp_c).flatten() else {
            return;
        };
        let rh = valid.humidity.then_some(fused.humidity_rh).flatten();

        if let Some(rh) = rh {
            if rh > 0.0 {
                let alpha = (rh / 100.0).ln() + (17.62 * t) / (243.12 + t);
                m.dew_point_c = Some((243.12 * alpha) / (17.62 - alpha));
            }
            m.abs_humidity_gm3 = Some(
                (6.112 * ((17.67 * t) / (t + 243.5)).exp() * rh * 2.1674) / (100.0 * (t + 273.15)),
            );
        }

        let heat_index_c = if t < 27.0 {
            t
        } else if let Some(rh) = rh {
            rothfusz_heat_index_c(t, rh)
        } else {
            t
        };
        m.heat_index_c = Some(heat_index_c);

        let mut score = 100.0_f32;
        score -= 5.0 * (t - config.comfort_target_temp_c).abs();
        if let Some(rh) = rh {
            score -= 0.5 * (rh - config.comfort_target_rh_pct).abs();
        }
        if let Some(dp) = m.dew_point_c {
            if dp > 18.0 {
                score -= 10.0;
            }
        }
        if heat_index_c > 27.0 {
            score -= 3.0 * (heat_index_c - 27.0);
        }
        let score = score.clamp(0.0, 100.0).round() as u8;
        m.comfort_score = Some(score);
        m.comfort_category = match score {
            80..=100 => ComfortCategory::Comfortable,
            60..=79 => ComfortCategory::Acceptable,
            40..=59 => ComfortCategory::Uncomfortable,
            20..=39 => ComfortCategory::Poor,
            _ => ComfortCategory::VeryPoor,
        };
    }

    fn compute_co2_score(&self, fused: &ChannelValues, valid: &Valid, m: &mut Metrics) {
        let Some(co2) = valid.co2.then_some(fused.co2_ppm).flatten() else {
            return;
        };
        const POINTS: [(f32, f32); 6] = [
            (400.0, 100.0),
            (800.0, 80.0),
            (1000.0, 60.0),
            (1400.0, 30.0),
            (2000.0, 10.0),
            (2001.0, 0.0),
        ];
        let score = if co2 <= POINTS[0].0 {
            POINTS[0].1
        } else if co2 >= POINTS[5].0 {
            0.0
        } else {
            let mut result = 0.0;
            for w in POINTS.windows(2) {
                let (x0, y0) = w[0];
                let (x1, y1) = w[1];
                if co2 >= x0 && co2 <= x1 {
                    let frac = (co2 - x0) / (x1 - x0);
                    result = y0 + frac * (y1 - y0);
                    break;
                }
            }
            result
        };
        m.co2_score = Some(score.round().clamp(0.0, 100.0) as u8);
    }

    fn compute_overall_iaq(&self, m: &mut Metrics) {
        if let (Some(aqi), Some(co2_score), Some(comfort)) =
            (m.aqi_value, m.co2_score, m.comfort_score)
        {
            let score = 0.4 * (100.0 - f32::from(aqi) / 5.0)
                + 0.4 * f32::from(co2_score)
                + 0.2 * f32::from(comfort);
            m.overall_iaq_score = Some(score.round().clamp(0.0, 100.0) as u8);
        }
    }

    fn compute_mold_risk(
        &self,
        fused: &ChannelValues,
        valid: &Valid,
        config: &Config,
        m: &mut Metrics,
    ) {
        let (Some(t), Some(rh)) = (
            valid.temp.then_some(fused.temp_c).flatten(),
            valid.humidity.then_some(fused.humidity_rh).flatten(),
        ) else {
            return;
        };
        let Some(dew_point) = m.dew_point_c else {
            return;
        };

        let rh_contrib = (2.0 * (rh - 65.0)).max(0.0);
        let diff = t - config.mold_cold_surface_offset_c - dew_point;
        let dew_contrib = if diff <= 0.0 {
            50.0
        } else if diff >= 3.0 {
            0.0
        } else {
            50.0 * (1.0 - diff / 3.0)
        };
        let score = (rh_contrib + dew_contrib).clamp(0.0, 100.0).round() as u8;
        m.mold_risk_score = Some(score);
        m.mold_risk_category = match score {
            0..=24 => MoldRiskCategory::Low,
            25..=49 => MoldRiskCategory::Moderate,
            50..=74 => MoldRiskCategory::High,
            _ => MoldRiskCategory::Severe,
        };
    }

    fn compute_pressure_trend(
        &mut self,
        now_us: u64,
        fused: &ChannelValues,
        valid: &Valid,
        config: &Config,
        m: &mut Metrics,
    ) {
        let Some(p_pa) = valid.pressure.then_some(fused.pressure_hpa).flatten() else {
            return;
        };
        let p_hpa = p_pa / 100.0;
        self.pressure_ring.maybe_sample(now_us, p_hpa);

        let Some((oldest, latest, span_s)) = self.pressure_ring.oldest_latest_span() else {
            return;
        };
        if span_s < 3600.0 {
            return;
        }
        let span_hours = span_s / 3600.0;
        let raw_delta = latest - oldest;
        let normalized = raw_delta * (config.pressure_trend_window_hours / span_hours);

        m.pressure_delta_hpa = Some(normalized);
        m.pressure_window_hours = Some(config.pressure_trend_window_hours);
        m.pressure_trend = if normalized > config.pressure_trend_threshold_hpa {
            PressureTrend::Rising
        } else if normalized < -config.pressure_trend_threshold_hpa {
            PressureTrend::Falling
        } else {
            PressureTrend::Stable
        };
    }

    fn compute_co2_rate(
        &mut self,
        now_us: u64,
        fused: &ChannelValues,
        valid: &Valid,
        config: &Config,
        m: &mut Metrics,
    ) {
        let Some(co2) = valid.co2.then_some(fused.co2_ppm).flatten() else {
            return;
        };
        self.co2_ring.maybe_sample(now_us, co2);

        let window_s = f64::from(config.co2_rate_window_minutes) * 60.0;
        let Some((oldest, latest, span_s)) = self.co2_ring.oldest_latest_span_within(window_s)
        else {
            return;
        };
        if span_s <= 0.0 {
            return;
        }
        let hours = span_s / 3600.0;
        m.co2_rate_ppm_hr = Some((latest - oldest) / hours);
    }

    fn compute_pm_spike(
        &mut self,
        now_us: u64,
        fused: &ChannelValues,
        valid: &Valid,
        config: &Config,
        m: &mut Metrics,
    ) {
        let Some(pm25) = valid.pm2_5.then_some(fused.pm2_5).flatten() else {
            return;
        };

        // Baseline must come from samples strictly before this one, or a
        // spike dilutes its own comparison point.
        let window_s = f64::from(config.pm_spike_baseline_window_minutes) * 60.0;
        let baseline = self.pm_ring.mean_within(window_s);
        self.pm_ring.maybe_sample(now_us, pm25);

        let Some(baseline) = baseline else {
            return;
        };
        m.pm25_spike_detected = Some(pm25 - baseline >= config.pm_spike_threshold_ugm3);
    }
}

impl Default for MetricsStage {
    fn default() -> Self {
        Self::new()
    }
}

/// Rothfusz regression, computed in Fahrenheit per the NWS formula, returned
/// in Celsius.
fn rothfusz_heat_index_c(temp_c: f32, rh_pct: f32) -> f32 {
    let t = temp_c * 9.0 / 5.0 + 32.0;
    let r = rh_pct;
    let hi_f = -42.379 + 2.04901523 * t + 10.14333127 * r - 0.22475541 * t * r
        - 0.00683783 * t * t
        - 0.05481717 * r * r
        + 0.00122874 * t * t * r
        + 0.00085282 * t * r * r
        - 0.00000199 * t * t * r * r;
    (hi_f - 32.0) * 5.0 / 9.0
}
