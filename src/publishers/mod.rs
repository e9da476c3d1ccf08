//! Snapshot publishers (C8) — build the `state`/`metrics`/`health`/`power`
//! JSON payloads from a snapshot copy, per §4.7/§6.
//!
//! Builders always take an owned [`IaqData`] copy (never the live lock) and
//! never fail: missing values become JSON `null`, never `NaN`, matching §7's
//! "JSON builders never fail on missing data" propagation policy.

use serde_json::{json, Value};

use crate::coordinator::SensorRuntimeView;
use crate::sensors::SensorId;
use crate::snapshot::IaqData;

fn round(value: Option<f32>, decimals: i32) -> Option<f64> {
    value.map(|v| {
        let factor = 10f64.powi(decimals);
        (f64::from(v) * factor).round() / factor
    })
}

fn opt_json(value: Option<f64>) -> Value {
    value.map_or(Value::Null, |v| json!(v))
}

/// `state` payload — compensated sensor values plus a `last` sub-object.
pub fn build_state(data: &IaqData) -> Value {
    let f = &data.fused;
    let v = &data.valid;
    json!({
        "temp_c": opt_json(round(v.temp.then_some(f.temp_c).flatten(), 2)),
        "rh_pct": opt_json(round(v.humidity.then_some(f.humidity_rh).flatten(), 2)),
        "pressure_hpa": opt_json(round(v.pressure.then_some(f.pressure_hpa.map(|p| p / 100.0)).flatten(), 2)),
        "pm1_ugm3": opt_json(round(v.pm1.then_some(f.pm1).flatten(), 1)),
        "pm25_ugm3": opt_json(round(v.pm2_5.then_some(f.pm2_5).flatten(), 1)),
        "pm10_ugm3": opt_json(round(v.pm10.then_some(f.pm10).flatten(), 1)),
        "co2_ppm": v.co2.then_some(f.co2_ppm).flatten().map(|c| c.round() as i64),
        "voc_index": v.voc.then_some(f.voc_index).flatten(),
        "nox_index": v.nox.then_some(f.nox_index).flatten(),
        "mcu_temp_c": opt_json(round(v.mcu_temp.then_some(f.mcu_temp_c).flatten(), 2)),
        "aqi": data.metrics.aqi_value,
        "comfort_score": data.metrics.comfort_score,
        "last": {
            "pm_updated_at_us": positive_or_null(data.updated_at.pm_us),
            "co2_updated_at_us": positive_or_null(data.updated_at.co2_us),
            "gas_updated_at_us": positive_or_null(data.updated_at.gas_us),
            "pressure_updated_at_us": positive_or_null(data.updated_at.pressure_us),
            "mcu_temp_updated_at_us": positive_or_null(data.updated_at.mcu_temp_us),
            "temp_c": opt_json(round(has(data.updated_at.pm_us).then_some(f.temp_c).flatten(), 2)),
            "rh_pct": opt_json(round(has(data.updated_at.pm_us).then_some(f.humidity_rh).flatten(), 2)),
            "pressure_hpa": opt_json(round(
                has(data.updated_at.pressure_us).then_some(f.pressure_hpa.map(|p| p / 100.0)).flatten(),
                2,
            )),
            "pm1_ugm3": opt_json(round(has(data.updated_at.pm_us).then_some(f.pm1).flatten(), 1)),
            "pm25_ugm3": opt_json(round(has(data.updated_at.pm_us).then_some(f.pm2_5).flatten(), 1)),
            "pm10_ugm3": opt_json(round(has(data.updated_at.pm_us).then_some(f.pm10).flatten(), 1)),
            "co2_ppm": has(data.updated_at.co2_us).then_some(f.co2_ppm).flatten().map(|c| c.round() as i64),
            "voc_index": has(data.updated_at.gas_us).then_some(f.voc_index).flatten(),
            "nox_index": has(data.updated_at.gas_us).then_some(f.nox_index).flatten(),
            "mcu_temp_c": opt_json(round(has(data.updated_at.mcu_temp_us).then_some(f.mcu_temp_c).flatten(), 2)),
        },
    })
}

const fn has(updated_at_us: u64) -> bool {
    updated_at_us > 0
}

fn positive_or_null(us: u64) -> Value {
    if us > 0 {
        json!(us)
    } else {
        Value::Null
    }
}

/// `metrics` payload — nested sub-objects plus flat score fields.
pub fn build_metrics(data: &IaqData) -> Value {
    let m = &data.metrics;
    json!({
        "aqi": {
            "value": m.aqi_value,
            "category": m.aqi_category.to_string(),
            "dominant": m.aqi_dominant.to_string(),
            "pm25_subindex": m.aqi_pm25_subindex,
            "pm10_subindex": m.aqi_pm10_subindex,
        },
        "comfort": {
            "score": m.comfort_score,
            "category": m.comfort_category.to_string(),
            "dew_point_c": opt_json(round(m.dew_point_c, 1)),
            "abs_humidity_gm3": opt_json(round(m.abs_humidity_gm3, 1)),
            "heat_index_c": opt_json(round(m.heat_index_c, 1)),
        },
        "pressure": {
            "trend": m.pressure_trend.to_string(),
            "delta_hpa": opt_json(round(m.pressure_delta_hpa, 1)),
            "window_hours": m.pressure_window_hours,
        },
        "co2_score": m.co2_score,
        "voc_category": m.voc_category.to_string(),
        "nox_category": m.nox_category.to_string(),
        "overall_iaq_score": m.overall_iaq_score,
        "mold_risk": {
            "score": m.mold_risk_score,
            "category": m.mold_risk_category.to_string(),
        },
        "co2_rate_ppm_hr": opt_json(round(m.co2_rate_ppm_hr, 1)),
        "pm25_spike_detected": m.pm25_spike_detected,
        "last": {
            "co2_rate_updated_at_us": positive_or_null(data.updated_at.co2_us),
            "co2_rate_ppm_hr": opt_json(round(has(data.updated_at.co2_us).then_some(m.co2_rate_ppm_hr).flatten(), 1)),
        },
    })
}

/// `health` payload — uptime, heap, time-sync, and per-sensor status.
pub fn build_health(data: &IaqData, runtime: &[SensorRuntimeView], now_us: u64, epoch_s: Option<u64>) -> Value {
    let sensors: serde_json::Map<String, Value> = runtime
        .iter()
        .map(|r| {
            let age_us = now_us.saturating_sub(data.updated_at.get(r.id));
            let has_prior_reading = data.updated_at.get(r.id) > 0;
            let stale_threshold_us =
                (2.5 * r.cadence_ms as f64 * 1000.0).max(10_000_000.0) as u64;
            let stale = has_prior_reading && age_us > stale_threshold_us;
            let warmup_remaining_s = r.warmup_deadline_us.and_then(|deadline| {
                (deadline > now_us).then(|| (deadline - now_us) as f64 / 1_000_000.0)
            });
            (
                id_key(r.id).to_string(),
                json!({
                    "state": r.state_name,
                    "errors": r.error_count,
                    "last_read_s": has_prior_reading.then(|| data.updated_at.get(r.id) as f64 / 1_000_000.0),
                    "warmup_remaining_s": warmup_remaining_s,
                    "stale": stale,
                }),
            )
        })
        .collect();

    json!({
        "uptime": data.system.uptime_s,
        "wifi_rssi": data.system.wifi_rssi,
        "internal_free": data.system.free_internal_ram,
        "internal_total": Value::Null,
        "spiram_free": data.system.free_spiram,
        "spiram_total": Value::Null,
        "time_synced": epoch_s.is_some(),
        "epoch": epoch_s,
        "sensors": sensors,
    })
}

/// `power` payload — absent component publishes all-null fields.
pub fn build_power(data: &IaqData) -> Value {
    match &data.power {
        Some(p) => json!({
            "battery_pct": p.battery_pct,
            "charging": p.charging,
            "supply_voltage_v": p.supply_voltage_v,
        }),
        None => json!({
            "battery_pct": Value::Null,
            "charging": Value::Null,
            "supply_voltage_v": Value::Null,
        }),
    }
}

const fn id_key(id: SensorId) -> &'static str {
    id.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_payload_emits_null_for_missing_values() {
        let data = IaqData::default();
        let value = build_state(&data);
        assert_eq!(value["temp_c"], Value::Null);
        assert_eq!(value["co2_ppm"], Value::Null);
    }

    #[test]
    fn power_payload_all_null_when_absent() {
        let data = IaqData::default();
        let value = build_power(&data);
        assert_eq!(value["battery_pct"], Value::Null);
        assert_eq!(value["charging"], Value::Null);
    }

    #[test]
    fn state_payload_rounds_temp_to_two_decimals() {
        let mut data = IaqData::default();
        data.fused.temp_c = Some(21.23456);
        data.valid.temp = true;
        let value = build_state(&data);
        assert_eq!(value["temp_c"], json!(21.23));
    }
}
