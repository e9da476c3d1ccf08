//! Sensor-to-history pipeline, exercised with the crate's real drivers
//! instead of the coordinator's own `StubDriver` test double — bus framing,
//! fusion, metrics, and history aggregation all run for real here.

use std::sync::Arc;

use iaqd::config::Config;
use iaqd::coordinator::Coordinator;
use iaqd::history::{HistoryMetric, HistoryStore, TierConfig};
use iaqd::metrics::{AqiCategory, AqiDominant};
use iaqd::persistence::NvsStorage;
use iaqd::sensors::co2::Co2Sensor;
use iaqd::sensors::gas::GasSensor;
use iaqd::sensors::mcu_temp::{fake::FixedMcuTemp, McuTempSensor};
use iaqd::sensors::pm::PmSensor;
use iaqd::sensors::pressure::PressureSensor;
use iaqd::sensors::{SensorDriver, SensorId};
use iaqd::snapshot::{IaqData, SharedSnapshot};

use crate::mock_hw::{
    co2_response_bytes, gas_conditioning_response, gas_measure_raw_response,
    gas_self_test_ok_response, pm_frame_bytes, pressure_raw_response, SharedI2c, SharedUart,
};

fn history_row(data: &IaqData) -> [(HistoryMetric, Option<f32>); 13] {
    let v = &data.valid;
    let f = &data.fused;
    let m = &data.metrics;
    [
        (HistoryMetric::TempC, v.temp.then_some(f.temp_c).flatten()),
        (HistoryMetric::HumidityRh, v.humidity.then_some(f.humidity_rh).flatten()),
        (HistoryMetric::PressureHpa, v.pressure.then_some(f.pressure_hpa).flatten()),
        (HistoryMetric::Pm1, v.pm1.then_some(f.pm1).flatten()),
        (HistoryMetric::Pm2_5, v.pm2_5.then_some(f.pm2_5).flatten()),
        (HistoryMetric::Pm10, v.pm10.then_some(f.pm10).flatten()),
        (HistoryMetric::Co2Ppm, v.co2.then_some(f.co2_ppm).flatten()),
        (HistoryMetric::VocIndex, v.voc.then_some(f.voc_index).flatten().map(f32::from)),
        (HistoryMetric::NoxIndex, v.nox.then_some(f.nox_index).flatten().map(f32::from)),
        (HistoryMetric::McuTempC, v.mcu_temp.then_some(f.mcu_temp_c).flatten()),
        (HistoryMetric::AqiValue, m.aqi_value.map(f32::from)),
        (HistoryMetric::ComfortScore, m.comfort_score.map(f32::from)),
        (HistoryMetric::OverallIaqScore, m.overall_iaq_score.map(f32::from)),
    ]
}

#[test]
fn full_pipeline_from_bus_bytes_to_history() {
    let config = Config::default();
    let storage = NvsStorage::new().unwrap();
    let snapshot = Arc::new(SharedSnapshot::new());

    let pm_uart = SharedUart::new();
    let co2_uart = SharedUart::new();
    let gas_i2c = SharedI2c::new();
    let pressure_i2c = SharedI2c::new();

    // The gas sensor's self-test runs synchronously inside `Coordinator::start`,
    // so it has to be queued before `start()` runs, unlike everything else.
    gas_i2c.push_response(gas_self_test_ok_response());

    let drivers: [Box<dyn SensorDriver + Send>; 5] = [
        Box::new(PmSensor::new(pm_uart.clone())),
        Box::new(Co2Sensor::new(co2_uart.clone())),
        Box::new(GasSensor::new(gas_i2c.clone())),
        Box::new(PressureSensor::new(pressure_i2c.clone())),
        Box::new(McuTempSensor::new(FixedMcuTemp(23.0))),
    ];

    let (mut coordinator, _tx) = Coordinator::new(&config, snapshot.clone(), drivers, &storage);
    coordinator.start(0);

    let pm_frame = pm_frame_bytes(4, 12, 18, 215, 455);
    for _ in 0..8 {
        pm_uart.push(&pm_frame);
    }
    let co2_frame = co2_response_bytes(650);
    for _ in 0..8 {
        co2_uart.push(&co2_frame);
    }
    for _ in 0..10 {
        gas_i2c.push_response(gas_conditioning_response());
    }
    for _ in 0..20 {
        gas_i2c.push_response(gas_measure_raw_response(30_000, 15_000));
    }
    const PRESSURE_RAW: u32 = 600_000;
    for _ in 0..20 {
        pressure_i2c.push_response(pressure_raw_response(PRESSURE_RAW));
    }

    let mut now_us = 0u64;
    for _ in 0..150 {
        now_us += 100_000;
        coordinator.tick(now_us, 12);
    }

    let data = snapshot.read();

    assert!(data.valid.pm2_5, "pm channel never came up");
    assert!(data.valid.co2, "co2 channel never came up");
    assert!(data.valid.voc, "gas channel never finished conditioning");
    assert!(data.valid.pressure, "pressure channel never came up");
    assert!(data.valid.mcu_temp, "mcu temp channel never came up");

    assert_eq!(data.fused.temp_c, Some(21.5));
    assert_eq!(data.fused.humidity_rh, Some(45.5));
    assert_eq!(data.fused.mcu_temp_c, Some(23.0));

    let rh = 45.5_f32;
    let denom = 1.0 + 0.25 * (rh / 100.0).powf(1.30);
    let expected_pm2_5 = 12.0_f32 / denom;
    assert!(
        (data.fused.pm2_5.unwrap() - expected_pm2_5).abs() < 1e-3,
        "fused pm2.5 = {:?}",
        data.fused.pm2_5
    );

    const ADC_MAX: f32 = (1u32 << 20) as f32 - 1.0;
    let expected_pressure_hpa = 300.0 + (PRESSURE_RAW as f32 / ADC_MAX) * 800.0;
    assert!(
        (data.fused.pressure_hpa.unwrap() - expected_pressure_hpa).abs() < 1e-2,
        "fused pressure = {:?}",
        data.fused.pressure_hpa
    );
    // Scaled pressure sits well below the CO2 compensation band, so CO2
    // passes through untouched.
    assert_eq!(data.fused.co2_ppm, Some(650.0));

    assert!(data.fused.voc_index.unwrap() <= 500);
    assert!(data.fused.nox_index.unwrap() <= 500);

    assert_eq!(data.metrics.aqi_category, AqiCategory::Good);
    assert_eq!(data.metrics.aqi_dominant, AqiDominant::Pm25);
    assert!(data.metrics.overall_iaq_score.is_some());

    let mut history = HistoryStore::new(
        TierConfig { resolution_s: 1, window_s: 3_600 },
        TierConfig { resolution_s: 60, window_s: 86_400 },
        TierConfig { resolution_s: 600, window_s: 7 * 86_400 },
    )
    .unwrap();
    let now_s = now_us / 1_000_000;
    history.append(now_s, &history_row(&data));

    let result = history
        .stream(HistoryMetric::Pm2_5, now_s.saturating_sub(1), now_s + 1, 10)
        .unwrap();
    assert!(!result.buckets.is_empty());
    let avg = result.buckets.last().unwrap().avg.unwrap();
    assert!((avg - expected_pm2_5).abs() < 1e-2, "history avg = {avg}");
}
