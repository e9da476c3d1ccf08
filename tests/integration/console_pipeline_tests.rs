//! Console dispatch driven against a live `Coordinator` backed by real bus
//! fakes, going past the `NoopDriver` coverage in the crate's own unit tests
//! to exercise `sensor read`/`sensor cadence` against an actually-ticking
//! coordinator on a background thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use iaqd::config::Config;
use iaqd::coordinator::Coordinator;
use iaqd::interfaces::console::ConsoleDispatcher;
use iaqd::persistence::NvsStorage;
use iaqd::sensors::pm::PmSensor;
use iaqd::sensors::co2::Co2Sensor;
use iaqd::sensors::gas::GasSensor;
use iaqd::sensors::mcu_temp::{fake::FixedMcuTemp, McuTempSensor};
use iaqd::sensors::pressure::PressureSensor;
use iaqd::sensors::SensorDriver;
use iaqd::snapshot::SharedSnapshot;

use crate::mock_hw::{gas_self_test_ok_response, pm_frame_bytes, SharedI2c, SharedUart};

/// Spins `coordinator.tick` on a dedicated thread until `stop` is set, the
/// same one-coordinator-per-thread shape `main.rs` uses for the real loop.
fn spawn_ticker(
    mut coordinator: Coordinator,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut now_us = 0u64;
        coordinator.start(now_us);
        while !stop.load(Ordering::Relaxed) {
            now_us += 10_000;
            coordinator.tick(now_us, 12);
            std::thread::sleep(Duration::from_millis(2));
        }
    })
}

#[test]
fn sensor_read_round_trips_through_a_live_coordinator() {
    let config = Config::default();
    let storage = NvsStorage::new().unwrap();
    let snapshot = Arc::new(SharedSnapshot::new());

    let pm_uart = SharedUart::new();
    let gas_i2c = SharedI2c::new();
    gas_i2c.push_response(gas_self_test_ok_response());

    let drivers: [Box<dyn SensorDriver + Send>; 5] = [
        Box::new(PmSensor::new(pm_uart.clone())),
        Box::new(Co2Sensor::new(SharedUart::new())),
        Box::new(GasSensor::new(gas_i2c)),
        Box::new(PressureSensor::new(SharedI2c::new())),
        Box::new(McuTempSensor::new(FixedMcuTemp(22.0))),
    ];

    // Keep the PM queue topped up for as long as the ticker thread runs —
    // `Coordinator::start` doesn't consume anything from it, so this is safe
    // to push before the coordinator even exists.
    let frame = pm_frame_bytes(4, 12, 18, 215, 455);
    for _ in 0..50 {
        pm_uart.push(&frame);
    }

    let (coordinator, tx) = Coordinator::new(&config, snapshot.clone(), drivers, &storage);
    let stop = Arc::new(AtomicBool::new(false));
    let ticker = spawn_ticker(coordinator, stop.clone());

    let mut device_id = heapless::String::<16>::new();
    device_id.push_str("IAQ-ABCDEF").unwrap();
    let dispatcher = ConsoleDispatcher::new(tx, snapshot, device_id);

    let (code, body) = dispatcher.dispatch("sensor read pm");
    assert_eq!(code, 0, "sensor read pm failed: {body}");
    assert!(body.contains("Pm"), "unexpected body: {body}");

    let (code, _) = dispatcher.dispatch("sensor cadence pm 500");
    assert_eq!(code, 0);

    let (code, body) = dispatcher.dispatch("status");
    assert_eq!(code, 0);
    assert!(body.starts_with("device=IAQ-ABCDEF"), "unexpected body: {body}");

    stop.store(true, Ordering::Relaxed);
    ticker.join().unwrap();
}

#[test]
fn disabled_sensor_rejects_force_read() {
    let config = Config::default();
    let storage = NvsStorage::new().unwrap();
    let snapshot = Arc::new(SharedSnapshot::new());

    let gas_i2c = SharedI2c::new();
    gas_i2c.push_response(gas_self_test_ok_response());
    let drivers: [Box<dyn SensorDriver + Send>; 5] = [
        Box::new(PmSensor::new(SharedUart::new())),
        Box::new(Co2Sensor::new(SharedUart::new())),
        Box::new(GasSensor::new(gas_i2c)),
        Box::new(PressureSensor::new(SharedI2c::new())),
        Box::new(McuTempSensor::new(FixedMcuTemp(22.0))),
    ];

    let (coordinator, tx) = Coordinator::new(&config, snapshot.clone(), drivers, &storage);
    let stop = Arc::new(AtomicBool::new(false));
    let ticker = spawn_ticker(coordinator, stop.clone());

    let mut device_id = heapless::String::<16>::new();
    device_id.push_str("IAQ-ABCDEF").unwrap();
    let dispatcher = ConsoleDispatcher::new(tx, snapshot, device_id);

    let (code, _) = dispatcher.dispatch("sensor disable pressure");
    assert_eq!(code, 0);
    // Give the ticker thread a moment to drain the Disable command.
    std::thread::sleep(Duration::from_millis(50));

    let (code, body) = dispatcher.dispatch("sensor read pressure");
    assert_ne!(code, 0, "expected a force-read on a disabled sensor to fail: {body}");

    stop.store(true, Ordering::Relaxed);
    ticker.join().unwrap();
}
