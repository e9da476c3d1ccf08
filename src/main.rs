//! IAQ Monitor Firmware — Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  UartDriver/I2cDriver  LogMqttAdapter  NvsStorage  Esp32Time    │
//! │  (bus adapters)        LogWsAdapter    (persistence) (clock)    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │         Coordinator · Fusion · Metrics (pure logic)     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  HistoryStore · SharedSnapshot · ConsoleDispatcher             │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Five OS threads share one [`SharedSnapshot`] (§5): the coordinator loop,
//! a metrics timer, a history appender, a console REPL, and an
//! interface-glue task that periodically logs what an MQTT/WS client would
//! have published. Every thread that isn't the coordinator loop reads the
//! snapshot through [`SharedSnapshot::read`] — never the live lock — and
//! the coordinator is the only writer, per §4.1/§5's ordering guarantee.
#![deny(unused_must_use)]

mod adapters;
mod bus;
mod config;
mod coordinator;
mod diagnostics;
mod drivers;
mod error;
mod fusion;
mod history;
mod interfaces;
mod metrics;
mod persistence;
mod publishers;
mod sensors;
mod snapshot;

#[cfg(target_os = "espidf")]
mod esp_link_shims;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::info;

use adapters::device_id;
use adapters::time::Esp32TimeAdapter;
use config::Config;
use coordinator::command::CommandSender;
use coordinator::Coordinator;
use history::{HistoryMetric, HistoryStore, TierConfig};
use interfaces::console::ConsoleDispatcher;
use interfaces::{topic, LogMqttAdapter, LogWsAdapter, MqttPort, WsPort};
use persistence::NvsStorage;
use sensors::SensorDriver;
use snapshot::SharedSnapshot;

const COORDINATOR_TICK_MS: u64 = 20;
const METRICS_TIMER_INTERVAL_S: u64 = 5;
const HISTORY_APPEND_INTERVAL_S: u64 = 1;
const INTERFACE_PUBLISH_INTERVAL_S: u64 = 10;

/// Build the five sensor drivers in [`SensorId::ALL`] order, each boxed
/// behind the shared [`SensorDriver`] object, against real peripherals.
#[cfg(target_os = "espidf")]
fn build_drivers() -> Result<[Box<dyn SensorDriver + Send>; 5]> {
    use esp_idf_hal::gpio::AnyIOPin;
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver};
    use esp_idf_hal::units::Hertz;

    let p = Peripherals::take()?;

    // PM sensor (PMS5003-class) — UART1, 9600 8N1.
    let pm_uart_cfg = UartConfig::new().baudrate(Hertz(9_600));
    let pm_uart = UartDriver::new(
        p.uart1,
        p.pins.gpio17,
        p.pins.gpio18,
        None::<AnyIOPin>,
        None::<AnyIOPin>,
        &pm_uart_cfg,
    )?;

    // CO2 sensor (Senseair S8-class, Modbus RTU) — UART2, 9600 8N1.
    let co2_uart_cfg = UartConfig::new().baudrate(Hertz(9_600));
    let co2_uart = UartDriver::new(
        p.uart2,
        p.pins.gpio19,
        p.pins.gpio20,
        None::<AnyIOPin>,
        None::<AnyIOPin>,
        &co2_uart_cfg,
    )?;

    // Gas sensor (SGP41-class) — I2C0.
    let gas_i2c = I2cDriver::new(p.i2c0, p.pins.gpio8, p.pins.gpio9, &I2cConfig::new())?;

    // Pressure sensor (BMP280-class) — I2C1, separate controller so the two
    // I2C devices never contend for the same bus handle.
    let pressure_i2c = I2cDriver::new(p.i2c1, p.pins.gpio4, p.pins.gpio5, &I2cConfig::new())?;

    let mcu_temp = sensors::mcu_temp::EspMcuTemp::new(p.temp_sensor)?;

    Ok([
        Box::new(sensors::pm::PmSensor::new(pm_uart)),
        Box::new(sensors::co2::Co2Sensor::new(co2_uart)),
        Box::new(sensors::gas::GasSensor::new(gas_i2c)),
        Box::new(sensors::pressure::PressureSensor::new(pressure_i2c)),
        Box::new(sensors::mcu_temp::McuTempSensor::new(mcu_temp)),
    ])
}

/// Host-side simulation build: every driver is the in-memory fake, enough
/// to exercise the thread wiring below without any real peripherals.
#[cfg(not(target_os = "espidf"))]
fn build_drivers() -> Result<[Box<dyn SensorDriver + Send>; 5]> {
    use bus::i2c::fake::FakeI2c;
    use bus::uart::fake::FakeUart;
    use sensors::mcu_temp::fake::FixedMcuTemp;

    Ok([
        Box::new(sensors::pm::PmSensor::new(FakeUart::default())),
        Box::new(sensors::co2::Co2Sensor::new(FakeUart::default())),
        Box::new(sensors::gas::GasSensor::new(FakeI2c::default())),
        Box::new(sensors::pressure::PressureSensor::new(FakeI2c::default())),
        Box::new(sensors::mcu_temp::McuTempSensor::new(FixedMcuTemp(25.0))),
    ])
}

fn history_config(config: &Config) -> [TierConfig; 3] {
    [
        TierConfig {
            resolution_s: config.history_t1_resolution_s,
            window_s: config.history_t1_window_s,
        },
        TierConfig {
            resolution_s: config.history_t2_resolution_s,
            window_s: config.history_t2_window_s,
        },
        TierConfig {
            resolution_s: config.history_t3_resolution_s,
            window_s: config.history_t3_window_s,
        },
    ]
}

fn history_row(data: &snapshot::IaqData) -> [(HistoryMetric, Option<f32>); 13] {
    let f = &data.fused;
    let v = &data.valid;
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

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }
    #[cfg(not(target_os = "espidf"))]
    init_sim_logger();

    info!("╔══════════════════════════════════════╗");
    info!("║  iaqd v{}                             ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    diagnostics::install_panic_handler();

    // ── 2. Device identity ─────────────────────────────────────
    let mac = device_id::read_mac();
    let dev_id = device_id::device_id(&mac);
    let dev_hostname = device_id::hostname(&mac);
    info!("Device ID: {dev_id} (hostname: {dev_hostname})");

    // ── 3. Persistence + config ────────────────────────────────
    let storage = match NvsStorage::new() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            log::error!("NVS init failed ({e}) — halting");
            #[allow(clippy::empty_loop)]
            loop {}
        }
    };
    let config = Config::default();
    if let Err(e) = config.validate() {
        log::warn!("built-in config failed validation ({e}), this should not happen");
    }

    // ── 4. Clock, snapshot, history ─────────────────────────────
    let clock = Arc::new(Esp32TimeAdapter::new());
    let snapshot = Arc::new(SharedSnapshot::new());
    let tiers = history_config(&config);
    let history = Arc::new(std::sync::Mutex::new(HistoryStore::new(
        tiers[0], tiers[1], tiers[2],
    )?));

    // ── 5. Sensor drivers + coordinator ─────────────────────────
    let drivers = build_drivers()?;
    let (mut coordinator, commands) =
        Coordinator::new(&config, snapshot.clone(), drivers, storage.as_ref());
    coordinator.start(clock.uptime_us());

    // ── 6. Coordinator thread — the only snapshot writer. The watchdog is
    // constructed here, not in `main`, so the task it subscribes to the TWDT
    // is the one that actually feeds it every tick. ────────────────────────
    {
        let clock = clock.clone();
        std::thread::spawn(move || {
            let watchdog = drivers::watchdog::Watchdog::new();
            loop {
                let now_us = clock.uptime_us();
                let hour = clock.current_hour().unwrap_or(0);
                coordinator.tick(now_us, hour);
                watchdog.feed();
                std::thread::sleep(Duration::from_millis(COORDINATOR_TICK_MS));
            }
        });
    }

    // ── 7. Metrics timer — periodic SystemInfo refresh ──────────
    {
        let snapshot = snapshot.clone();
        let clock = clock.clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(METRICS_TIMER_INTERVAL_S));
            let uptime_secs = clock.uptime_secs();
            let runtime = diagnostics::RuntimeMetrics::collect(uptime_secs);
            snapshot.with_lock(|data| {
                data.system.uptime_s = uptime_secs;
                data.system.free_internal_ram = runtime.heap_free;
                data.system.wifi_rssi = Some(runtime.wifi_rssi);
            });
        });
    }

    // ── 8. History appender — reads a snapshot copy, never the lock ─────
    {
        let snapshot = snapshot.clone();
        let history = history.clone();
        let clock = clock.clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(HISTORY_APPEND_INTERVAL_S));
            let data = snapshot.read();
            let now_s = clock.uptime_secs();
            history.lock().unwrap_or_else(std::sync::PoisonError::into_inner).append(now_s, &history_row(&data));
        });
    }

    // ── 9. Interface-glue stub task — logs what MQTT/WS would send ───────
    {
        let snapshot = snapshot.clone();
        let device_id_str = dev_id.clone();
        std::thread::spawn(move || {
            let mut mqtt = LogMqttAdapter;
            let mut ws = LogWsAdapter;
            let status_topic = topic(&device_id_str, "status");
            let _ = mqtt.set_last_will(&status_topic, b"offline");
            let _ = mqtt.publish(&status_topic, b"online", 1, true);
            loop {
                std::thread::sleep(Duration::from_secs(INTERFACE_PUBLISH_INTERVAL_S));
                let data = snapshot.read();
                let state = publishers::build_state(&data);
                let metrics = publishers::build_metrics(&data);
                if let Ok(bytes) = serde_json::to_vec(&state) {
                    let _ = mqtt.publish(&topic(&device_id_str, "state"), &bytes, 0, false);
                }
                let _ = ws.broadcast("metrics", &metrics);
            }
        });
    }

    // ── 10. Console REPL ─────────────────────────────────────────
    run_console(commands, snapshot, dev_id)
}

#[cfg(not(target_os = "espidf"))]
fn init_sim_logger() {
    let _ = log::set_logger(&SIMPLE_LOGGER).map(|()| log::set_max_level(log::LevelFilter::Info));
}

#[cfg(not(target_os = "espidf"))]
struct SimpleLogger;

#[cfg(not(target_os = "espidf"))]
static SIMPLE_LOGGER: SimpleLogger = SimpleLogger;

#[cfg(not(target_os = "espidf"))]
impl log::Log for SimpleLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        println!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Blocking console REPL over stdin — the on-device serial console (§4.8).
/// On `target_os = "espidf"`, stdin is the UART0 monitor console.
fn run_console(commands: CommandSender, snapshot: Arc<SharedSnapshot>, dev_id: device_id::DeviceIdString) -> Result<()> {
    let dispatcher = ConsoleDispatcher::new(commands, snapshot, dev_id);
    info!("Console ready. Type 'status', 'sensor status', 'free', 'version', ...");
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            std::thread::sleep(Duration::from_millis(100));
            continue;
        }
        let (code, response) = dispatcher.dispatch(line.trim());
        println!("{response}");
        if code != 0 {
            info!("console: command returned exit code {code}");
        }
    }
}
