//! Sensor coordinator (C6) — the central engine, per §4.5.
//!
//! Owns one [`fsm::SensorFsm`] per [`SensorId`] plus its driver, runs the
//! periodic cadence schedule, drains the command queue with priority over
//! that schedule, and re-runs fusion + metrics under the snapshot's write
//! lock after every accepted read. Runs on a single OS thread — the
//! "serialised per bus, buses may overlap" requirement of §4.5 then falls
//! out for free within one bus, and true cross-bus overlap would need one
//! coordinator thread per bus, which `main.rs` is free to do by running
//! multiple `Coordinator`s.

pub mod command;
pub mod fsm;

use command::{Command, CommandQueue, CommandSender};
use fsm::{FsmEvent, StateId};

use crate::config::Config;
use crate::error::SensorError;
use crate::fusion::{self, AbcState, FusionCoefficients};
use crate::metrics::MetricsStage;
use crate::persistence::StoragePort;
use crate::sensors::{SensorDriver, SensorId, SensorOutput};
use crate::snapshot::SharedSnapshot;

/// Read-only snapshot of one sensor's coordinator-owned state (§3.2),
/// handed out to the health publisher.
#[derive(Debug, Clone, Copy)]
pub struct SensorRuntimeView {
    pub id: SensorId,
    pub state_name: &'static str,
    pub error_count: u32,
    pub cadence_ms: u32,
    pub warmup_deadline_us: Option<u64>,
}

struct SensorSlot {
    driver: Box<dyn SensorDriver + Send>,
    fsm: fsm::SensorFsm,
    last_attempt_us: u64,
    warmup_deadline_us: Option<u64>,
    error_count: u32,
    cadence_ms: u32,
    warmup_ms: u32,
    enabled: bool,
    cadence_from_nvs: bool,
}

impl SensorSlot {
    fn stale_threshold_us(&self) -> u64 {
        ((2.5 * f64::from(self.cadence_ms) * 1000.0) as u64).max(10_000_000)
    }
}

pub struct Coordinator {
    slots: [SensorSlot; 5],
    snapshot: std::sync::Arc<SharedSnapshot>,
    queue: CommandQueue,
    coeffs: FusionCoefficients,
    abc: AbcState,
    metrics: MetricsStage,
    config: Config,
}

impl Coordinator {
    /// Build a coordinator from one driver per [`SensorId::ALL`] slot
    /// (indices line up 1:1 with that array), loading any persisted
    /// cadence/enable overrides from `storage`.
    pub fn new(
        config: &Config,
        snapshot: std::sync::Arc<SharedSnapshot>,
        drivers: [Box<dyn SensorDriver + Send>; 5],
        storage: &dyn StoragePort,
    ) -> (Self, CommandSender) {
        let (tx, queue) = CommandQueue::new(config.command_queue_depth);

        let mut iter = drivers.into_iter();
        let slots = SensorId::ALL.map(|id| {
            let driver = iter.next().expect("one driver per SensorId");
            let (cadence_ms, cadence_from_nvs) = match storage.get_u32("cadence", id.as_str()) {
                Ok(Some(v)) => (v, true),
                _ => (config.cadence_ms.get(id), false),
            };
            let enabled = storage.get_bool("enabled", id.as_str()).ok().flatten().unwrap_or(true);
            SensorSlot {
                driver,
                fsm: fsm::SensorFsm::new(),
                last_attempt_us: 0,
                warmup_deadline_us: None,
                error_count: 0,
                cadence_ms,
                warmup_ms: config.warmup_ms.get(id),
                enabled,
                cadence_from_nvs,
            }
        });

        let coordinator = Self {
            slots,
            snapshot,
            queue,
            coeffs: FusionCoefficients::new(config.pm_rh_a, config.pm_rh_b, config.temp_offset_c)
                .unwrap_or_default(),
            abc: AbcState::default(),
            metrics: MetricsStage::new(),
            config: config.clone(),
        };
        (coordinator, tx)
    }

    fn slot_mut(&mut self, id: SensorId) -> &mut SensorSlot {
        &mut self.slots[SensorId::ALL.iter().position(|&s| s == id).unwrap()]
    }

    /// Run `init()` on every driver, moving `Uninit -> Init -> Warming`.
    pub fn start(&mut self, now_us: u64) {
        for slot in &mut self.slots {
            if !slot.enabled {
                slot.fsm.apply(FsmEvent::Disable);
                continue;
            }
            if slot.driver.init().is_ok() {
                slot.fsm.apply(FsmEvent::InitOk);
                slot.fsm.apply(FsmEvent::WarmupElapsedAndReady);
                slot.warmup_deadline_us = Some(now_us + u64::from(slot.warmup_ms) * 1_000);
            } else {
                slot.fsm.apply(FsmEvent::FatalFailure);
            }
        }
    }

    /// One iteration of the control loop: drain commands, then service any
    /// sensor whose cadence has elapsed. Call in a tight loop (e.g. every
    /// 10-50 ms) from a dedicated OS thread.
    pub fn tick(&mut self, now_us: u64, current_hour: u8) {
        for cmd in self.queue.drain() {
            self.handle_command(cmd, now_us);
        }

        for idx in 0..self.slots.len() {
            let id = SensorId::ALL[idx];
            let due = {
                let slot = &self.slots[idx];
                let warming_or_ready =
                    matches!(slot.fsm.state(), StateId::Warming | StateId::Ready);
                warming_or_ready
                    && slot.cadence_ms > 0
                    && now_us.saturating_sub(slot.last_attempt_us) >= u64::from(slot.cadence_ms) * 1_000
            };
            if due {
                self.service_sensor(id, now_us, current_hour);
            }
        }
    }

    fn service_sensor(&mut self, id: SensorId, now_us: u64, current_hour: u8) {
        let idx = SensorId::ALL.iter().position(|&s| s == id).unwrap();
        self.slots[idx].last_attempt_us = now_us;

        let ambient_temp = self.snapshot.with_lock(|d| d.fused.temp_c).unwrap_or(20.0);
        let ambient_rh = self.snapshot.with_lock(|d| d.fused.humidity_rh).unwrap_or(50.0);
        self.slots[idx].driver.conditioning_tick(ambient_temp, ambient_rh);

        let result = self.slots[idx].driver.read();
        self.apply_read_result(idx, result, now_us, current_hour);
    }

    fn apply_read_result(
        &mut self,
        idx: usize,
        result: Result<SensorOutput, SensorError>,
        now_us: u64,
        current_hour: u8,
    ) {
        let id = SensorId::ALL[idx];
        match result {
            Ok(output) => {
                self.slots[idx].error_count = 0;
                let ready = match output {
                    SensorOutput::Gas { .. } => self.slots[idx].driver.is_reporting_ready(),
                    _ => true,
                };
                let deadline_passed = self.slots[idx]
                    .warmup_deadline_us
                    .is_none_or(|d| now_us >= d);
                if self.slots[idx].fsm.state() == StateId::Warming && ready && deadline_passed {
                    self.slots[idx].fsm.apply(FsmEvent::ReadOk);
                    self.slots[idx].warmup_deadline_us = None;
                } else if self.slots[idx].fsm.state() == StateId::Ready {
                    self.slots[idx].fsm.apply(FsmEvent::ReadOk);
                }
                self.write_snapshot(id, output, now_us, current_hour);
            }
            Err(SensorError::Fatal(_)) => {
                self.slots[idx].fsm.apply(FsmEvent::FatalFailure);
            }
            Err(_transient) => {
                self.slots[idx].error_count += 1;
                if self.slots[idx].error_count >= u32::from(self.config.max_consecutive_failures) {
                    self.slots[idx].fsm.apply(FsmEvent::FatalFailure);
                }
                self.clear_stale_if_needed(id, now_us);
            }
        }
    }

    /// Transient-failure stale clearing (§4.5 failure model): a fused value
    /// stays usable until `now - updated_at` exceeds the per-sensor stale
    /// threshold, at which point `valid` is cleared for the channels that
    /// sensor owns.
    fn clear_stale_if_needed(&self, id: SensorId, now_us: u64) {
        let idx = SensorId::ALL.iter().position(|&s| s == id).unwrap();
        let threshold = self.slots[idx].stale_threshold_us();
        self.snapshot.with_lock(|data| {
            let updated = data.updated_at.get(id);
            if updated == 0 || now_us.saturating_sub(updated) <= threshold {
                return;
            }
            match id {
                SensorId::Pm => {
                    data.valid.pm1 = false;
                    data.valid.pm2_5 = false;
                    data.valid.pm10 = false;
                    data.valid.temp = false;
                    data.valid.humidity = false;
                }
                SensorId::Co2 => data.valid.co2 = false,
                SensorId::Gas => {
                    data.valid.voc = false;
                    data.valid.nox = false;
                }
                SensorId::Pressure => data.valid.pressure = false,
                SensorId::McuTemp => data.valid.mcu_temp = false,
            }
        });
    }

    fn write_snapshot(&mut self, id: SensorId, output: SensorOutput, now_us: u64, current_hour: u8) {
        self.snapshot.with_lock(|data| {
            match output {
                SensorOutput::Pm {
                    pm1_0,
                    pm2_5,
                    pm10,
                    temp_c,
                    humidity_rh,
                } => {
                    data.raw.pm1 = Some(pm1_0);
                    data.raw.pm2_5 = Some(pm2_5);
                    data.raw.pm10 = Some(pm10);
                    data.raw.temp_c = Some(temp_c);
                    data.raw.humidity_rh = Some(humidity_rh);
                    data.valid.pm1 = true;
                    data.valid.pm2_5 = true;
                    data.valid.pm10 = true;
                    data.valid.temp = true;
                    data.valid.humidity = true;
                }
                SensorOutput::Co2 { co2_ppm } => {
                    data.raw.co2_ppm = Some(co2_ppm);
                    data.valid.co2 = true;
                }
                SensorOutput::Gas { voc_index, nox_index } => {
                    data.raw.voc_index = Some(voc_index);
                    data.raw.nox_index = Some(nox_index);
                    data.valid.voc = true;
                    data.valid.nox = true;
                }
                SensorOutput::Pressure { pressure_hpa } => {
                    data.raw.pressure_hpa = Some(pressure_hpa);
                    data.valid.pressure = true;
                }
                SensorOutput::McuTemp { mcu_temp_c } => {
                    data.raw.mcu_temp_c = Some(mcu_temp_c);
                    data.valid.mcu_temp = true;
                }
            }
            data.updated_at.set(id, now_us);

            fusion::apply(
                data,
                &self.coeffs,
                &mut self.abc,
                self.config.abc_night_start_hour,
                self.config.abc_night_end_hour,
                current_hour,
            );
            data.metrics = self.metrics.tick(now_us, &data.fused, &data.valid, &self.config);
        });
    }

    fn handle_command(&mut self, cmd: Command, now_us: u64) {
        match cmd {
            Command::Read(id) => {
                self.service_sensor(id, now_us, 0);
            }
            Command::Reset(id) => {
                let idx = SensorId::ALL.iter().position(|&s| s == id).unwrap();
                if self.slots[idx].driver.reset().is_ok() {
                    self.slots[idx].error_count = 0;
                    self.slots[idx].fsm.apply(FsmEvent::ResetOk);
                    self.slots[idx].warmup_deadline_us =
                        Some(now_us + u64::from(self.slots[idx].warmup_ms) * 1_000);
                } else {
                    self.slots[idx].fsm.apply(FsmEvent::FatalFailure);
                }
            }
            Command::Calibrate(_id, _value) => {
                // No sensor in this set exposes a calibration primitive beyond
                // reset; reserved for a future chip with an offset register.
            }
            Command::SetCadence(id, ms) => {
                self.slot_mut(id).cadence_ms = ms;
            }
            Command::Enable(id) => {
                let slot = self.slot_mut(id);
                slot.enabled = true;
                slot.fsm.apply(FsmEvent::Enable);
            }
            Command::Disable(id) => {
                let slot = self.slot_mut(id);
                slot.enabled = false;
                slot.fsm.apply(FsmEvent::Disable);
            }
            Command::ForceReadSync(id, reply, _timeout) => {
                let idx = SensorId::ALL.iter().position(|&s| s == id).unwrap();
                if !self.slots[idx].enabled || self.slots[idx].fsm.state() == StateId::Disabled {
                    let _ = reply.send(Err(SensorError::NotReady));
                    return;
                }
                let result = self.slots[idx].driver.read();
                let _ = reply.send(result);
                self.apply_read_result(idx, result, now_us, 0);
            }
        }
    }

    pub fn runtime_views(&self) -> Vec<SensorRuntimeView> {
        SensorId::ALL
            .iter()
            .zip(self.slots.iter())
            .map(|(&id, slot)| SensorRuntimeView {
                id,
                state_name: slot.fsm.state().name(),
                error_count: slot.error_count,
                cadence_ms: slot.cadence_ms,
                warmup_deadline_us: slot.warmup_deadline_us,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::NvsStorage;
    use std::sync::Arc;

    /// Minimal in-memory driver for exercising coordinator logic without any
    /// bus plumbing: always succeeds with a fixed reading until told to fail.
    struct StubDriver {
        id: SensorId,
        output: SensorOutput,
        reads: u32,
        fail_next: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl StubDriver {
        fn new(id: SensorId, output: SensorOutput) -> Self {
            Self {
                id,
                output,
                reads: 0,
                fail_next: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            }
        }

        fn with_fail_flag(
            id: SensorId,
            output: SensorOutput,
            fail_next: std::sync::Arc<std::sync::atomic::AtomicBool>,
        ) -> Self {
            Self {
                id,
                output,
                reads: 0,
                fail_next,
            }
        }
    }

    impl SensorDriver for StubDriver {
        fn id(&self) -> SensorId {
            self.id
        }
        fn init(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
        fn deinit(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
        fn read(&mut self) -> Result<SensorOutput, SensorError> {
            self.reads += 1;
            if self.fail_next.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(SensorError::Transient("stub"));
            }
            Ok(self.output)
        }
        fn reset(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
        fn enable(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
        fn disable(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
    }

    fn stub_drivers() -> [Box<dyn SensorDriver + Send>; 5] {
        [
            Box::new(StubDriver::new(
                SensorId::Pm,
                SensorOutput::Pm {
                    pm1_0: 4.0,
                    pm2_5: 8.0,
                    pm10: 12.0,
                    temp_c: 21.0,
                    humidity_rh: 40.0,
                },
            )),
            Box::new(StubDriver::new(SensorId::Co2, SensorOutput::Co2 { co2_ppm: 600.0 })),
            Box::new(StubDriver::new(
                SensorId::Gas,
                SensorOutput::Gas {
                    voc_index: 100,
                    nox_index: 1,
                },
            )),
            Box::new(StubDriver::new(
                SensorId::Pressure,
                SensorOutput::Pressure { pressure_hpa: 1013.0 },
            )),
            Box::new(StubDriver::new(
                SensorId::McuTemp,
                SensorOutput::McuTemp { mcu_temp_c: 30.0 },
            )),
        ]
    }

    #[test]
    fn start_moves_enabled_sensors_to_warming() {
        let config = Config::default();
        let storage = NvsStorage::new().unwrap();
        let snapshot = Arc::new(SharedSnapshot::new());
        let (mut coord, _tx) = Coordinator::new(&config, snapshot, stub_drivers(), &storage);
        coord.start(0);
        for view in coord.runtime_views() {
            assert_eq!(view.state_name, "warming");
        }
    }

    #[test]
    fn tick_reads_due_sensor_and_updates_snapshot() {
        let mut config = Config::default();
        config.cadence_ms.pm = 1_000;
        let storage = NvsStorage::new().unwrap();
        let snapshot = Arc::new(SharedSnapshot::new());
        let (mut coord, _tx) = Coordinator::new(&config, snapshot.clone(), stub_drivers(), &storage);
        coord.start(0);
        coord.tick(2_000_000, 12);
        let data = snapshot.read();
        assert_eq!(data.raw.pm2_5, Some(8.0));
        assert!(data.valid.pm2_5);
    }

    #[test]
    fn force_read_sync_on_disabled_sensor_is_invalid_state() {
        let config = Config::default();
        let storage = NvsStorage::new().unwrap();
        let snapshot = Arc::new(SharedSnapshot::new());
        let (mut coord, tx) = Coordinator::new(&config, snapshot, stub_drivers(), &storage);
        coord.start(0);
        tx.send(Command::Disable(SensorId::Pm)).unwrap();
        coord.tick(0, 0);
        let result = tx.force_read_sync(SensorId::Pm, std::time::Duration::from_millis(100));
        assert!(result.is_err());
    }

    #[test]
    fn transient_failure_increments_error_count_without_clearing_fresh_value() {
        let config = Config::default();
        let storage = NvsStorage::new().unwrap();
        let snapshot = Arc::new(SharedSnapshot::new());
        let fail_next = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut drivers = stub_drivers();
        let idx = SensorId::ALL.iter().position(|&s| s == SensorId::Pressure).unwrap();
        drivers[idx] = Box::new(StubDriver::with_fail_flag(
            SensorId::Pressure,
            SensorOutput::Pressure { pressure_hpa: 1013.0 },
            fail_next.clone(),
        ));
        let (mut coord, _tx) = Coordinator::new(&config, snapshot.clone(), drivers, &storage);
        coord.start(0);
        coord.tick(10_000_000, 3);
        fail_next.store(true, std::sync::atomic::Ordering::SeqCst);
        coord.tick(10_000_000 + u64::from(config.cadence_ms.pressure) * 1_000, 3);
        assert_eq!(coord.runtime_views()[idx].error_count, 1);
    }
}
