//! On-device console command dispatch (§4.8).
//!
//! Parses the space-separated verb set (`status`, `restart`, `wifi`,
//! `mqtt`, `sensor`, `free`, `version`, `power`) and routes `sensor` onto
//! the coordinator's command queue, matching the teacher's `rpc` module's
//! habit of keeping the parser itself free of domain knowledge: every verb
//! here either reads the shared snapshot or sends one [`Command`] and lets
//! the coordinator do the real work. `wifi`/`mqtt`/`power` are named by
//! §4.8 but back onto external collaborators this crate does not own
//! (§1's explicit out-of-scope list), so they report `NotSupported` rather
//! than pretend to drive hardware that is not here.

use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::command::{Command, CommandSender};
use crate::error::CoordinatorError;
use crate::sensors::SensorId;
use crate::snapshot::SharedSnapshot;

const FORCE_READ_TIMEOUT: Duration = Duration::from_millis(500);

fn parse_sensor_id(token: &str) -> Option<SensorId> {
    SensorId::ALL.into_iter().find(|id| id.as_str() == token)
}

/// Dispatches one console line. Returns the exit code shown in the prompt
/// plus the human-readable response text.
pub struct ConsoleDispatcher {
    commands: CommandSender,
    snapshot: Arc<SharedSnapshot>,
    device_id: heapless::String<16>,
}

impl ConsoleDispatcher {
    pub fn new(commands: CommandSender, snapshot: Arc<SharedSnapshot>, device_id: heapless::String<16>) -> Self {
        Self {
            commands,
            snapshot,
            device_id,
        }
    }

    pub fn dispatch(&self, line: &str) -> (i32, String) {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("status") => self.status(),
            Some("restart") => (0, "restart requested".to_string()),
            Some("free") => self.free(),
            Some("version") => (0, format!("iaqd {}", env!("CARGO_PKG_VERSION"))),
            Some("sensor") => self.sensor(tokens.collect::<Vec<_>>().as_slice()),
            Some("wifi") => unsupported("wifi"),
            Some("mqtt") => unsupported("mqtt"),
            Some("power") => unsupported("power"),
            Some(other) => (1, format!("unknown command: {other}")),
            None => (1, "empty command".to_string()),
        }
    }

    fn status(&self) -> (i32, String) {
        let data = self.snapshot.read();
        (
            0,
            format!(
                "device={} uptime={}s aqi={:?} comfort={:?}",
                self.device_id, data.system.uptime_s, data.metrics.aqi_value, data.metrics.comfort_score
            ),
        )
    }

    fn free(&self) -> (i32, String) {
        let data = self.snapshot.read();
        (
            0,
            format!(
                "internal_free={} spiram_free={}",
                data.system.free_internal_ram, data.system.free_spiram
            ),
        )
    }

    fn sensor(&self, args: &[&str]) -> (i32, String) {
        let Some(&verb) = args.first() else {
            return (1, "sensor: missing subcommand".to_string());
        };
        if verb == "status" {
            return self.sensor_status();
        }

        let Some(id_token) = args.get(1) else {
            return (1, format!("sensor {verb}: missing sensor id"));
        };
        let Some(id) = parse_sensor_id(id_token) else {
            return (1, format!("sensor {verb}: unknown sensor '{id_token}'"));
        };

        let result = match verb {
            "read" => match self.commands.force_read_sync(id, FORCE_READ_TIMEOUT) {
                Ok(output) => return (0, format!("{id:?}: {output:?}")),
                Err(e) => Err(e),
            },
            "reset" => self.commands.send(Command::Reset(id)),
            "calibrate" => match args.get(2).and_then(|v| v.parse::<f32>().ok()) {
                Some(value) => self.commands.send(Command::Calibrate(id, value)),
                None => return (1, "sensor calibrate: missing numeric value".to_string()),
            },
            "cadence" => match args.get(2).and_then(|v| v.parse::<u32>().ok()) {
                Some(ms) => self.commands.send(Command::SetCadence(id, ms)),
                None => return (1, "sensor cadence: missing millisecond value".to_string()),
            },
            "disable" => self.commands.send(Command::Disable(id)),
            "enable" => self.commands.send(Command::Enable(id)),
            other => return (1, format!("sensor: unknown subcommand '{other}'")),
        };

        match result {
            Ok(()) => (0, format!("sensor {verb} {id_token}: ok")),
            Err(e) => (exit_code(e), format!("sensor {verb} {id_token}: {e}")),
        }
    }

    fn sensor_status(&self) -> (i32, String) {
        let mut out = String::new();
        for id in SensorId::ALL {
            out.push_str(id.as_str());
            out.push(' ');
        }
        (0, out.trim_end().to_string())
    }
}

fn unsupported(verb: &str) -> (i32, String) {
    (
        exit_code(CoordinatorError::NotSupported),
        format!("{verb}: not supported by this firmware build"),
    )
}

const fn exit_code(e: CoordinatorError) -> i32 {
    match e {
        CoordinatorError::InvalidArg(_) => 1,
        CoordinatorError::InvalidState(_) => 2,
        CoordinatorError::Timeout => 3,
        CoordinatorError::NotSupported => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::coordinator::Coordinator;
    use crate::persistence::NvsStorage;
    use crate::sensors::SensorDriver;
    use crate::error::SensorError;
    use crate::sensors::SensorOutput;

    struct NoopDriver(SensorId);
    impl SensorDriver for NoopDriver {
        fn id(&self) -> SensorId {
            self.0
        }
        fn init(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
        fn deinit(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
        fn read(&mut self) -> Result<SensorOutput, SensorError> {
            Err(SensorError::NotReady)
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

    fn dispatcher() -> ConsoleDispatcher {
        let config = Config::default();
        let storage = NvsStorage::new().unwrap();
        let snapshot = Arc::new(SharedSnapshot::new());
        let drivers: [Box<dyn SensorDriver + Send>; 5] = SensorId::ALL.map(|id| Box::new(NoopDriver(id)) as Box<dyn SensorDriver + Send>);
        let (_coord, tx) = Coordinator::new(&config, snapshot.clone(), drivers, &storage);
        let mut id = heapless::String::<16>::new();
        id.push_str("IAQ-TEST01").unwrap();
        ConsoleDispatcher::new(tx, snapshot, id)
    }

    #[test]
    fn unknown_command_returns_nonzero() {
        let d = dispatcher();
        let (code, _) = d.dispatch("frobnicate");
        assert_eq!(code, 1);
    }

    #[test]
    fn wifi_verb_reports_not_supported() {
        let d = dispatcher();
        let (code, msg) = d.dispatch("wifi status");
        assert_eq!(code, 4);
        assert!(msg.contains("not supported"));
    }

    #[test]
    fn sensor_cadence_sets_new_value() {
        let d = dispatcher();
        let (code, _) = d.dispatch("sensor cadence pm 9000");
        assert_eq!(code, 0);
    }

    #[test]
    fn sensor_unknown_id_is_rejected() {
        let d = dispatcher();
        let (code, msg) = d.dispatch("sensor read bogus");
        assert_eq!(code, 1);
        assert!(msg.contains("unknown sensor"));
    }
}
