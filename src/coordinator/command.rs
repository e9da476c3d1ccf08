//! Coordinator command queue (§4.5, §5).
//!
//! A bounded MPSC channel, matching §5's "bounded, multi-producer
//! single-consumer, overflow returns Timeout" guarantee, plus a `oneshot`
//! reply channel for [`Command::ForceReadSync`] — grounded in
//! `docwilco-tachtalk`'s use of `oneshot` for single-shot replies rather than
//! a hand-rolled mechanism.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::time::Duration;

use crate::error::{CoordinatorError, SensorError};
use crate::sensors::{SensorId, SensorOutput};

#[derive(Debug)]
pub enum Command {
    Read(SensorId),
    Reset(SensorId),
    Calibrate(SensorId, f32),
    SetCadence(SensorId, u32),
    Enable(SensorId),
    Disable(SensorId),
    ForceReadSync(SensorId, oneshot::Sender<Result<SensorOutput, SensorError>>, Duration),
}

/// Producer handle. Cheap to clone — every interface task (console, REST,
/// MQTT) gets its own.
#[derive(Clone)]
pub struct CommandSender {
    tx: SyncSender<Command>,
}

impl CommandSender {
    /// Non-blocking enqueue. A full queue means the coordinator loop is
    /// falling behind; callers get `Timeout` rather than blocking the
    /// calling task indefinitely.
    pub fn send(&self, cmd: Command) -> Result<(), CoordinatorError> {
        self.tx.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => CoordinatorError::Timeout,
            TrySendError::Disconnected(_) => CoordinatorError::InvalidState("coordinator gone"),
        })
    }

    /// Issue a force-read and block the caller (not the coordinator loop)
    /// until a reply arrives or `timeout` elapses.
    pub fn force_read_sync(
        &self,
        id: SensorId,
        timeout: Duration,
    ) -> Result<SensorOutput, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::ForceReadSync(id, reply_tx, timeout))?;
        match reply_rx.recv_timeout(timeout) {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(_sensor_err)) => Err(CoordinatorError::InvalidState("sensor read failed")),
            Err(_) => Err(CoordinatorError::Timeout),
        }
    }
}

pub struct CommandQueue {
    rx: Receiver<Command>,
}

impl CommandQueue {
    pub fn new(depth: usize) -> (CommandSender, Self) {
        let (tx, rx) = sync_channel(depth.max(1));
        (CommandSender { tx }, Self { rx })
    }

    /// Drain every command currently queued without blocking. Commands have
    /// priority over the periodic cadence schedule.
    pub fn drain(&self) -> Vec<Command> {
        self.rx.try_iter().collect()
    }
}
