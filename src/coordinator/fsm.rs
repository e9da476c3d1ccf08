//! Per-sensor state machine (§4.5).
//!
//! Generalises the teacher's `fsm/{mod,states,context}.rs` state-table
//! engine — instead of one `Fsm` over the whole device, the coordinator
//! owns `N` independent [`SensorFsm`] instances, one per [`crate::sensors::SensorId`],
//! each walking the same six states.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateId {
    Uninit,
    Init,
    Warming,
    Ready,
    Error,
    Disabled,
}

impl StateId {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uninit => "uninit",
            Self::Init => "init",
            Self::Warming => "warming",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Disabled => "disabled",
        }
    }
}

/// Inputs the coordinator feeds into a sensor's state machine.
#[derive(Debug, Clone, Copy)]
pub enum FsmEvent {
    InitOk,
    WarmupElapsedAndReady,
    ReadOk,
    TransientFailure,
    FatalFailure,
    ResetOk,
    Disable,
    Enable,
}

pub struct SensorFsm {
    state: StateId,
}

impl SensorFsm {
    pub const fn new() -> Self {
        Self {
            state: StateId::Uninit,
        }
    }

    pub const fn state(&self) -> StateId {
        self.state
    }

    /// Apply one event, returning the new state. Invalid event/state pairs
    /// are no-ops (state unchanged) — the coordinator only emits events
    /// consistent with the current state, but the FSM itself stays strict.
    pub fn apply(&mut self, event: FsmEvent) -> StateId {
        self.state = match (self.state, event) {
            (StateId::Uninit, FsmEvent::InitOk) => StateId::Init,
            (StateId::Init, FsmEvent::WarmupElapsedAndReady) => StateId::Warming,
            (StateId::Warming, FsmEvent::ReadOk) => StateId::Ready,
            (StateId::Warming, FsmEvent::WarmupElapsedAndReady) => StateId::Warming,
            (StateId::Ready, FsmEvent::ReadOk) => StateId::Ready,
            (StateId::Ready, FsmEvent::TransientFailure) => StateId::Ready,
            (StateId::Ready | StateId::Warming, FsmEvent::FatalFailure) => StateId::Error,
            (StateId::Error, FsmEvent::ResetOk) => StateId::Warming,
            (_, FsmEvent::Disable) => StateId::Disabled,
            (StateId::Disabled, FsmEvent::Enable) => StateId::Init,
            (other, _) => other,
        };
        self.state
    }
}

impl Default for SensorFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_ready() {
        let mut fsm = SensorFsm::new();
        assert_eq!(fsm.apply(FsmEvent::InitOk), StateId::Init);
        assert_eq!(fsm.apply(FsmEvent::WarmupElapsedAndReady), StateId::Warming);
        assert_eq!(fsm.apply(FsmEvent::ReadOk), StateId::Ready);
    }

    #[test]
    fn fatal_moves_to_error_and_reset_returns_to_warming() {
        let mut fsm = SensorFsm::new();
        fsm.apply(FsmEvent::InitOk);
        fsm.apply(FsmEvent::WarmupElapsedAndReady);
        fsm.apply(FsmEvent::ReadOk);
        assert_eq!(fsm.apply(FsmEvent::FatalFailure), StateId::Error);
        assert_eq!(fsm.apply(FsmEvent::ResetOk), StateId::Warming);
    }

    #[test]
    fn disable_from_any_state_then_enable_returns_to_init() {
        let mut fsm = SensorFsm::new();
        fsm.apply(FsmEvent::Disable);
        assert_eq!(fsm.state(), StateId::Disabled);
        assert_eq!(fsm.apply(FsmEvent::Enable), StateId::Init);
    }
}
