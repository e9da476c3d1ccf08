//! Hardware peripheral helpers that survive outside the control loop proper.

pub mod watchdog;
