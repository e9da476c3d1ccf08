//! Unified error types for the IAQ firmware.
//!
//! A single `Error` enum that every subsystem funnels into, keeping the
//! control loop's error handling uniform. All variants are `Copy` so they
//! move cheaply through the coordinator and fusion/metrics stages without
//! allocation. Every sub-enum variant names the taxonomy case it represents
//! via [`ErrorKind`], so callers can classify an error without matching on
//! the concrete sub-enum.

use core::fmt;

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// The eight error categories every fallible operation maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArg,
    InvalidState,
    Timeout,
    NotReady,
    Transient,
    Fatal,
    NoMemory,
    NotSupported,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidArg => "invalid argument",
            Self::InvalidState => "invalid state",
            Self::Timeout => "timeout",
            Self::NotReady => "not ready",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
            Self::NoMemory => "no memory",
            Self::NotSupported => "not supported",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Sensor(SensorError),
    Fusion(FusionError),
    History(HistoryError),
    Coordinator(CoordinatorError),
    Publish(PublishError),
    Storage(StorageError),
    Config(ConfigError),
}

impl Error {
    /// Which of the eight taxonomy cases this error represents.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Sensor(e) => e.kind(),
            Self::Fusion(e) => e.kind(),
            Self::History(e) => e.kind(),
            Self::Coordinator(e) => e.kind(),
            Self::Publish(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Config(e) => e.kind(),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Fusion(e) => write!(f, "fusion: {e}"),
            Self::History(e) => write!(f, "history: {e}"),
            Self::Coordinator(e) => write!(f, "coordinator: {e}"),
            Self::Publish(e) => write!(f, "publish: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor driver errors (§4.2, §7)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    InvalidArg(&'static str),
    Timeout,
    NotReady,
    Transient(&'static str),
    Fatal(&'static str),
}

impl SensorError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArg(_) => ErrorKind::InvalidArg,
            Self::Timeout => ErrorKind::Timeout,
            Self::NotReady => ErrorKind::NotReady,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg(msg) => write!(f, "invalid argument: {msg}"),
            Self::Timeout => write!(f, "read timed out"),
            Self::NotReady => write!(f, "sensor not ready"),
            Self::Transient(msg) => write!(f, "transient failure: {msg}"),
            Self::Fatal(msg) => write!(f, "fatal failure: {msg}"),
        }
    }
}

impl std::error::Error for SensorError {}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Fusion stage errors (§4.3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionError {
    /// A persisted coefficient was set outside its documented range.
    InvalidArg(&'static str),
}

impl FusionError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArg(_) => ErrorKind::InvalidArg,
        }
    }
}

impl fmt::Display for FusionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg(msg) => write!(f, "invalid coefficient: {msg}"),
        }
    }
}

impl std::error::Error for FusionError {}

impl From<FusionError> for Error {
    fn from(e: FusionError) -> Self {
        Self::Fusion(e)
    }
}

// ---------------------------------------------------------------------------
// History store errors (§4.6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    InvalidArg(&'static str),
    NoMemory,
}

impl HistoryError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArg(_) => ErrorKind::InvalidArg,
            Self::NoMemory => ErrorKind::NoMemory,
        }
    }
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg(msg) => write!(f, "invalid query: {msg}"),
            Self::NoMemory => write!(f, "allocation failed"),
        }
    }
}

impl std::error::Error for HistoryError {}

impl From<HistoryError> for Error {
    fn from(e: HistoryError) -> Self {
        Self::History(e)
    }
}

// ---------------------------------------------------------------------------
// Coordinator errors (§4.5, §5)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorError {
    InvalidArg(&'static str),
    InvalidState(&'static str),
    Timeout,
    NotSupported,
}

impl CoordinatorError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArg(_) => ErrorKind::InvalidArg,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Timeout => ErrorKind::Timeout,
            Self::NotSupported => ErrorKind::NotSupported,
        }
    }
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg(msg) => write!(f, "invalid argument: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::Timeout => write!(f, "command timed out"),
            Self::NotSupported => write!(f, "unsupported command"),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl From<CoordinatorError> for Error {
    fn from(e: CoordinatorError) -> Self {
        Self::Coordinator(e)
    }
}

// ---------------------------------------------------------------------------
// Publisher errors (§4.7) — reserved; builders never fail in practice.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    NotSupported,
}

impl PublishError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSupported => ErrorKind::NotSupported,
        }
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSupported => write!(f, "payload kind not supported"),
        }
    }
}

impl std::error::Error for PublishError {}

impl From<PublishError> for Error {
    fn from(e: PublishError) -> Self {
        Self::Publish(e)
    }
}

// ---------------------------------------------------------------------------
// Key/value persistence errors (§6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Corrupted,
    Full,
    IoError,
}

impl StorageError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::InvalidState,
            Self::Corrupted | Self::IoError => ErrorKind::Transient,
            Self::Full => ErrorKind::NoMemory,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Corrupted => write!(f, "stored value corrupted"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "storage I/O error"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    OutOfRange(&'static str),
    InvalidTierRatio,
}

impl ConfigError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfRange(_) | Self::InvalidTierRatio => ErrorKind::InvalidArg,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange(field) => write!(f, "{field} out of range"),
            Self::InvalidTierRatio => {
                write!(f, "history tier resolutions must be integer multiples")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_error_kinds_map_to_taxonomy() {
        assert_eq!(SensorError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(SensorError::NotReady.kind(), ErrorKind::NotReady);
        assert_eq!(
            SensorError::Transient("framing").kind(),
            ErrorKind::Transient
        );
        assert_eq!(SensorError::Fatal("dead").kind(), ErrorKind::Fatal);
    }

    #[test]
    fn top_level_error_forwards_kind() {
        let e: Error = SensorError::Timeout.into();
        assert_eq!(e.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn config_error_is_invalid_arg() {
        assert_eq!(ConfigError::InvalidTierRatio.kind(), ErrorKind::InvalidArg);
    }
}
