//! Crash logging and runtime diagnostics.
//!
//! Stores up to 4 crash entries in a persisted ring buffer under the
//! `"crash"` namespace ([`crate::persistence`]). Each entry captures
//! timestamp, reason, and — for a coordinator sensor moving to `Error` — the
//! sensor id. A custom panic handler writes an entry before the default
//! panic hook aborts; `CrashLog::record_fatal` does the same for a sensor
//! FSM's `Ready/Warming -> Error` transition, so both firmware panics and
//! coordinator-observed hardware failures end up in the same ring the
//! `health` publisher surfaces.

use serde::{Deserialize, Serialize};

use crate::persistence::StoragePort;

const CRASH_RING_SLOTS: usize = 4;
const CRASH_KEY_PREFIX: &str = "crash";
const CRASH_INDEX_KEY: &str = "crash_idx";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashEntry {
    pub uptime_secs: u64,
    pub reason: heapless::String<64>,
}

impl CrashEntry {
    pub fn new(uptime_secs: u64, reason: &str) -> Self {
        let mut r = heapless::String::new();
        let _ = r.push_str(&reason[..reason.len().min(63)]);
        Self {
            uptime_secs,
            reason: r,
        }
    }
}

/// Persisted ring buffer for crash and fatal-sensor-transition entries.
#[derive(Default)]
pub struct CrashLog {
    write_index: usize,
}

impl CrashLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the write index from storage, or default to 0.
    pub fn init(&mut self, storage: &dyn StoragePort) {
        let mut buf = [0u8; 4];
        if let Ok(4) = storage.read_raw(CRASH_KEY_PREFIX, CRASH_INDEX_KEY, &mut buf) {
            self.write_index = u32::from_le_bytes(buf) as usize % CRASH_RING_SLOTS;
        }
    }

    /// Write a crash entry to the next ring slot and advance the index.
    pub fn write_entry(&mut self, storage: &dyn StoragePort, entry: &CrashEntry) {
        let slot_key = Self::slot_key(self.write_index);
        if let Ok(bytes) = postcard::to_allocvec(entry) {
            let _ = storage.write_raw(CRASH_KEY_PREFIX, &slot_key, &bytes);
        }

        self.write_index = (self.write_index + 1) % CRASH_RING_SLOTS;
        let idx_bytes = (self.write_index as u32).to_le_bytes();
        let _ = storage.write_raw(CRASH_KEY_PREFIX, CRASH_INDEX_KEY, &idx_bytes);
    }

    /// Record a coordinator sensor's fatal transition, in the same ring as
    /// firmware panics.
    pub fn record_fatal(&mut self, storage: &dyn StoragePort, uptime_secs: u64, sensor: &str) {
        let reason = format!("sensor fatal: {sensor}");
        self.write_entry(storage, &CrashEntry::new(uptime_secs, &reason));
    }

    /// Read all stored crash entries (up to 4).
    pub fn read_all(&self, storage: &dyn StoragePort) -> heapless::Vec<CrashEntry, 4> {
        let mut entries = heapless::Vec::new();
        for i in 0..CRASH_RING_SLOTS {
            let slot_key = Self::slot_key(i);
            let mut buf = [0u8; 128];
            if let Ok(len) = storage.read_raw(CRASH_KEY_PREFIX, &slot_key, &mut buf) {
                if let Ok(entry) = postcard::from_bytes::<CrashEntry>(&buf[..len]) {
                    let _ = entries.push(entry);
                }
            }
        }
        entries
    }

    /// Erase all crash entries and reset the index.
    pub fn clear(&mut self, storage: &dyn StoragePort) {
        for i in 0..CRASH_RING_SLOTS {
            let slot_key = Self::slot_key(i);
            let _ = storage.delete(CRASH_KEY_PREFIX, &slot_key);
        }
        let _ = storage.delete(CRASH_KEY_PREFIX, CRASH_INDEX_KEY);
        self.write_index = 0;
    }

    pub fn count(&self, storage: &dyn StoragePort) -> usize {
        (0..CRASH_RING_SLOTS)
            .filter(|i| storage.exists(CRASH_KEY_PREFIX, &Self::slot_key(*i)))
            .count()
    }

    fn slot_key(index: usize) -> heapless::String<16> {
        let mut s = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut s, format_args!("e{index}"));
        s
    }
}

/// Runtime diagnostics snapshot collected on-demand for the `health`
/// publisher's `internal_free`/`spiram_free`/`wifi_rssi` fields (§4.7).
#[derive(Debug, Clone)]
pub struct RuntimeMetrics {
    pub uptime_secs: u64,
    pub heap_free: u32,
    pub heap_min_free: u32,
    pub wifi_rssi: i8,
}

impl RuntimeMetrics {
    #[cfg(target_os = "espidf")]
    pub fn collect(uptime_secs: u64) -> Self {
        use esp_idf_svc::sys::*;
        let heap_free = unsafe { esp_get_free_heap_size() };
        let heap_min = unsafe { esp_get_minimum_free_heap_size() };
        let wifi_rssi = Self::read_wifi_rssi();

        Self {
            uptime_secs,
            heap_free,
            heap_min_free: heap_min,
            wifi_rssi,
        }
    }

    #[cfg(target_os = "espidf")]
    fn read_wifi_rssi() -> i8 {
        use esp_idf_svc::sys::*;
        let mut ap_info: wifi_ap_record_t = unsafe { core::mem::zeroed() };
        let ret = unsafe { esp_wifi_sta_get_ap_info(&mut ap_info) };
        if ret == ESP_OK { ap_info.rssi } else { 0 }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn collect(uptime_secs: u64) -> Self {
        let base_free: u32 = 307_200;
        let decay = (uptime_secs / 60) as u32 * 512;
        let heap_free = base_free.saturating_sub(decay);
        let heap_min_free = (heap_free as f32 * 0.85) as u32;

        Self {
            uptime_secs,
            heap_free,
            heap_min_free,
            wifi_rssi: -60,
        }
    }
}

// ---------------------------------------------------------------------------
// Custom panic handler — writes a CrashEntry before the default hook aborts.
// ---------------------------------------------------------------------------

/// Install a panic hook that persists crash info before the reset.
///
/// Must be called once during init, after persistence is ready.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        log::error!("PANIC: {reason}");

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: esp_timer_get_time is a simple RTC counter read, safe
            // from panic context.
            let uptime = (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000_000;
            let entry = CrashEntry::new(uptime, reason);

            match crate::persistence::NvsStorage::new() {
                Ok(storage) => {
                    let mut crash_log = CrashLog::new();
                    crash_log.init(&storage);
                    crash_log.write_entry(&storage, &entry);
                }
                Err(_) => {
                    log::error!("Panic handler: persistence unavailable — crash entry not saved");
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            log::error!("Crash entry (simulation): {reason}");
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::NvsStorage;

    #[test]
    fn crash_log_starts_at_zero() {
        let log = CrashLog::new();
        assert_eq!(log.write_index, 0);
    }

    #[test]
    fn write_and_read_single_entry() {
        let storage = NvsStorage::new().unwrap();
        let mut log = CrashLog::new();
        let entry = CrashEntry::new(42, "test panic");

        log.write_entry(&storage, &entry);
        let entries = log.read_all(&storage);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].uptime_secs, 42);
    }

    #[test]
    fn ring_buffer_wraps() {
        let storage = NvsStorage::new().unwrap();
        let mut log = CrashLog::new();

        for i in 0..6 {
            log.write_entry(&storage, &CrashEntry::new(i as u64, &format!("crash_{i}")));
        }
        let entries = log.read_all(&storage);
        assert_eq!(entries.len(), CRASH_RING_SLOTS);
    }

    #[test]
    fn clear_erases_all() {
        let storage = NvsStorage::new().unwrap();
        let mut log = CrashLog::new();

        log.write_entry(&storage, &CrashEntry::new(1, "x"));
        log.write_entry(&storage, &CrashEntry::new(2, "y"));
        log.clear(&storage);

        let entries = log.read_all(&storage);
        assert_eq!(entries.len(), 0);
        assert_eq!(log.write_index, 0);
    }

    #[test]
    fn crash_entry_truncates_long_reason() {
        let long = "a".repeat(200);
        let entry = CrashEntry::new(0, &long);
        assert!(entry.reason.len() <= 63);
    }

    #[test]
    fn count_matches_entries() {
        let storage = NvsStorage::new().unwrap();
        let mut log = CrashLog::new();

        assert_eq!(log.count(&storage), 0);
        log.write_entry(&storage, &CrashEntry::new(1, "a"));
        assert_eq!(log.count(&storage), 1);
        log.write_entry(&storage, &CrashEntry::new(2, "b"));
        assert_eq!(log.count(&storage), 2);
    }

    #[test]
    fn record_fatal_prefixes_sensor_name() {
        let storage = NvsStorage::new().unwrap();
        let mut log = CrashLog::new();
        log.record_fatal(&storage, 100, "co2");
        let entries = log.read_all(&storage);
        assert!(entries[0].reason.contains("co2"));
    }
}
