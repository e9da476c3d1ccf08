//! ESP32 time adapter.
//!
//! Provides monotonic time queries plus wall-clock hour-of-day for the ABC
//! night window (§4.3, §6's "monotonic microsecond counter and a wall-clock
//! marked set only after time-sync").
//!
//! - **`target_os = "espidf"`** — wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`** — uses `std::time::Instant` for
//!   host-side testing and simulation.

/// Clock boundary the coordinator loop drives itself with (§6). Narrowed to
/// exactly what `Coordinator::tick` and the history appender need.
pub trait ClockPort {
    fn uptime_us(&self) -> u64;
    fn uptime_secs(&self) -> u64;
    fn current_hour(&self) -> Option<u8>;
}

/// Time adapter for the ESP32-S3 platform.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Seconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_secs(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000_000
    }

    /// Seconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    /// Microseconds since boot (monotonic, wraps at `u64::MAX`).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since boot (monotonic, wraps at `u64::MAX`).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Current hour-of-day (0–23) from system clock. `None` if wall clock not synced (e.g. pre-NTP).
    #[cfg(target_os = "espidf")]
    pub fn current_hour(&self) -> Option<u8> {
        use core::ptr;
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, ptr::null_mut()) } != 0 {
            return None;
        }
        // Reject obviously unsynced time (e.g. before 2020-01-01)
        const EPOCH_2020: i64 = 1_577_836_800;
        if tv.tv_sec < EPOCH_2020 {
            return None;
        }
        let secs = tv.tv_sec as esp_idf_svc::sys::time_t;
        let mut tm: esp_idf_svc::sys::tm = unsafe { core::mem::zeroed() };
        if unsafe { esp_idf_svc::sys::localtime_r(&secs, &mut tm) }.is_null() {
            return None;
        }
        let hour = tm.tm_hour;
        if hour < 0 || hour > 23 {
            return None;
        }
        Some(hour as u8)
    }

    /// Current hour-of-day. On non-ESP targets (simulation) always `None`.
    #[cfg(not(target_os = "espidf"))]
    pub fn current_hour(&self) -> Option<u8> {
        None
    }
}

impl ClockPort for Esp32TimeAdapter {
    fn uptime_us(&self) -> u64 {
        self.uptime_us()
    }

    fn uptime_secs(&self) -> u64 {
        self.uptime_secs()
    }

    fn current_hour(&self) -> Option<u8> {
        self.current_hour()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_monotonic() {
        let clock = Esp32TimeAdapter::new();
        let a = clock.uptime_us();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = clock.uptime_us();
        assert!(b >= a);
    }

    #[test]
    fn sim_current_hour_is_unsynced() {
        let clock = Esp32TimeAdapter::new();
        assert_eq!(ClockPort::current_hour(&clock), None);
    }
}
