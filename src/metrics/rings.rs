//! Fixed-capacity cadenced sampling rings backing the pressure-trend,
//! CO2-rate, and PM-spike calculators.
//!
//! Each ring samples at most once per `interval_us`, driven off the
//! monotonic clock rather than a tick counter, per §9's "monotonic deadlines
//! rather than modular counters" design note — a paused scheduler skips
//! samples instead of skewing the grid.

use std::collections::VecDeque;

pub struct CadencedRing<const N: usize> {
    interval_us: u64,
    last_sample_us: Option<u64>,
    samples: VecDeque<(u64, f32)>,
}

impl<const N: usize> CadencedRing<N> {
    pub fn new(interval_us: u64) -> Self {
        Self {
            interval_us,
            last_sample_us: None,
            samples: VecDeque::with_capacity(N),
        }
    }

    pub fn maybe_sample(&mut self, now_us: u64, value: f32) {
        if let Some(last) = self.last_sample_us {
            if now_us.saturating_sub(last) < self.interval_us {
                return;
            }
        }
        self.last_sample_us = Some(now_us);
        if self.samples.len() == N {
            self.samples.pop_front();
        }
        self.samples.push_back((now_us, value));
    }

    /// `(oldest_value, latest_value, span_seconds)` over every retained
    /// sample, or `None` with fewer than two samples.
    pub fn oldest_latest_span(&self) -> Option<(f32, f32, f64)> {
        let oldest = self.samples.front()?;
        let latest = self.samples.back()?;
        if oldest.0 == latest.0 {
            return None;
        }
        let span_s = (latest.0 - oldest.0) as f64 / 1_000_000.0;
        Some((oldest.1, latest.1, span_s))
    }

    /// Same as `oldest_latest_span` but restricted to samples within
    /// `window_s` seconds of the latest sample.
    pub fn oldest_latest_span_within(&self, window_s: f64) -> Option<(f32, f32, f64)> {
        let latest = *self.samples.back()?;
        let window_us = (window_s * 1_000_000.0) as u64;
        let cutoff = latest.0.saturating_sub(window_us);
        let oldest = self.samples.iter().find(|(ts, _)| *ts >= cutoff)?;
        if oldest.0 == latest.0 {
            return None;
        }
        let span_s = (latest.0 - oldest.0) as f64 / 1_000_000.0;
        Some((oldest.1, latest.1, span_s))
    }

    /// Mean of every sample within `window_s` seconds of the latest one.
    pub fn mean_within(&self, window_s: f64) -> Option<f32> {
        let latest = *self.samples.back()?;
        let window_us = (window_s * 1_000_000.0) as u64;
        let cutoff = latest.0.saturating_sub(window_us);
        let mut sum = 0.0_f32;
        let mut count = 0u32;
        for &(ts, value) in &self.samples {
            if ts >= cutoff {
                sum += value;
                count += 1;
            }
        }
        (count > 0).then_some(sum / count as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_sample_cadence() {
        let mut ring: CadencedRing<4> = CadencedRing::new(1_000_000);
        ring.maybe_sample(0, 1.0);
        ring.maybe_sample(500_000, 2.0); // too soon, dropped
        ring.maybe_sample(1_000_000, 3.0);
        assert_eq!(ring.samples.len(), 2);
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut ring: CadencedRing<2> = CadencedRing::new(1);
        ring.maybe_sample(0, 1.0);
        ring.maybe_sample(10, 2.0);
        ring.maybe_sample(20, 3.0);
        assert_eq!(ring.samples.len(), 2);
        assert_eq!(ring.samples.front().unwrap().1, 2.0);
    }
}
