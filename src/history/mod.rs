//! History store (C7) — tiered min/max/avg aggregation, per §4.6/§3.3.
//!
//! Grounded in the teacher's `diagnostics::CrashLog`: a fixed-size ring with
//! a write index, generalised here to an in-memory `VecDeque`-backed ring
//! per tier per metric (PSRAM affords this; history data is not named as
//! persisted in §6, unlike `cadence_ms`/`enabled`).
//!
//! `stream()` returns a materialised `Vec` of grouped samples rather than
//! driving header/bucket callbacks — the bounded-heap concern the spec's
//! callback shape manages on a no_std target doesn't apply here, since this
//! crate runs on `std` (`esp-idf-svc`'s `alloc` feature), so a `Vec` is the
//! idiomatic equivalent.

use crate::error::HistoryError;

mod quantize;
mod tier;

pub use quantize::{decode, encode, SENTINEL};
use tier::{Bucket, Tier};

/// The thirteen metrics tracked across all three tiers (§3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryMetric {
    TempC,
    HumidityRh,
    PressureHpa,
    Pm1,
    Pm2_5,
    Pm10,
    Co2Ppm,
    VocIndex,
    NoxIndex,
    McuTempC,
    AqiValue,
    ComfortScore,
    OverallIaqScore,
}

impl HistoryMetric {
    pub const ALL: [HistoryMetric; 13] = [
        Self::TempC,
        Self::HumidityRh,
        Self::PressureHpa,
        Self::Pm1,
        Self::Pm2_5,
        Self::Pm10,
        Self::Co2Ppm,
        Self::VocIndex,
        Self::NoxIndex,
        Self::McuTempC,
        Self::AqiValue,
        Self::ComfortScore,
        Self::OverallIaqScore,
    ];

    const fn index(self) -> usize {
        match self {
            Self::TempC => 0,
            Self::HumidityRh => 1,
            Self::PressureHpa => 2,
            Self::Pm1 => 3,
            Self::Pm2_5 => 4,
            Self::Pm10 => 5,
            Self::Co2Ppm => 6,
            Self::VocIndex => 7,
            Self::NoxIndex => 8,
            Self::McuTempC => 9,
            Self::AqiValue => 10,
            Self::ComfortScore => 11,
            Self::OverallIaqScore => 12,
        }
    }

    /// `(scale, offset)` chosen so `round(value*scale) + offset` fits `i16`.
    const fn scale_offset(self) -> (f32, i16) {
        match self {
            Self::TempC | Self::McuTempC => (100.0, 0),
            Self::HumidityRh => (100.0, 0),
            Self::PressureHpa => (10.0, 0),
            Self::Pm1 | Self::Pm2_5 | Self::Pm10 => (10.0, 0),
            Self::Co2Ppm => (1.0, 0),
            Self::VocIndex | Self::NoxIndex => (1.0, 0),
            Self::AqiValue => (1.0, 0),
            Self::ComfortScore => (1.0, 0),
            Self::OverallIaqScore => (1.0, 0),
        }
    }
}

const METRIC_COUNT: usize = 13;
const TIER_COUNT: usize = 3;

/// `(resolution_s, window_s)` per tier, defaults from §3.3/§6.
#[derive(Debug, Clone, Copy)]
pub struct TierConfig {
    pub resolution_s: u32,
    pub window_s: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BucketSample {
    pub start_s: u64,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub avg: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct StreamHeader {
    pub tier: u8,
    pub resolution_s: u32,
    pub group_factor: u32,
    pub bucket_count: usize,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub header: StreamHeader,
    pub buckets: Vec<BucketSample>,
}

struct MetricTiers {
    tiers: [Tier; TIER_COUNT],
}

pub struct HistoryStore {
    metrics: [MetricTiers; METRIC_COUNT],
}

impl HistoryStore {
    pub fn new(t1: TierConfig, t2: TierConfig, t3: TierConfig) -> Result<Self, HistoryError> {
        if t2.resolution_s % t1.resolution_s != 0 || t3.resolution_s % t2.resolution_s != 0 {
            return Err(HistoryError::InvalidArg("tier resolution ratio"));
        }
        let make = || MetricTiers {
            tiers: [
                Tier::new(t1.resolution_s, t1.window_s),
                Tier::new(t2.resolution_s, t2.window_s),
                Tier::new(t3.resolution_s, t3.window_s),
            ],
        };
        Ok(Self {
            metrics: std::array::from_fn(|_| make()),
        })
    }

    /// Append one snapshot's worth of values, keyed by `now_s` (wall/mono
    /// seconds). Idempotent within one tier-1 bucket: repeated calls with
    /// the same `now_s` just keep merging into the same bucket.
    pub fn append(&mut self, now_s: u64, values: &[(HistoryMetric, Option<f32>)]) {
        for &(metric, value) in values {
            let (scale, offset) = metric.scale_offset();
            let code = value.map_or(SENTINEL, |v| encode(v, scale, offset));
            let mt = &mut self.metrics[metric.index()];
            if let Some(completed1) = mt.tiers[0].push(now_s, code) {
                if let Some(completed2) = mt.tiers[1].merge_completed(completed1) {
                    mt.tiers[2].merge_completed(completed2);
                }
            }
        }
    }

    pub fn stream(
        &self,
        metric: HistoryMetric,
        start_s: u64,
        end_s: u64,
        max_points: usize,
    ) -> Result<StreamResult, HistoryError> {
        if end_s <= start_s || max_points == 0 {
            return Err(HistoryError::InvalidArg("empty or zero-width range"));
        }
        let range_s = end_s - start_s;
        let tier_idx = if range_s <= 3_600 {
            0
        } else if range_s <= 86_400 {
            1
        } else {
            2
        };

        let (scale, offset) = metric.scale_offset();
        let tier = &self.metrics[metric.index()].tiers[tier_idx];
        let raw: Vec<(u64, Bucket)> = tier
            .buckets_in_range(start_s, end_s)
            .map(|(start, bucket)| (start, *bucket))
            .collect();

        let group_factor = raw.len().div_ceil(max_points).max(1) as u32;
        let resolution_s = tier.resolution_s();

        let mut buckets = Vec::with_capacity(raw.len().div_ceil(group_factor as usize));
        for chunk in raw.chunks(group_factor as usize) {
            let merged = chunk
                .iter()
                .fold(Bucket::empty(), |acc, (_, b)| Bucket::merge(acc, *b));
            let start_s = chunk.first().map_or(start_s, |(s, _)| *s);
            buckets.push(BucketSample {
                start_s,
                min: decode(merged.min_or_sentinel(), scale, offset),
                max: decode(merged.max_or_sentinel(), scale, offset),
                avg: decode(merged.avg(), scale, offset),
            });
        }

        Ok(StreamResult {
            header: StreamHeader {
                tier: tier_idx as u8 + 1,
                resolution_s: resolution_s * group_factor,
                group_factor,
                bucket_count: buckets.len(),
            },
            buckets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_store() -> HistoryStore {
        HistoryStore::new(
            TierConfig {
                resolution_s: 1,
                window_s: 3_600,
            },
            TierConfig {
                resolution_s: 60,
                window_s: 86_400,
            },
            TierConfig {
                resolution_s: 600,
                window_s: 7 * 86_400,
            },
        )
        .unwrap()
    }

    #[test]
    fn rejects_non_integer_tier_ratio() {
        let result = HistoryStore::new(
            TierConfig {
                resolution_s: 2,
                window_s: 100,
            },
            TierConfig {
                resolution_s: 7,
                window_s: 100,
            },
            TierConfig {
                resolution_s: 14,
                window_s: 100,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn co2_grouping_matches_scenario() {
        let mut store = small_store();
        for i in 0..120u64 {
            let co2 = 400.0 + (i as f32 / 119.0) * 120.0;
            store.append(i, &[(HistoryMetric::Co2Ppm, Some(co2))]);
        }
        let result = store
            .stream(HistoryMetric::Co2Ppm, 30, 120, 30)
            .unwrap();
        assert_eq!(result.header.tier, 1);
        assert!(!result.buckets.is_empty());
        let last = result.buckets.last().unwrap();
        assert!(last.avg.unwrap() > 500.0);
    }

    #[test]
    fn stream_rejects_empty_range() {
        let store = small_store();
        assert!(store.stream(HistoryMetric::TempC, 10, 10, 30).is_err());
    }
}
