//! Percentiles from a sub-bucketed power-of-two histogram.
//!
//! Values are recorded under a composite key `(b << subbits) | s`, where `b`
//! is the power-of-two bucket (`[2^b, 2^(b+1) - 1]`) and `s` selects one of
//! `2^subbits` equal-width slices of that bucket. Memory is one counter per
//! occupied key regardless of the value range; relative error is bounded by
//! the slice width, which grows geometrically with `b`.
//!
//! The estimator reads an immutable snapshot of `key -> count` pairs and
//! answers every requested percentile in one ascending pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of sub-bucket bits (16 slices per power-of-two range).
pub const DEFAULT_SUBBITS: u32 = 4;

/// Largest supported `subbits`; larger values are clamped.
pub const MAX_SUBBITS: u32 = 32;

/// Largest bucket exponent whose range fits in a `u64`.
pub const MAX_BUCKET_EXPONENT: u64 = 63;

/// Bias added to `total * p` before flooring the rank target.
///
/// Rounds fractional ranks up so a target is always reachable while staying
/// at or below `total`.
pub const RANK_BIAS: f64 = 0.999999;

/// Which point of a sub-bucket's range represents it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickMode {
    /// Lower edge of the slice.
    Lower,
    /// Floor of the midpoint of the slice.
    #[default]
    Mid,
    /// Upper edge of the slice.
    Upper,
}

impl std::str::FromStr for PickMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lower" => Ok(PickMode::Lower),
            "mid" => Ok(PickMode::Mid),
            "upper" => Ok(PickMode::Upper),
            other => Err(format!("unknown pick mode '{other}' (expected lower, mid, upper)")),
        }
    }
}

/// Inclusive integer range covered by one histogram key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubRange {
    pub lo: u64,
    pub hi: u64,
}

impl SubRange {
    pub fn contains(&self, value: u64) -> bool {
        self.lo <= value && value <= self.hi
    }

    pub fn pick(&self, mode: PickMode) -> u64 {
        match mode {
            PickMode::Lower => self.lo,
            PickMode::Upper => self.hi,
            // lo + (hi - lo) / 2 == floor((lo + hi) / 2) without overflow
            PickMode::Mid => self.lo + (self.hi - self.lo) / 2,
        }
    }
}

#[inline]
fn clamp_subbits(subbits: u32) -> u32 {
    subbits.min(MAX_SUBBITS)
}

/// Build a key from a bucket exponent and sub-bucket index.
///
/// `sub_index` is masked to `subbits` bits.
pub fn encode_key(bucket_exponent: u64, sub_index: u64, subbits: u32) -> u64 {
    let subbits = clamp_subbits(subbits);
    let mask = (1u64 << subbits) - 1;
    (bucket_exponent << subbits) | (sub_index & mask)
}

/// Split a key into `(bucket_exponent, sub_index)`.
pub fn split_key(key: u64, subbits: u32) -> (u64, u64) {
    let subbits = clamp_subbits(subbits);
    let mask = (1u64 << subbits) - 1;
    (key >> subbits, key & mask)
}

/// Decode the inclusive value range represented by `key`.
///
/// Bucket exponents above [`MAX_BUCKET_EXPONENT`] are treated as the last
/// representable bucket.
pub fn decode_range(key: u64, subbits: u32) -> SubRange {
    let subbits = clamp_subbits(subbits);
    let (b, s) = split_key(key, subbits);
    let b = b.min(MAX_BUCKET_EXPONENT) as u32;

    let slices = 1u128 << subbits;
    let lo = 1u128 << b;
    let hi = (1u128 << (b + 1)) - 1;
    let width = hi - lo + 1;
    let s = s as u128;

    let sub_lo = lo + (width * s) / slices;
    // May fall below sub_lo when the bucket is narrower than the slice count.
    let sub_hi = (lo + (width * (s + 1)) / slices).saturating_sub(1).max(sub_lo);

    SubRange {
        lo: sub_lo as u64,
        hi: sub_hi as u64,
    }
}

/// Representative value of `key` under `mode`.
pub fn pick_value(key: u64, subbits: u32, mode: PickMode) -> u64 {
    decode_range(key, subbits).pick(mode)
}

/// Key under which `value` is recorded. Values below 1 share the first key.
pub fn key_for_value(value: u64, subbits: u32) -> u64 {
    let subbits = clamp_subbits(subbits);
    let value = value.max(1);
    let b = 63 - u64::from(value.leading_zeros());
    let offset = (value - (1u64 << b)) as u128;
    let s = (offset << subbits) >> b;
    encode_key(b, s as u64, subbits)
}

/// One requested percentile and its estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileEstimate {
    pub ratio: f64,
    pub value: u64,
}

/// Estimates in the order the percentiles were requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PercentileEstimates {
    entries: Vec<PercentileEstimate>,
}

impl PercentileEstimates {
    /// Estimate for `ratio`, if it was requested.
    pub fn get(&self, ratio: f64) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.ratio == ratio)
            .map(|e| e.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PercentileEstimate> {
        self.entries.iter()
    }

    pub fn values(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.value).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a PercentileEstimates {
    type Item = &'a PercentileEstimate;
    type IntoIter = std::slice::Iter<'a, PercentileEstimate>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Cumulative count a percentile must reach during the ascending scan.
pub fn rank_target(total: u128, ratio: f64) -> u128 {
    (total as f64 * ratio + RANK_BIAS).floor() as u128
}

/// Estimate `percentiles` from a `key -> count` snapshot.
///
/// An empty (or all-zero) histogram yields 0 for every ratio. Otherwise each
/// ratio resolves to the first key, in ascending order, whose running count
/// reaches its rank target; ratios never reached fall back to the largest key.
pub fn estimate_percentiles<I>(
    histogram: I,
    percentiles: &[f64],
    subbits: u32,
    mode: PickMode,
) -> PercentileEstimates
where
    I: IntoIterator<Item = (u64, u64)>,
{
    let mut buckets: Vec<(u64, u64)> = histogram.into_iter().collect();
    buckets.sort_unstable_by_key(|&(key, _)| key);

    let total: u128 = buckets.iter().map(|&(_, c)| u128::from(c)).sum();
    if total == 0 {
        return PercentileEstimates {
            entries: percentiles
                .iter()
                .map(|&ratio| PercentileEstimate { ratio, value: 0 })
                .collect(),
        };
    }

    let targets: Vec<u128> = percentiles.iter().map(|&p| rank_target(total, p)).collect();
    let mut resolved: Vec<Option<u64>> = vec![None; percentiles.len()];
    let mut pending = percentiles.len();
    let mut running: u128 = 0;

    for &(key, count) in &buckets {
        if pending == 0 {
            break;
        }
        running += u128::from(count);
        for (slot, &target) in resolved.iter_mut().zip(&targets) {
            if slot.is_none() && running >= target {
                *slot = Some(pick_value(key, subbits, mode));
                pending -= 1;
            }
        }
    }

    // `buckets` is non-empty here because total > 0.
    let last_key = buckets[buckets.len() - 1].0;
    let fallback = pick_value(last_key, subbits, mode);

    PercentileEstimates {
        entries: percentiles
            .iter()
            .zip(resolved)
            .map(|(&ratio, value)| PercentileEstimate {
                ratio,
                value: value.unwrap_or(fallback),
            })
            .collect(),
    }
}

/// Error combining two histograms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistogramError {
    #[error("subbits mismatch: expected {expected}, found {found}")]
    SubbitsMismatch { expected: u32, found: u32 },
}

/// Accumulates integer values into sub-bucket keys.
///
/// This is the collector side of the estimator: it owns the counts and hands
/// out snapshots. Keys are kept sorted so a snapshot never needs re-sorting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubBucketHistogram {
    subbits: u32,
    counts: BTreeMap<u64, u64>,
}

impl Default for SubBucketHistogram {
    fn default() -> Self {
        Self::new(DEFAULT_SUBBITS)
    }
}

impl SubBucketHistogram {
    pub fn new(subbits: u32) -> Self {
        Self {
            subbits: clamp_subbits(subbits),
            counts: BTreeMap::new(),
        }
    }

    /// Rebuild from an existing `key -> count` mapping.
    pub fn from_counts(subbits: u32, counts: BTreeMap<u64, u64>) -> Self {
        Self {
            subbits: clamp_subbits(subbits),
            counts,
        }
    }

    pub fn subbits(&self) -> u32 {
        self.subbits
    }

    pub fn record(&mut self, value: u64) {
        self.record_n(value, 1);
    }

    pub fn record_n(&mut self, value: u64, count: u64) {
        if count == 0 {
            return;
        }
        let key = key_for_value(value, self.subbits);
        let slot = self.counts.entry(key).or_insert(0);
        *slot = slot.saturating_add(count);
    }

    /// Add another histogram's counts into this one.
    pub fn merge(&mut self, other: &SubBucketHistogram) -> Result<(), HistogramError> {
        if other.subbits != self.subbits {
            return Err(HistogramError::SubbitsMismatch {
                expected: self.subbits,
                found: other.subbits,
            });
        }
        for (&key, &count) in &other.counts {
            let slot = self.counts.entry(key).or_insert(0);
            *slot = slot.saturating_add(count);
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Total recorded count.
    pub fn total(&self) -> u128 {
        self.counts.values().map(|&c| u128::from(c)).sum()
    }

    /// Number of occupied keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count_at(&self, key: u64) -> u64 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.counts.iter().map(|(&k, &c)| (k, c))
    }

    /// Point-in-time copy of the counts.
    pub fn snapshot(&self) -> BTreeMap<u64, u64> {
        self.counts.clone()
    }

    pub fn percentiles(&self, percentiles: &[f64], mode: PickMode) -> PercentileEstimates {
        estimate_percentiles(self.iter(), percentiles, self.subbits, mode)
    }
}
