//! Property tests for estimator invariants.
//!
//! Uses proptest to verify:
//! 1. Decoded sub-ranges stay inside their power-of-two bucket
//! 2. Percentile estimates are monotone in the requested ratio
//! 3. Recorded values land inside the range their key decodes to
//! 4. Mahalanobis distance is non-negative and undefined below the sample floor

use std::collections::BTreeMap;

use ksense_core::{
    decode_range, encode_key, estimate_percentiles, key_for_value, score, MahalanobisConfig,
    PickMode,
};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_mode() -> impl Strategy<Value = PickMode> {
    prop_oneof![Just(PickMode::Lower), Just(PickMode::Mid), Just(PickMode::Upper)]
}

fn arb_histogram() -> impl Strategy<Value = BTreeMap<u64, u64>> {
    prop::collection::btree_map(0u64..(40 << 4), 0u64..1_000, 0..40)
}

fn arb_ratios() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.001..=1.0_f64, 1..10)
}

fn arb_reference(rows: std::ops::Range<usize>, dim: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(-100.0..100.0_f64, dim), rows)
}

// ── 1. Decode bounds ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn decoded_range_within_bucket(b in 0u64..=63, s in 0u64..1024, subbits in 1u32..=10) {
        let s = s & ((1u64 << subbits) - 1);
        let r = decode_range(encode_key(b, s, subbits), subbits);
        let lo = 1u128 << b;
        let hi = (1u128 << (b + 1)) - 1;
        prop_assert!(r.lo <= r.hi);
        prop_assert!(u128::from(r.lo) >= lo);
        prop_assert!(u128::from(r.hi) <= hi);
    }

    /// Adjacent slices of a wide bucket tile it without gaps.
    #[test]
    fn wide_bucket_slices_are_contiguous(b in 8u64..=40, s in 0u64..15) {
        let a = decode_range(encode_key(b, s, 4), 4);
        let next = decode_range(encode_key(b, s + 1, 4), 4);
        prop_assert_eq!(a.hi + 1, next.lo);
    }
}

// ── 2. Monotone percentiles ──────────────────────────────────────────

proptest! {
    #[test]
    fn percentiles_non_decreasing(
        hist in arb_histogram(),
        mut ratios in arb_ratios(),
        mode in arb_mode(),
    ) {
        ratios.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let est = estimate_percentiles(hist.clone(), &ratios, 4, mode);
        let values = est.values();
        for pair in values.windows(2) {
            prop_assert!(pair[0] <= pair[1], "{:?} for ratios {:?}", values, ratios);
        }
    }

    /// Insertion order of the snapshot does not matter.
    #[test]
    fn estimate_ignores_entry_order(hist in arb_histogram(), ratios in arb_ratios(), mode in arb_mode()) {
        let forward: Vec<(u64, u64)> = hist.iter().map(|(&k, &c)| (k, c)).collect();
        let reversed: Vec<(u64, u64)> = forward.iter().rev().copied().collect();
        prop_assert_eq!(
            estimate_percentiles(forward, &ratios, 4, mode),
            estimate_percentiles(reversed, &ratios, 4, mode)
        );
    }

    /// Every estimate comes from an occupied key, so it sits in a decoded range.
    #[test]
    fn estimate_is_a_key_value(hist in arb_histogram(), ratios in arb_ratios()) {
        prop_assume!(hist.values().any(|&c| c > 0));
        let est = estimate_percentiles(hist.clone(), &ratios, 4, PickMode::Lower);
        for e in &est {
            prop_assert!(hist.keys().any(|&k| decode_range(k, 4).lo == e.value));
        }
    }
}

// ── 3. Recording round-trip ──────────────────────────────────────────

proptest! {
    #[test]
    fn value_lands_in_its_key_range(v in 1u64..=u64::MAX, subbits in 1u32..=16) {
        let r = decode_range(key_for_value(v, subbits), subbits);
        prop_assert!(r.contains(v), "v={} range={:?}", v, r);
    }
}

// ── 4. Mahalanobis ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn defined_score_is_non_negative(
        reference in arb_reference(30..60, 3),
        x in prop::collection::vec(-200.0..200.0_f64, 3),
    ) {
        if let Some(d) = score(&x, &reference, &MahalanobisConfig::default()) {
            prop_assert!(d >= 0.0);
            prop_assert!(d.is_finite());
        }
    }

    #[test]
    fn undefined_below_sample_floor(
        reference in arb_reference(0..30, 3),
        x in prop::collection::vec(-200.0..200.0_f64, 3),
    ) {
        prop_assert!(score(&x, &reference, &MahalanobisConfig::default()).is_none());
    }

    #[test]
    fn dimension_floor_applies(
        reference in arb_reference(5..12, 10),
        x in prop::collection::vec(-1.0..1.0_f64, 10),
    ) {
        // min_samples 2 but d + 2 = 12 rows still required.
        let cfg = MahalanobisConfig { min_samples: 2, ..Default::default() };
        prop_assert!(score(&x, &reference, &cfg).is_none());
    }

    #[test]
    fn score_is_deterministic(
        reference in arb_reference(30..50, 2),
        x in prop::collection::vec(-200.0..200.0_f64, 2),
    ) {
        let cfg = MahalanobisConfig::default();
        prop_assert_eq!(score(&x, &reference, &cfg), score(&x, &reference, &cfg));
    }
}
