//! Commit-rule properties
//!
//! Validation and mutation application are pure, so these run without a
//! substrate: a `HashMap` stands in for stored versionstamps and values.

use std::collections::HashMap;

use proptest::prelude::*;
use stratadex_concurrency::{
    apply_mutation, validate_checks, validate_limits, AtomicTransaction, Check, ConflictType,
    Enqueue, MutationKind,
};
use stratadex_core::{Key, Limits, RawValue, Versionstamp};

fn key(name: &str) -> Key {
    Key::from_parts([name])
}

fn vs(n: u64) -> Versionstamp {
    Versionstamp::from_sequence(n)
}

// ========== Validation ==========

#[test]
fn test_every_failed_check_is_reported() {
    let store: HashMap<Key, Versionstamp> = [(key("a"), vs(1)), (key("b"), vs(2))].into();
    let checks = vec![
        Check::absent(key("a")),
        Check::at(key("b"), vs(1)),
        Check::at(key("c"), vs(3)),
        Check::absent(key("d")),
    ];
    let result = validate_checks(&checks, |k| store.get(k).copied());

    assert_eq!(result.conflict_count(), 3);
    assert!(matches!(result.conflicts[0], ConflictType::KeyExists { .. }));
    assert!(matches!(result.conflicts[1], ConflictType::VersionstampMismatch { .. }));
    assert!(matches!(result.conflicts[2], ConflictType::KeyMissing { .. }));
    assert_eq!(result.conflicts[2].key(), &key("c"));
}

#[test]
fn test_blind_writes_never_conflict() {
    let mut txn = AtomicTransaction::new();
    txn.set(key("a"), RawValue::Bytes(vec![1])).delete(key("b")).sum(key("c"), 1);
    let result = validate_checks(txn.checks(), |_| Some(vs(9)));
    assert!(result.is_valid());
}

#[test]
fn test_limits_reject_oversized_commits() {
    let limits = Limits::with_small_limits();

    let mut too_many = AtomicTransaction::new();
    for i in 0..=limits.max_mutations {
        too_many.delete(key(&format!("k{i}")));
    }
    assert!(validate_limits(&too_many, &limits).is_err());

    let mut big_value = AtomicTransaction::new();
    big_value.set(key("a"), RawValue::Bytes(vec![0; limits.max_value_bytes + 1]));
    assert!(validate_limits(&big_value, &limits).is_err());

    let mut big_message = AtomicTransaction::new();
    big_message.enqueue(Enqueue::new(vec![0; limits.max_value_bytes + 1]));
    assert!(validate_limits(&big_message, &limits).is_err());

    let mut fits = AtomicTransaction::new();
    fits.check(key("a"), None)
        .set(key("a"), RawValue::Bytes(vec![0; limits.max_value_bytes]));
    assert!(validate_limits(&fits, &limits).is_ok());
}

#[test]
fn test_extend_keeps_order() {
    let mut first = AtomicTransaction::new();
    first.check(key("a"), None).set(key("a"), RawValue::U64(1));
    let mut second = AtomicTransaction::new();
    second.check(key("b"), Some(vs(4))).delete(key("b"));
    first.extend(second);

    let pending = first.pending();
    assert_eq!((pending.checks, pending.mutations, pending.enqueues), (2, 2, 0));
    assert_eq!(first.mutations()[1].kind, MutationKind::Delete);
}

// ========== Properties ==========

proptest! {
    #[test]
    fn prop_check_passes_only_on_exact_state(
        expected in proptest::option::of(0u64..4),
        current in proptest::option::of(0u64..4),
    ) {
        let check = Check { key: key("k"), versionstamp: expected.map(vs) };
        let result = validate_checks(std::slice::from_ref(&check), |_| current.map(vs));
        prop_assert_eq!(result.is_valid(), expected == current);
    }

    #[test]
    fn prop_sum_is_wrapping_addition(start in any::<u64>(), ops in proptest::collection::vec(any::<u64>(), 0..8)) {
        let mut cell = Some(RawValue::U64(start));
        let mut expected = start;
        for op in &ops {
            cell = apply_mutation(&MutationKind::Sum(*op), cell.as_ref()).unwrap();
            expected = expected.wrapping_add(*op);
        }
        prop_assert_eq!(cell, Some(RawValue::U64(expected)));
    }

    #[test]
    fn prop_min_max_track_extremes(ops in proptest::collection::vec(any::<u64>(), 1..8)) {
        let mut low = None;
        let mut high = None;
        for op in &ops {
            low = apply_mutation(&MutationKind::Min(*op), low.as_ref()).unwrap();
            high = apply_mutation(&MutationKind::Max(*op), high.as_ref()).unwrap();
        }
        prop_assert_eq!(low, ops.iter().min().copied().map(RawValue::U64));
        prop_assert_eq!(high, ops.iter().max().copied().map(RawValue::U64));
    }

    #[test]
    fn prop_counter_ops_reject_byte_cells(bytes in proptest::collection::vec(any::<u8>(), 0..16), op in any::<u64>()) {
        let cell = RawValue::Bytes(bytes);
        for kind in [MutationKind::Sum(op), MutationKind::Min(op), MutationKind::Max(op)] {
            prop_assert!(apply_mutation(&kind, Some(&cell)).is_err());
        }
    }
}
