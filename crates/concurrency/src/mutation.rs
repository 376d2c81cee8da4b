//! Mutation application
//!
//! Computes the value a key holds after one mutation. Substrates call this
//! for every mutation of a validated commit, in order, so later mutations on
//! the same key observe earlier ones.

use crate::transaction::MutationKind;
use stratadex_core::{Error, RawValue, Result};

/// Apply `kind` to the key's current value
///
/// Returns `None` when the key ends up deleted.
pub fn apply_mutation(kind: &MutationKind, current: Option<&RawValue>) -> Result<Option<RawValue>> {
    match kind {
        MutationKind::Set(value) => Ok(Some(value.clone())),
        MutationKind::Delete => Ok(None),
        MutationKind::Sum(operand) => {
            let base = counter_operand(kind, current)?.unwrap_or(0);
            Ok(Some(RawValue::U64(base.wrapping_add(*operand))))
        }
        MutationKind::Min(operand) => {
            let next = match counter_operand(kind, current)? {
                Some(base) => base.min(*operand),
                None => *operand,
            };
            Ok(Some(RawValue::U64(next)))
        }
        MutationKind::Max(operand) => {
            let next = match counter_operand(kind, current)? {
                Some(base) => base.max(*operand),
                None => *operand,
            };
            Ok(Some(RawValue::U64(next)))
        }
    }
}

fn counter_operand(kind: &MutationKind, current: Option<&RawValue>) -> Result<Option<u64>> {
    match current {
        None => Ok(None),
        Some(RawValue::U64(n)) => Ok(Some(*n)),
        Some(RawValue::Bytes(_)) => Err(Error::unsupported(
            kind.name(),
            "target key does not hold a 64-bit counter",
        )),
    }
}
