//! Snapshot differ and patch application.
//!
//! The bridge only ever calls a [`DiffStrategy`]; consumers apply what it
//! produced with the matching [`PatchStrategy`]. The default pair works on
//! top-level keys only.

use crate::types::{ChangeRecord, State};

/// Compares two snapshots and returns the ordered change-set. An empty
/// result means no observable change.
pub type DiffStrategy = fn(&State, &State) -> Vec<ChangeRecord>;

/// Applies a change-set produced by the matching [`DiffStrategy`].
pub type PatchStrategy = fn(&State, &[ChangeRecord]) -> State;

/// Shallow top-level diff.
///
/// Emits `Updated` for every key of `next` (in `next`'s key order) whose
/// value is new or differs from `prev`, then `Removed` for every key of
/// `prev` missing from `next`. Identical inputs always give identical output.
pub fn shallow_diff(prev: &State, next: &State) -> Vec<ChangeRecord> {
    let mut changes = Vec::new();

    for (key, value) in next {
        if prev.get(key) != Some(value) {
            changes.push(ChangeRecord::updated(key.clone(), value.clone()));
        }
    }

    for key in prev.keys() {
        if !next.contains_key(key) {
            changes.push(ChangeRecord::removed(key.clone()));
        }
    }

    changes
}

/// Apply a shallow patch, in order, to a copy of `state`.
pub fn apply_patch(state: &State, patch: &[ChangeRecord]) -> State {
    let mut next = state.clone();

    for record in patch {
        match record {
            ChangeRecord::Updated { key, value } => {
                next.insert(key.clone(), value.clone());
            }
            ChangeRecord::Removed { key } => {
                next.remove(key);
            }
        }
    }

    next
}
