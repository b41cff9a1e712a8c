use crate::constants::{LEGACY_SLOT_PREFIX, SLOT_INDEX_WIDTH, SLOT_PREFIX};
use std::collections::BTreeSet;

pub(crate) fn slot_name(index: usize) -> String {
    format!("{SLOT_PREFIX}-{index:0width$}", width = SLOT_INDEX_WIDTH)
}

/// Recovers the slot index from a canonical (`erk-slot-03`) or legacy
/// (`erk-managed-wt-03`) name.
pub(crate) fn parse_slot_index(name: &str) -> Option<usize> {
    let suffix = [SLOT_PREFIX, LEGACY_SLOT_PREFIX]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix)?.strip_prefix('-'))?;
    if suffix.len() < SLOT_INDEX_WIDTH || !suffix.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let index = suffix.parse::<usize>().ok()?;
    if index == 0 {
        return None;
    }
    Some(index)
}

pub(crate) fn canonical_slot_name(name: &str) -> Option<String> {
    parse_slot_index(name).map(slot_name)
}

pub(crate) fn is_legacy_slot_name(name: &str) -> bool {
    name.starts_with(LEGACY_SLOT_PREFIX) && parse_slot_index(name).is_some()
}

pub(crate) fn slot_names(pool_size: usize) -> impl Iterator<Item = (usize, String)> {
    (1..=pool_size).map(|index| (index, slot_name(index)))
}

pub(crate) fn known_slots(pool_size: usize) -> BTreeSet<String> {
    slot_names(pool_size).map(|(_, name)| name).collect()
}

pub(crate) fn slot_in_pool(name: &str, pool_size: usize) -> bool {
    parse_slot_index(name).is_some_and(|index| index <= pool_size)
}
