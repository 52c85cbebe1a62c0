//! Tile allocator.
//!
//! For a chosen card and requested tile count, picks concrete tile indices
//! honoring disabled/descheduled/preferred sets and avoiding in-cycle reuse.
//! Deterministic given identical inputs: every set here is materialized as
//! a sorted sequence before iteration rather than walked in hash order.

use crate::error::GasError;
use crate::resources::NodeTiles;
use std::collections::BTreeSet;

/// Picks `tiles_needed` tile indices on `card`, or fails with `NoTiles`.
///
/// 1. `forbidden = committed ∪ in_cycle ∪ disabled ∪ descheduled`.
/// 2. `available = {0..capacity-1} \ forbidden`, ascending.
/// 3. Fail if `available` is too small.
/// 4. Preferred-first: take `preferred ∩ available` in preferred order,
///    then fill the rest ascending from what's left.
/// 5. Record the chosen indices into `in_cycle_used[card]`.
pub fn allocate(
    card: &str,
    tiles_needed: u32,
    per_card_tile_capacity: u32,
    committed_in_use: &BTreeSet<u32>,
    in_cycle_used: &mut NodeTiles,
    disabled: &BTreeSet<u32>,
    descheduled: &BTreeSet<u32>,
    preferred: &[u32],
) -> Result<Vec<u32>, GasError> {
    if tiles_needed == 0 {
        return Ok(Vec::new());
    }

    let scratch_used = in_cycle_used
        .get(card)
        .cloned()
        .unwrap_or_default();

    let forbidden: BTreeSet<u32> = committed_in_use
        .iter()
        .chain(scratch_used.iter())
        .chain(disabled.iter())
        .chain(descheduled.iter())
        .copied()
        .collect();

    let available: Vec<u32> = (0..per_card_tile_capacity)
        .filter(|i| !forbidden.contains(i))
        .collect();

    if (available.len() as u32) < tiles_needed {
        return Err(GasError::NoTiles(format!(
            "card {card} has {} free tiles, needs {tiles_needed}",
            available.len()
        )));
    }

    let available_set: BTreeSet<u32> = available.iter().copied().collect();
    let mut chosen: Vec<u32> = Vec::with_capacity(tiles_needed as usize);

    for &pref in preferred {
        if chosen.len() as u32 >= tiles_needed {
            break;
        }
        if available_set.contains(&pref) && !chosen.contains(&pref) {
            chosen.push(pref);
        }
    }

    for idx in available {
        if chosen.len() as u32 >= tiles_needed {
            break;
        }
        if !chosen.contains(&idx) {
            chosen.push(idx);
        }
    }

    let entry = in_cycle_used.entry(card.to_string()).or_default();
    for &idx in &chosen {
        entry.insert(idx);
    }

    Ok(chosen)
}
