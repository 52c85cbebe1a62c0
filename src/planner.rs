//! Placement planner.
//!
//! Iterates over a pod's containers in declaration order, maintaining a
//! per-cycle usage view, producing per-container `(cards, tiles)`
//! assignments or rejecting the whole node.

use crate::cards::{self, CardSelection};
use crate::error::GasError;
use crate::model::PodSpec;
use crate::policy::Policy;
use crate::resources::{self, NodeResources, NodeTiles, ResourceMap, RESOURCE_I915, RESOURCE_TILES};
use crate::tiles;
use std::collections::{BTreeSet, HashMap};
use strum::Display;

/// The per-cycle state machine. Each terminal other than `Committed`
/// leaves no external side effects — this crate enforces that simply by
/// never calling the patch/commit effects from `endpoints` until `plan`
/// has returned `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CycleStage {
    Start,
    PolicyParsed,
    CardsFiltered,
    TilesAssigned,
    Committed,
}

/// One container's resolved placement: the cards it was given, and (if it
/// requested tiles) which tile indices on each card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerPlacement {
    pub cards: Vec<String>,
    pub tiles: HashMap<String, Vec<u32>>,
    pub preferred_used: bool,
}

/// The full per-pod plan, one entry per container in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementPlan {
    pub containers: Vec<ContainerPlacement>,
}

/// Splits `total` tiles across `num_cards` as evenly as possible, earlier
/// cards taking the larger share when it doesn't divide evenly.
pub fn split_tiles(total: u32, num_cards: usize) -> Vec<u32> {
    if num_cards == 0 {
        return Vec::new();
    }
    let mut remaining = total;
    let mut remaining_cards = num_cards as u32;
    let mut shares = Vec::with_capacity(num_cards);
    for _ in 0..num_cards {
        let share = remaining.div_ceil(remaining_cards);
        shares.push(share);
        remaining -= share;
        remaining_cards -= 1;
    }
    shares
}

fn tile_set_for_card(pairs: &std::collections::HashSet<(String, u32)>, card: &str) -> BTreeSet<u32> {
    pairs
        .iter()
        .filter(|(c, _)| c == card)
        .map(|(_, i)| *i)
        .collect()
}

fn per_card_usage_delta(tile_share: u32) -> ResourceMap {
    let mut delta = ResourceMap::new();
    // Occupying a card always consumes one unit of its shared-device
    // count, independent of whether the container explicitly requested
    // i915.
    delta.insert(RESOURCE_I915.to_string(), 1);
    if tile_share > 0 {
        delta.insert(RESOURCE_TILES.to_string(), tile_share as u64);
    }
    delta
}

/// Runs the full placement algorithm for one pod against one node,
/// returning a plan or the first infeasibility encountered. Commits each
/// container's delta into scratch state before the next container is
/// considered.
pub fn plan(
    pod: &PodSpec,
    policy: &Policy,
    committed_resources: &NodeResources,
    committed_tiles: &NodeTiles,
    per_card_capacity: &ResourceMap,
    balanced_resource: Option<&str>,
    namespace_prefix: &str,
    allow_duplicates: bool,
) -> Result<PlacementPlan, GasError> {
    let mut in_cycle_used = committed_resources.clone();
    let mut in_cycle_tiles = committed_tiles.clone();
    let per_card_tile_capacity = per_card_capacity
        .get(RESOURCE_TILES)
        .copied()
        .unwrap_or(0) as u32;

    let mut containers_out = Vec::with_capacity(pod.containers.len());
    // Tracks cards already handed to an earlier container in this pod, so
    // that `allow_duplicates = false` can keep distinct containers off the
    // same card (does a pod's containers share a card: resolved in
    // DESIGN.md).
    let mut cards_used_by_pod: std::collections::HashSet<String> = std::collections::HashSet::new();

    for container in &pod.containers {
        let req = resources::restrict_to_namespace(&container.requests, namespace_prefix);

        if req.is_empty() {
            containers_out.push(ContainerPlacement::default());
            continue;
        }

        let candidate_cards: Vec<String> = if allow_duplicates {
            policy.cards.clone()
        } else {
            policy
                .cards
                .iter()
                .filter(|c| !cards_used_by_pod.contains(*c))
                .cloned()
                .collect()
        };

        let CardSelection {
            cards: selected,
            preferred_used,
        } = cards::select_cards(
            &req,
            per_card_capacity,
            policy,
            &in_cycle_used,
            &candidate_cards,
            balanced_resource,
        )?;
        cards_used_by_pod.extend(selected.iter().cloned());

        let tiles_needed = req.get(RESOURCE_TILES).copied().unwrap_or(0) as u32;
        let shares = if tiles_needed > 0 {
            split_tiles(tiles_needed, selected.len())
        } else {
            vec![0; selected.len()]
        };

        let mut per_card_tiles: HashMap<String, Vec<u32>> = HashMap::new();
        for (card, &share) in selected.iter().zip(shares.iter()) {
            if share == 0 {
                continue;
            }
            let committed = committed_tiles.get(card).cloned().unwrap_or_default();
            let disabled = tile_set_for_card(&policy.disabled_tiles, card);
            let descheduled = tile_set_for_card(&policy.descheduled_tiles, card);
            let preferred = policy.preferred_tiles.get(card).cloned().unwrap_or_default();

            let chosen = tiles::allocate(
                card,
                share,
                per_card_tile_capacity,
                &committed,
                &mut in_cycle_tiles,
                &disabled,
                &descheduled,
                &preferred,
            )?;
            per_card_tiles.insert(card.clone(), chosen);
        }

        for (card, &share) in selected.iter().zip(shares.iter()) {
            let delta = per_card_usage_delta(share);
            let entry = in_cycle_used.entry(card.clone()).or_default();
            *entry = resources::add(entry, &delta);
        }

        containers_out.push(ContainerPlacement {
            cards: selected,
            tiles: per_card_tiles,
            preferred_used,
        });
    }

    Ok(PlacementPlan {
        containers: containers_out,
    })
}
