//! Resource arithmetic over sparse GPU resource maps.
//!
//! A `ResourceMap` is a sparse mapping from vendor-namespaced resource name
//! (`gpu.intel.com/i915`, `gpu.intel.com/tiles`, ...) to a non-negative
//! integer quantity. Missing keys are treated as zero everywhere.

use crate::error::GasError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sparse resource quantity map, keyed by vendor-namespaced resource name.
pub type ResourceMap = HashMap<String, u64>;

/// Per-card committed usage on a node: card name -> resources in use.
pub type NodeResources = HashMap<String, ResourceMap>;

/// Per-card in-use tile indices. `BTreeSet` (not `HashSet`) so the tile
/// allocator can rely on ascending iteration order — see `tiles::allocate`.
pub type NodeTiles = HashMap<String, std::collections::BTreeSet<u32>>;

/// The shared-device-count resource: how many concurrent pods one card
/// admits. A container requesting `i915 > 1` asks for that many whole
/// cards.
pub const RESOURCE_I915: &str = "gpu.intel.com/i915";

/// The per-card tile-subdivision resource.
pub const RESOURCE_TILES: &str = "gpu.intel.com/tiles";

/// `a + b`, union of keys, summed.
pub fn add(a: &ResourceMap, b: &ResourceMap) -> ResourceMap {
    let mut out = a.clone();
    for (k, v) in b {
        *out.entry(k.clone()).or_insert(0) += v;
    }
    out
}

/// `a - b`, saturating at zero. Union of keys; a key present only in `b`
/// is absent from the result (there is nothing to subtract from, and the
/// result can't go negative).
pub fn sub_saturating(a: &ResourceMap, b: &ResourceMap) -> ResourceMap {
    let mut out = a.clone();
    for (k, v) in b {
        if let Some(existing) = out.get_mut(k) {
            *existing = existing.saturating_sub(*v);
        }
    }
    out
}

/// True iff `need + used <= capacity` element-wise, over `need`'s keys only.
/// Missing keys in `capacity` are zero, so any nonzero `need` entry for a
/// resource the card doesn't advertise at all fails to fit.
pub fn fits(need: &ResourceMap, capacity: &ResourceMap, used: &ResourceMap) -> bool {
    need.iter().all(|(resource, &want)| {
        let cap = capacity.get(resource).copied().unwrap_or(0);
        let have_used = used.get(resource).copied().unwrap_or(0);
        want.saturating_add(have_used) <= cap
    })
}

/// Decodes a resource map from a raw JSON-ish map of string quantities,
/// rejecting fractional or negative values with `InvalidResource`. Used at
/// the HTTP decode boundary, where pod/container resource requests may
/// arrive as strings (the orchestrator convention) rather than native
/// integers.
pub fn parse_resource_map(raw: &HashMap<String, String>) -> Result<ResourceMap, GasError> {
    let mut out = ResourceMap::new();
    for (name, value) in raw {
        let quantity: u64 = value.trim().parse().map_err(|_| {
            GasError::InvalidResource(format!(
                "resource {name} has non-integer or negative quantity {value:?}"
            ))
        })?;
        out.insert(name.clone(), quantity);
    }
    Ok(out)
}

/// Restricts a resource map to keys under the given vendor namespace
/// prefix, e.g. `gpu.intel.com/`. Only resources in that namespace are
/// considered by the placement engine.
pub fn restrict_to_namespace(map: &ResourceMap, namespace_prefix: &str) -> ResourceMap {
    map.iter()
        .filter(|(k, _)| k.starts_with(namespace_prefix))
        .map(|(k, v)| (k.clone(), *v))
        .collect()
}

/// A single card's declared capacity, derived from node-wide capacity
/// labels: `perCardCapacity(resource) = nodeCapacity(resource) / |cards|`
/// for most resources, except tile capacity, which is per-card already
/// and must not be divided.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PerCardCapacity {
    pub resources: ResourceMap,
}

/// Computes per-card capacity from node-wide capacity and the number of
/// cards. `tiles_resource` names the key that must be taken as-is (not
/// divided) because tile capacity is already per-card.
pub fn derive_per_card_capacity(
    node_capacity: &ResourceMap,
    card_count: usize,
    tiles_resource: &str,
) -> PerCardCapacity {
    let mut resources = ResourceMap::new();
    for (name, qty) in node_capacity {
        let value = if name == tiles_resource || card_count == 0 {
            *qty
        } else {
            qty / card_count as u64
        };
        resources.insert(name.clone(), value);
    }
    PerCardCapacity { resources }
}
