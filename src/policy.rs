//! Label & annotation parser: decodes node/pod policy from raw labels.
//!
//! Pure function from `(node labels, pod annotations)` to a `Policy`
//! record. No I/O, no cache access — everything here is decoded from the
//! maps the cache has already fetched.

use crate::error::GasError;
use std::collections::{HashMap, HashSet};

/// Default label-key prefix for policy labels, matching the vendor
/// resource namespace (`gpu.intel.com/`).
pub const DEFAULT_POLICY_PREFIX: &str = "gpu.intel.com";

/// Label value that marks a card (or a PCI group via one of its members)
/// disabled for the *whole group*, as opposed to a plain `"true"` which
/// only disables that one card. This crate fixes the marker value as
/// `"PCI_GROUP"` — recorded as a decision in `DESIGN.md`.
pub const PCI_GROUP_DISABLE_MARKER: &str = "PCI_GROUP";

/// Decoded node + pod policy used by card selection and placement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    /// Card names in label-declaration order. Ties elsewhere break
    /// lexicographically by card name.
    pub cards: Vec<String>,
    pub disabled_cards: HashSet<String>,
    /// `(card, tile index)` pairs disabled for new and existing placement.
    pub disabled_tiles: HashSet<(String, u32)>,
    /// `(card, tile index)` pairs descheduled — equivalent to disabled for
    /// new placement.
    pub descheduled_tiles: HashSet<(String, u32)>,
    pub preferred_card: Option<String>,
    /// Per-card preferred tile indices, in preferred-label order.
    pub preferred_tiles: HashMap<String, Vec<u32>>,
    /// card -> PCI group id, for "disabling one disables all" coupling.
    pub pci_groups: HashMap<String, String>,
    /// Per-pod allowlist/denylist of card names (from pod annotations).
    pub allowlist: HashSet<String>,
    pub denylist: HashSet<String>,
}

impl Policy {
    /// Every card whose PCI group contains at least one disabled card.
    pub fn pci_group_disabled_cards(&self) -> HashSet<String> {
        let disabled_groups: HashSet<&String> = self
            .pci_groups
            .iter()
            .filter(|(card, _)| self.disabled_cards.contains(*card))
            .map(|(_, group)| group)
            .collect();
        self.pci_groups
            .iter()
            .filter(|(_, group)| disabled_groups.contains(group))
            .map(|(card, _)| card.clone())
            .collect()
    }
}

fn split_card_list(value: &str) -> Vec<String> {
    let sep = if value.contains('.') { '.' } else { ',' };
    value
        .split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Parses the `<prefix>/gpu-numbers[-k]` family of labels into card names,
/// concatenating dot-separated numeric suffixes in label-key sorted order.
fn parse_gpu_numbers(labels: &HashMap<String, String>, prefix: &str) -> Vec<String> {
    let base_key = format!("{prefix}/gpu-numbers");
    let mut matching: Vec<(&String, &String)> = labels
        .iter()
        .filter(|(k, _)| *k == &base_key || k.starts_with(&format!("{base_key}-")))
        .collect();
    matching.sort_by_key(|(k, _)| (*k).clone());

    let mut cards = Vec::new();
    for (_, value) in matching {
        for suffix in value.split('.').map(str::trim).filter(|s| !s.is_empty()) {
            cards.push(format!("card{suffix}"));
        }
    }
    cards
}

fn parse_pci_group(labels: &HashMap<String, String>, cards: &[String]) -> HashMap<String, String> {
    let Some(raw) = labels.get("pci-group") else {
        return HashMap::new();
    };
    let groups: Vec<&str> = raw.split('.').map(str::trim).collect();
    cards
        .iter()
        .zip(groups.iter())
        .filter(|(_, g)| !g.is_empty())
        .map(|(card, group)| (card.clone(), group.to_string()))
        .collect()
}

fn tile_label_suffix<'a>(key: &'a str, prefix: &str, marker: &str) -> Option<&'a str> {
    key.strip_prefix(&format!("{prefix}/{marker}-"))
}

/// Parses `<prefix>/gpu-disable-<card>_gt<index>` or
/// `<prefix>/gpu-deschedule-<card>_gt<index>` style labels into
/// `(card, index)` pairs. Keys that don't match `<card>_gt<digits>`
/// exactly are ignored rather than erroring — invalid tile labels must
/// not break scheduling. The actual capacity-bounds sanitation happens
/// later in the tile allocator, which only ever looks at indices
/// `0..capacity`.
fn parse_tile_label_set(
    labels: &HashMap<String, String>,
    prefix: &str,
    marker: &str,
) -> HashSet<(String, u32)> {
    let mut out = HashSet::new();
    for (key, value) in labels {
        if value != "true" {
            continue;
        }
        let Some(suffix) = tile_label_suffix(key, prefix, marker) else {
            continue;
        };
        let Some((card, gt)) = suffix.rsplit_once("_gt") else {
            continue;
        };
        if let Ok(index) = gt.parse::<u32>() {
            out.insert((card.to_string(), index));
        }
    }
    out
}

/// Parses `<prefix>/gpu-disable-<card>` (whole-card) labels, keeping both
/// the plain `"true"` disables and the PCI-group-marker disables (the
/// latter also populates `disabled_cards` — group coupling is resolved
/// separately via `pci_group_disabled_cards`).
fn parse_disabled_cards(
    labels: &HashMap<String, String>,
    prefix: &str,
    cards: &[String],
) -> HashSet<String> {
    let card_set: HashSet<&str> = cards.iter().map(String::as_str).collect();
    let mut out = HashSet::new();
    for card in &card_set {
        let key = format!("{prefix}/gpu-disable-{card}");
        if let Some(value) = labels.get(&key) {
            if value == "true" || value == PCI_GROUP_DISABLE_MARKER {
                out.insert((*card).to_string());
            }
        }
    }
    out
}

fn parse_preferred_tiles(
    labels: &HashMap<String, String>,
    prefix: &str,
    cards: &[String],
) -> HashMap<String, Vec<u32>> {
    let mut out = HashMap::new();
    for card in cards {
        let key = format!("{prefix}/gpu-pref-tiles-{card}");
        let Some(value) = labels.get(&key) else {
            continue;
        };
        let indices: Vec<u32> = value
            .split('+')
            .filter_map(|gt| gt.strip_prefix("gt"))
            .filter_map(|n| n.parse::<u32>().ok())
            .collect();
        if !indices.is_empty() {
            out.insert(card.clone(), indices);
        }
    }
    out
}

fn parse_card_list_annotation(annotations: &HashMap<String, String>, key: &str) -> HashSet<String> {
    annotations
        .get(key)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Policy {
    /// Decodes node labels + pod annotations into a `Policy` record.
    /// `prefix` is the policy label prefix (`DEFAULT_POLICY_PREFIX`
    /// unless the deployment overrides it).
    pub fn from_labels_and_annotations(
        node_labels: &HashMap<String, String>,
        pod_annotations: &HashMap<String, String>,
        prefix: &str,
    ) -> Result<Policy, GasError> {
        let mut cards = Vec::new();
        let mut seen = HashSet::new();

        if let Some(raw) = node_labels.get(&format!("{prefix}/cards")) {
            for card in split_card_list(raw) {
                if seen.insert(card.clone()) {
                    cards.push(card);
                }
            }
        }
        for card in parse_gpu_numbers(node_labels, prefix) {
            if seen.insert(card.clone()) {
                cards.push(card);
            }
        }

        let disabled_cards = parse_disabled_cards(node_labels, prefix, &cards);
        let disabled_tiles = parse_tile_label_set(node_labels, prefix, "gpu-disable");
        let descheduled_tiles = parse_tile_label_set(node_labels, prefix, "gpu-deschedule");
        let preferred_card = node_labels.get(&format!("{prefix}/gas-prefer-gpu")).cloned();
        let preferred_tiles = parse_preferred_tiles(node_labels, prefix, &cards);
        let pci_groups = parse_pci_group(node_labels, &cards);

        let mut denylist = parse_card_list_annotation(pod_annotations, "gas-deny");
        let allowlist = parse_card_list_annotation(pod_annotations, "gas-allow");
        // Conflicting allow and deny: deny wins. Nothing extra to do here —
        // `select_cards` applies allow then deny in that order so a card
        // named in both ends up dropped.
        denylist.retain(|c| !c.is_empty());

        Ok(Policy {
            cards,
            disabled_cards,
            disabled_tiles,
            descheduled_tiles,
            preferred_card,
            preferred_tiles,
            pci_groups,
            allowlist,
            denylist,
        })
    }
}
