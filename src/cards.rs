//! Card selector.
//!
//! Chooses cards for one container's request: enforces deny/disable/allow,
//! honors preference, applies resource-balanced ordering, and respects PCI
//! group coupling.

use crate::error::GasError;
use crate::policy::Policy;
use crate::resources::{self, NodeResources, ResourceMap, RESOURCE_I915};

/// Cards chosen for one container, plus whether the policy's preferred
/// card ended up among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSelection {
    pub cards: Vec<String>,
    pub preferred_used: bool,
}

/// Runs the filter chain and ordering rule for one container's card pick.
///
/// `candidate_cards` is the set of not-yet-exhausted cards on this node
/// this cycle (the planner narrows this as containers consume whole
/// cards); `used` is committed-plus-in-cycle usage, already merged by the
/// caller.
pub fn select_cards(
    container_req: &ResourceMap,
    per_gpu_capacity: &ResourceMap,
    policy: &Policy,
    used: &NodeResources,
    candidate_cards: &[String],
    balanced_resource: Option<&str>,
) -> Result<CardSelection, GasError> {
    let pci_disabled = policy.pci_group_disabled_cards();

    // Step 1-2: drop disabled cards and cards whose PCI group is disabled.
    let mut remaining: Vec<String> = candidate_cards
        .iter()
        .filter(|c| !policy.disabled_cards.contains(*c))
        .filter(|c| !pci_disabled.contains(*c))
        .cloned()
        .collect();

    // Step 3: allowlist then denylist — deny always wins on conflict
    // because it is applied last and unconditionally removes its members.
    if !policy.allowlist.is_empty() {
        remaining.retain(|c| policy.allowlist.contains(c));
    }
    if !policy.denylist.is_empty() {
        remaining.retain(|c| !policy.denylist.contains(c));
    }

    // Step 4: capacity fit.
    let empty = ResourceMap::new();
    remaining.retain(|c| {
        let card_used = used.get(c).unwrap_or(&empty);
        resources::fits(container_req, per_gpu_capacity, card_used)
    });

    if remaining.is_empty() {
        return Err(GasError::WillNotFit(
            "no candidate card satisfies policy and capacity".to_string(),
        ));
    }

    // Ordering: balanced-resource ascending (tie-break lexicographic by
    // card name), else preserve policy/candidate order.
    if let Some(resource) = balanced_resource {
        if container_req.contains_key(resource) {
            remaining.sort_by(|a, b| {
                let ua = used
                    .get(a)
                    .and_then(|m| m.get(resource))
                    .copied()
                    .unwrap_or(0);
                let ub = used
                    .get(b)
                    .and_then(|m| m.get(resource))
                    .copied()
                    .unwrap_or(0);
                ua.cmp(&ub).then_with(|| a.cmp(b))
            });
        }
    }

    // Preferred card moves to the front if still present.
    let mut preferred_used = false;
    if let Some(preferred) = &policy.preferred_card {
        if let Some(pos) = remaining.iter().position(|c| c == preferred) {
            let card = remaining.remove(pos);
            remaining.insert(0, card);
            preferred_used = true;
        }
    }

    // Selection: take the first `i915` cards. A container that doesn't
    // request i915 at all still occupies exactly one card (e.g. a
    // tiles-only request).
    let cards_needed = container_req
        .get(RESOURCE_I915)
        .copied()
        .unwrap_or(1)
        .max(1) as usize;

    if remaining.len() < cards_needed {
        return Err(GasError::WillNotFit(format!(
            "need {cards_needed} cards, only {} feasible",
            remaining.len()
        )));
    }

    remaining.truncate(cards_needed);

    Ok(CardSelection {
        cards: remaining,
        preferred_used,
    })
}
