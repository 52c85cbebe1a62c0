//! Extender endpoints.
//!
//! Presents `filterNodes` and `bindNode` as plain async methods on
//! [`ExtenderService`]; the HTTP layer (`bin/gas-extenderd`) is a thin
//! wrapper that deserializes `ExtenderArgs`/`ExtenderBindingArgs` and
//! serializes the results. Keeping the service free of axum types makes it
//! directly testable without going through `server.rs`.

use crate::cache::{AnnotationPatcher, Cache};
use crate::config::ExtenderConfig;
use crate::error::GasError;
use crate::planner::{self, PlacementPlan};
use crate::policy::Policy;
use crate::resources::{self, NodeResources, NodeTiles, ResourceMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Request body for `POST /scheduler/filter`.
#[derive(Debug, Deserialize)]
pub struct ExtenderArgs {
    #[serde(rename = "Pod")]
    pub pod: PodArgs,
    #[serde(rename = "NodeNames")]
    pub node_names: Vec<String>,
}

/// The pod shape as it arrives over the wire: container requests are
/// string-valued quantities (the orchestrator convention), decoded via
/// [`resources::parse_resource_map`].
#[derive(Debug, Deserialize)]
pub struct PodArgs {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub containers: Vec<ContainerArgs>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ContainerArgs {
    #[serde(default)]
    pub resources: HashMap<String, String>,
}

#[derive(Debug, Serialize, Default)]
pub struct ExtenderFilterResult {
    #[serde(rename = "NodeNames")]
    pub node_names: Vec<String>,
    #[serde(rename = "FailedNodes")]
    pub failed_nodes: HashMap<String, String>,
    #[serde(rename = "Error")]
    pub error: String,
}

/// Request body for `POST /scheduler/bind`.
#[derive(Debug, Deserialize)]
pub struct ExtenderBindingArgs {
    #[serde(rename = "PodName")]
    pub pod_name: String,
    #[serde(rename = "PodNamespace")]
    pub pod_namespace: String,
    #[serde(rename = "PodUID")]
    pub pod_uid: String,
    #[serde(rename = "Node")]
    pub node: String,
}

#[derive(Debug, Serialize, Default)]
pub struct ExtenderBindingResult {
    #[serde(rename = "Error")]
    pub error: String,
}

/// Owns the cache handle and extender configuration; `filter_nodes` and
/// `bind_node` are the two operations the HTTP layer exposes.
pub struct ExtenderService {
    cache: Arc<dyn Cache>,
    patcher: Arc<dyn AnnotationPatcher>,
    config: ExtenderConfig,
}

impl ExtenderService {
    pub fn new(cache: Arc<dyn Cache>, patcher: Arc<dyn AnnotationPatcher>, config: ExtenderConfig) -> Self {
        Self { cache, patcher, config }
    }

    /// Builds the decoded `PodSpec` the planner expects out of the
    /// wire-format `PodArgs`, restricting container resources to the
    /// configured vendor namespace and validating quantities.
    fn decode_pod(&self, args: &PodArgs) -> Result<crate::model::PodSpec, GasError> {
        let containers = args
            .containers
            .iter()
            .map(|c| {
                resources::parse_resource_map(&c.resources)
                    .map(|requests| crate::model::ContainerSpec { requests })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(crate::model::PodSpec {
            name: args.name.clone(),
            namespace: args.namespace.clone(),
            uid: args.uid.clone(),
            containers,
            annotations: args.annotations.clone(),
        })
    }

    /// Runs the full placement algorithm against one node without
    /// committing anything: a dry run used both by `filterNodes` and as
    /// the first phase of `bindNode`.
    async fn try_plan(
        &self,
        pod: &crate::model::PodSpec,
        node_name: &str,
    ) -> Result<(Policy, NodeResources, NodeTiles, ResourceMap, PlacementPlan), GasError> {
        let node = self.cache.fetch_node(node_name).await?;
        let policy =
            Policy::from_labels_and_annotations(&node.labels, &pod.annotations, &self.config.own_namespace)?;

        let per_card_capacity =
            resources::derive_per_card_capacity(&node.capacity, policy.cards.len(), resources::RESOURCE_TILES)
                .resources;

        let committed_resources = self.cache.node_resource_status(node_name).await?;
        let committed_tiles = self.cache.node_tile_status(node_name).await?;

        let plan = planner::plan(
            pod,
            &policy,
            &committed_resources,
            &committed_tiles,
            &per_card_capacity,
            self.config.balanced_resource.as_deref(),
            &self.config.own_namespace,
            self.config.allow_duplicates,
        )?;

        Ok((policy, committed_resources, committed_tiles, per_card_capacity, plan))
    }

    /// `filterNodes(candidateNodeNames, pod)`. A node that cannot be
    /// fetched is dropped silently rather than recorded as failed, since
    /// the orchestrator is expected to retry it; a node that is
    /// feasibility-rejected is recorded in `failed_nodes` with the
    /// collapsed `"will not fit"` message.
    pub async fn filter_nodes(&self, args: ExtenderArgs) -> ExtenderFilterResult {
        let pod = match self.decode_pod(&args.pod) {
            Ok(pod) => pod,
            Err(err) => {
                return ExtenderFilterResult {
                    error: err.to_string(),
                    ..Default::default()
                }
            }
        };

        let mut feasible = Vec::new();
        let mut failed = HashMap::new();

        for node_name in &args.node_names {
            match self.try_plan(&pod, node_name).await {
                Ok(_) => feasible.push(node_name.clone()),
                Err(GasError::CacheUnavailable(reason)) => {
                    tracing::warn!(node = %node_name, %reason, "dropping node, cache unavailable");
                }
                Err(err) if err.is_feasibility_failure() => {
                    failed.insert(node_name.clone(), err.user_message().to_string());
                }
                Err(err) => {
                    tracing::warn!(node = %node_name, %err, "dropping node, unexpected error");
                }
            }
        }

        ExtenderFilterResult {
            node_names: feasible,
            failed_nodes: failed,
            error: String::new(),
        }
    }

    /// `bindNode(podRef, nodeName)`. Runs the full plan, then composes and
    /// applies the three annotations, then commits usage via the cache.
    /// Patch and commit are issued in that order: a failed commit after a
    /// successful patch leaves a pod annotated for a node it may not get
    /// capacity on, which is preferable to charging usage for a placement
    /// that was never recorded.
    pub async fn bind_node(&self, args: ExtenderBindingArgs) -> ExtenderBindingResult {
        if uuid::Uuid::parse_str(&args.pod_uid).is_err() {
            return ExtenderBindingResult {
                error: GasError::InvalidPod(format!("{} is not a valid UUID", args.pod_uid)).to_string(),
            };
        }

        let pod = match self.cache.fetch_pod(&args.pod_namespace, &args.pod_name).await {
            Ok(pod) => pod,
            Err(err) => return ExtenderBindingResult { error: err.to_string() },
        };

        let (_, _, _, _, plan) = match self.try_plan(&pod, &args.node).await {
            Ok(result) => result,
            Err(err) => return ExtenderBindingResult { error: err.to_string() },
        };

        let cards_annotation = compose_cards_annotation(&plan);
        let tiles_annotation = compose_tiles_annotation(&plan);
        let ts_annotation = gas_timestamp();

        let mut patch = HashMap::new();
        patch.insert("gas-ts".to_string(), ts_annotation);
        patch.insert("gas-container-cards".to_string(), cards_annotation);
        if let Some(tiles_annotation) = tiles_annotation {
            patch.insert("gas-container-tiles".to_string(), tiles_annotation);
        }

        if let Err(err) = self.patcher.apply_annotations(&pod, &args.node, &patch).await {
            return ExtenderBindingResult { error: err.to_string() };
        }

        let deltas = plan_delta(&plan);
        let mut tiles_delta = NodeTiles::new();
        for container in &plan.containers {
            for (card, indices) in &container.tiles {
                tiles_delta.entry(card.clone()).or_default().extend(indices);
            }
        }

        if let Err(err) = self
            .cache
            .adjust_pod_resources_locked(&pod, &args.node, &deltas, &tiles_delta)
            .await
        {
            return ExtenderBindingResult { error: err.to_string() };
        }

        ExtenderBindingResult { error: String::new() }
    }
}

/// `<card>(,<card>)*` per container, groups joined by `|`.
fn compose_cards_annotation(plan: &PlacementPlan) -> String {
    plan.containers
        .iter()
        .map(|c| c.cards.join(","))
        .collect::<Vec<_>>()
        .join("|")
}

/// `<card>:gt<i>(+gt<j>)*(,<card>:...)*` per container, groups joined by
/// `|`; omitted entirely (returns `None`) when no container has tiles.
fn compose_tiles_annotation(plan: &PlacementPlan) -> Option<String> {
    if plan.containers.iter().all(|c| c.tiles.is_empty()) {
        return None;
    }
    Some(
        plan.containers
            .iter()
            .map(|c| {
                let mut cards: Vec<&String> = c.tiles.keys().collect();
                cards.sort();
                cards
                    .into_iter()
                    .map(|card| {
                        let indices = &c.tiles[card];
                        let tiles = indices
                            .iter()
                            .map(|i| format!("gt{i}"))
                            .collect::<Vec<_>>()
                            .join("+");
                        format!("{card}:{tiles}")
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join("|"),
    )
}

/// Decimal nanoseconds since the Unix epoch (resolved in `DESIGN.md`:
/// integer, not RFC3339, so the value sorts as a plain string as well as
/// numerically).
fn gas_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .to_string()
}

/// The per-card resource delta to commit: one unit of `i915` for each card
/// a container was placed on, plus the tile count actually claimed on that
/// card. Keyed by card so each card's usage is adjusted independently
/// rather than by a node-wide total applied to every card.
fn plan_delta(plan: &PlacementPlan) -> NodeResources {
    let mut deltas = NodeResources::new();
    for container in &plan.containers {
        for card in &container.cards {
            let entry = deltas.entry(card.clone()).or_default();
            *entry.entry(resources::RESOURCE_I915.to_string()).or_insert(0) += 1;
        }
        for (card, indices) in &container.tiles {
            if indices.is_empty() {
                continue;
            }
            let entry = deltas.entry(card.clone()).or_default();
            *entry.entry(resources::RESOURCE_TILES.to_string()).or_insert(0) += indices.len() as u64;
        }
    }
    deltas
}
