//! The cache/informer abstraction.
//!
//! The planner receives a cache handle at construction rather than
//! reaching for a process-wide singleton, so tests can substitute a fake
//! implementation without touching global state.
//!
//! Only the trait and the test double are implemented here — the
//! production implementation (an orchestrator informer) is an external
//! collaborator and out of scope for this crate.

use crate::error::GasError;
use crate::model::{NodeSpec, PodSpec};
use crate::resources::{NodeResources, NodeTiles};
use async_trait::async_trait;

/// The five operations the placement engine consumes from the cache.
/// `adjust_pod_resources_locked`'s implied lock is a contract on the
/// implementation: it must acquire a per-node lock, recheck capacity, and
/// commit atomically, so that two concurrent binds for different pods on
/// the same node cannot both observe free capacity and double-book a
/// tile.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn fetch_node(&self, name: &str) -> Result<NodeSpec, GasError>;
    async fn fetch_pod(&self, namespace: &str, name: &str) -> Result<PodSpec, GasError>;
    async fn node_resource_status(&self, node: &str) -> Result<NodeResources, GasError>;
    async fn node_tile_status(&self, node: &str) -> Result<NodeTiles, GasError>;
    /// Commits `deltas` (per-card resource usage to add) and `tiles`
    /// (per-card chosen tile indices) for `pod` on `node`, serialized per
    /// node.
    async fn adjust_pod_resources_locked(
        &self,
        pod: &PodSpec,
        node: &str,
        deltas: &NodeResources,
        tiles: &NodeTiles,
    ) -> Result<(), GasError>;
}

/// The downstream annotation patch mechanism, kept separate from
/// [`Cache`] since it is a distinct external interface rather than one of
/// the five cache operations.
#[async_trait]
pub trait AnnotationPatcher: Send + Sync {
    async fn apply_annotations(
        &self,
        pod: &PodSpec,
        node: &str,
        annotations: &std::collections::HashMap<String, String>,
    ) -> Result<(), GasError>;
}

/// An in-memory `Cache`/`AnnotationPatcher` implementation. Tests script it
/// directly instead of hitting a real daemon; `bin/gas-extenderd` also
/// wires it up as the default backend, since a production informer client
/// against a real orchestrator API is an external collaborator out of
/// scope for this crate.
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct FakeCache {
        nodes: Mutex<HashMap<String, NodeSpec>>,
        pods: Mutex<HashMap<(String, String), PodSpec>>,
        resources: Mutex<HashMap<String, NodeResources>>,
        tiles: Mutex<HashMap<String, NodeTiles>>,
        pub applied_annotations: Mutex<Vec<(String, HashMap<String, String>)>>,
    }

    impl FakeCache {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn put_node(&self, node: NodeSpec) {
            self.nodes.lock().await.insert(node.name.clone(), node);
        }

        pub async fn put_pod(&self, pod: PodSpec) {
            self.pods
                .lock()
                .await
                .insert((pod.namespace.clone(), pod.name.clone()), pod);
        }

        pub async fn set_resources(&self, node: &str, resources: NodeResources) {
            self.resources
                .lock()
                .await
                .insert(node.to_string(), resources);
        }

        pub async fn set_tiles(&self, node: &str, tiles: NodeTiles) {
            self.tiles.lock().await.insert(node.to_string(), tiles);
        }
    }

    #[async_trait]
    impl Cache for FakeCache {
        async fn fetch_node(&self, name: &str) -> Result<NodeSpec, GasError> {
            self.nodes
                .lock()
                .await
                .get(name)
                .cloned()
                .ok_or_else(|| GasError::CacheUnavailable(format!("node {name} not found")))
        }

        async fn fetch_pod(&self, namespace: &str, name: &str) -> Result<PodSpec, GasError> {
            self.pods
                .lock()
                .await
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| GasError::CacheUnavailable(format!("pod {namespace}/{name} not found")))
        }

        async fn node_resource_status(&self, node: &str) -> Result<NodeResources, GasError> {
            Ok(self
                .resources
                .lock()
                .await
                .get(node)
                .cloned()
                .unwrap_or_default())
        }

        async fn node_tile_status(&self, node: &str) -> Result<NodeTiles, GasError> {
            Ok(self.tiles.lock().await.get(node).cloned().unwrap_or_default())
        }

        async fn adjust_pod_resources_locked(
            &self,
            _pod: &PodSpec,
            node: &str,
            deltas: &NodeResources,
            tiles: &NodeTiles,
        ) -> Result<(), GasError> {
            let mut resources = self.resources.lock().await;
            let entry = resources.entry(node.to_string()).or_default();
            for (card, delta) in deltas {
                let card_entry = entry.entry(card.clone()).or_default();
                *card_entry = crate::resources::add(card_entry, delta);
            }
            drop(resources);

            let mut tile_status = self.tiles.lock().await;
            let node_tiles = tile_status.entry(node.to_string()).or_default();
            for (card, indices) in tiles {
                node_tiles.entry(card.clone()).or_default().extend(indices);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AnnotationPatcher for FakeCache {
        async fn apply_annotations(
            &self,
            _pod: &PodSpec,
            node: &str,
            annotations: &HashMap<String, String>,
        ) -> Result<(), GasError> {
            self.applied_annotations
                .lock()
                .await
                .push((node.to_string(), annotations.clone()));
            Ok(())
        }
    }
}
