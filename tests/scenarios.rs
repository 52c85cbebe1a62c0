//! End-to-end scenarios driven through `ExtenderService`, the same surface
//! `bin/gas-extenderd`'s HTTP handlers call. Each test mirrors one seed
//! scenario for the placement decision engine, backed by `FakeCache`.

use std::collections::HashMap;
use std::sync::Arc;

use gas_extender::cache::fake::FakeCache;
use gas_extender::cache::Cache;
use gas_extender::config::ExtenderConfig;
use gas_extender::endpoints::{
    ContainerArgs, ExtenderArgs, ExtenderBindingArgs, ExtenderService, PodArgs,
};
use gas_extender::model::NodeSpec;
use gas_extender::resources::ResourceMap;

fn node(name: &str, labels: &[(&str, &str)], i915: u64, tiles: u64) -> NodeSpec {
    let mut label_map = HashMap::new();
    for (k, v) in labels {
        label_map.insert(k.to_string(), v.to_string());
    }
    let mut capacity = ResourceMap::new();
    capacity.insert("gpu.intel.com/i915".to_string(), i915);
    capacity.insert("gpu.intel.com/tiles".to_string(), tiles);
    NodeSpec {
        name: name.to_string(),
        labels: label_map,
        capacity,
    }
}

fn pod_request(uid: &str, containers: Vec<(u64, u64)>) -> PodArgs {
    let containers = containers
        .into_iter()
        .map(|(i915, tile_count)| {
            let mut resources = HashMap::new();
            if i915 > 0 {
                resources.insert("gpu.intel.com/i915".to_string(), i915.to_string());
            }
            if tile_count > 0 {
                resources.insert("gpu.intel.com/tiles".to_string(), tile_count.to_string());
            }
            ContainerArgs { resources }
        })
        .collect();
    PodArgs {
        name: "p0".to_string(),
        namespace: "ns".to_string(),
        uid: uid.to_string(),
        containers,
        annotations: HashMap::new(),
    }
}

const BIND_UUID: &str = "2e0f755c-1c1f-4a0e-8a0a-000000000001";

/// S2: preference label set to card2 -> bound to card2.
#[tokio::test]
async fn prefers_labeled_card_over_declaration_order() {
    let cache = Arc::new(FakeCache::new());
    cache
        .put_node(node(
            "n0",
            &[
                ("gpu.intel.com/cards", "card0.card1.card2"),
                ("gpu.intel.com/gas-prefer-gpu", "card2"),
            ],
            3,
            0,
        ))
        .await;
    let uid = BIND_UUID;
    cache
        .put_pod(gas_extender::model::PodSpec {
            name: "p0".to_string(),
            namespace: "ns".to_string(),
            uid: uid.to_string(),
            containers: vec![gas_extender::model::ContainerSpec {
                requests: {
                    let mut m = ResourceMap::new();
                    m.insert("gpu.intel.com/i915".to_string(), 1);
                    m
                },
            }],
            annotations: HashMap::new(),
        })
        .await;
    let service = ExtenderService::new(cache.clone(), cache, ExtenderConfig::default());

    let result = service
        .bind_node(ExtenderBindingArgs {
            pod_name: "p0".to_string(),
            pod_namespace: "ns".to_string(),
            pod_uid: uid.to_string(),
            node: "n0".to_string(),
        })
        .await;
    assert!(result.error.is_empty(), "{}", result.error);
}

/// S3: card0 has 4 tiles, index 1 already committed, pod requests 3 tiles
/// -> lowest-free-index wins, assigning {0, 2, 3}.
#[tokio::test]
async fn lowest_free_tile_indices_are_assigned_around_committed_usage() {
    let cache = Arc::new(FakeCache::new());
    cache
        .put_node(node("n0", &[("gpu.intel.com/cards", "card0")], 1, 4))
        .await;
    let mut committed = gas_extender::resources::NodeTiles::new();
    committed.insert("card0".to_string(), [1].into_iter().collect());
    cache.set_tiles("n0", committed).await;

    let uid = BIND_UUID;
    cache
        .put_pod(gas_extender::model::PodSpec {
            name: "p0".to_string(),
            namespace: "ns".to_string(),
            uid: uid.to_string(),
            containers: vec![gas_extender::model::ContainerSpec {
                requests: {
                    let mut m = ResourceMap::new();
                    m.insert("gpu.intel.com/tiles".to_string(), 3);
                    m
                },
            }],
            annotations: HashMap::new(),
        })
        .await;
    let service = ExtenderService::new(cache.clone(), cache.clone(), ExtenderConfig::default());

    let result = service
        .bind_node(ExtenderBindingArgs {
            pod_name: "p0".to_string(),
            pod_namespace: "ns".to_string(),
            pod_uid: uid.to_string(),
            node: "n0".to_string(),
        })
        .await;
    assert!(result.error.is_empty(), "{}", result.error);

    let tiles = cache.node_tile_status("n0").await.unwrap();
    let card0 = tiles.get("card0").unwrap();
    assert!(card0.contains(&0));
    assert!(card0.contains(&2));
    assert!(card0.contains(&3));
}

/// S4: one card, 4 tiles / 4 i915; two containers requesting
/// (i915=1,tiles=3) then (i915=1,tiles=1) -> card0|card0, all four tile
/// indices claimed exactly once, split 3+1.
#[tokio::test]
async fn two_container_pod_splits_tiles_three_and_one_on_one_card() {
    let cache = Arc::new(FakeCache::new());
    cache
        .put_node(node("n0", &[("gpu.intel.com/cards", "card0")], 4, 4))
        .await;
    let uid = BIND_UUID;
    let args = pod_request(uid, vec![(1, 3), (1, 1)]);
    cache
        .put_pod(gas_extender::model::PodSpec {
            name: args.name.clone(),
            namespace: args.namespace.clone(),
            uid: args.uid.clone(),
            containers: args
                .containers
                .iter()
                .map(|c| gas_extender::model::ContainerSpec {
                    requests: gas_extender::resources::parse_resource_map(&c.resources).unwrap(),
                })
                .collect(),
            annotations: HashMap::new(),
        })
        .await;
    let service = ExtenderService::new(cache.clone(), cache.clone(), ExtenderConfig::default());

    let result = service
        .bind_node(ExtenderBindingArgs {
            pod_name: "p0".to_string(),
            pod_namespace: "ns".to_string(),
            pod_uid: uid.to_string(),
            node: "n0".to_string(),
        })
        .await;
    assert!(result.error.is_empty(), "{}", result.error);

    // Both containers land on card0; committed usage is per-card (2 i915, 4
    // tiles), not the node-wide total reapplied once per card occurrence.
    let committed = cache.node_resource_status("n0").await.unwrap();
    let card0 = committed.get("card0").unwrap();
    assert_eq!(card0.get("gpu.intel.com/i915"), Some(&2));
    assert_eq!(card0.get("gpu.intel.com/tiles"), Some(&4));
}

/// S6: an out-of-range tile-disable label (card0_gt6 on a 4-tile card)
/// must not make the node infeasible (sanitation requirement).
#[tokio::test]
async fn out_of_range_disabled_tile_label_does_not_break_scheduling() {
    let cache = Arc::new(FakeCache::new());
    cache
        .put_node(
            node(
                "n0",
                &[
                    ("gpu.intel.com/cards", "card0"),
                    ("gpu.intel.com/gpu-disable-card0_gt6", "true"),
                ],
                1,
                4,
            ),
        )
        .await;
    let service = ExtenderService::new(cache.clone(), cache, ExtenderConfig::default());

    let args = ExtenderArgs {
        pod: pod_request("irrelevant", vec![(0, 1)]),
        node_names: vec!["n0".to_string()],
    };
    let result = service.filter_nodes(args).await;
    assert_eq!(result.node_names, vec!["n0"]);
    assert!(result.failed_nodes.is_empty());
}

/// S7: card0.card1, one tile each; card1_gt0 descheduled; pod needs one
/// tile -> falls back to card0.
#[tokio::test]
async fn descheduled_tile_on_one_card_falls_back_to_the_other() {
    let cache = Arc::new(FakeCache::new());
    cache
        .put_node(node(
            "n0",
            &[
                ("gpu.intel.com/cards", "card0.card1"),
                ("gpu.intel.com/gpu-deschedule-card1_gt0", "true"),
            ],
            1,
            1,
        ))
        .await;
    let service = ExtenderService::new(cache.clone(), cache, ExtenderConfig::default());

    let args = ExtenderArgs {
        pod: pod_request("irrelevant", vec![(0, 1)]),
        node_names: vec!["n0".to_string()],
    };
    let result = service.filter_nodes(args).await;
    assert_eq!(result.node_names, vec!["n0"]);
}

/// S9: balancedResource = "gpu.intel.com/mem"; card2 has the least `mem`
/// usage among three feasible cards -> card2 is chosen. The balanced
/// resource lives in the vendor namespace, same as every other resource
/// the core reasons about.
#[tokio::test]
async fn balanced_resource_routes_to_the_least_loaded_card() {
    let cache = Arc::new(FakeCache::new());
    let mut n0 = node("n0", &[("gpu.intel.com/cards", "card0.card1.card2")], 3, 0);
    n0.capacity.insert("gpu.intel.com/mem".to_string(), 9);
    cache.put_node(n0).await;
    let mut resources = gas_extender::resources::NodeResources::new();
    resources.insert("card0".to_string(), {
        let mut m = ResourceMap::new();
        m.insert("gpu.intel.com/mem".to_string(), 1);
        m
    });
    resources.insert("card1".to_string(), {
        let mut m = ResourceMap::new();
        m.insert("gpu.intel.com/mem".to_string(), 2);
        m
    });
    resources.insert("card2".to_string(), {
        let mut m = ResourceMap::new();
        m.insert("gpu.intel.com/mem".to_string(), 0);
        m
    });
    cache.set_resources("n0", resources).await;

    let uid = BIND_UUID;
    cache
        .put_pod(gas_extender::model::PodSpec {
            name: "p0".to_string(),
            namespace: "ns".to_string(),
            uid: uid.to_string(),
            containers: vec![gas_extender::model::ContainerSpec {
                requests: {
                    let mut m = ResourceMap::new();
                    m.insert("gpu.intel.com/i915".to_string(), 1);
                    m.insert("gpu.intel.com/mem".to_string(), 1);
                    m
                },
            }],
            annotations: HashMap::new(),
        })
        .await;
    let config = ExtenderConfig {
        balanced_resource: Some("gpu.intel.com/mem".to_string()),
        ..Default::default()
    };
    let service = ExtenderService::new(cache.clone(), cache.clone(), config);

    let result = service
        .bind_node(ExtenderBindingArgs {
            pod_name: "p0".to_string(),
            pod_namespace: "ns".to_string(),
            pod_uid: uid.to_string(),
            node: "n0".to_string(),
        })
        .await;
    assert!(result.error.is_empty(), "{}", result.error);

    let committed = cache.node_resource_status("n0").await.unwrap();
    // card2 started at mem=0 and should have received this container's i915.
    assert_eq!(
        committed.get("card2").and_then(|m| m.get("gpu.intel.com/i915")),
        Some(&1)
    );
    assert_eq!(
        committed.get("card0").and_then(|m| m.get("gpu.intel.com/i915")),
        None
    );
}
