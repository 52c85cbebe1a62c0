//! Pod/container/node data types the planner and cache operate on.

use crate::resources::ResourceMap;
use std::collections::HashMap;

/// One container's resource request, restricted to whatever namespace the
/// caller cares about by the time it reaches the planner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub requests: ResourceMap,
}

/// A pod's ordered container list plus the annotations the core reads and
/// writes (`gas-ts`, `gas-allow`, `gas-deny`, `gas-container-cards`,
/// `gas-container-tiles`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodSpec {
    pub name: String,
    pub namespace: String,
    /// Must parse as a UUID for `bindNode` to succeed.
    pub uid: String,
    pub containers: Vec<ContainerSpec>,
    pub annotations: HashMap<String, String>,
}

/// A node's declared labels and node-wide GPU resource capacity, as the
/// cache would return it from `FetchNode`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSpec {
    pub name: String,
    pub labels: HashMap<String, String>,
    /// Node-wide capacity, before per-card division.
    pub capacity: ResourceMap,
}
