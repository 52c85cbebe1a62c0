//! GPU-aware scheduler extender: the placement decision engine behind a
//! container orchestrator's `filter`/`bind` scheduler-extender protocol.
//!
//! The modules below mirror the component breakdown of the placement
//! algorithm: resource arithmetic (`resources`), label/annotation decoding
//! (`policy`), tile packing (`tiles`), card selection (`cards`), and the
//! per-pod planner that ties them together (`planner`). `cache` is the
//! external-collaborator boundary; `endpoints` and `config` are the HTTP
//! and configuration surface `bin/gas-extenderd` wires up.

#[cfg(all(feature = "mimalloc", target_arch = "x86_64"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod cache;
pub mod cards;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod model;
pub mod planner;
pub mod policy;
pub mod resources;
pub mod tiles;
