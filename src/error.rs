//! Domain error type for the placement decision engine.
//!
//! A hand-rolled `Display` + `Error` impl rather than a `thiserror`
//! derive, since nothing else in this crate's dependency stack pulls in
//! `thiserror`.

use std::fmt;

/// Every way the placement engine can fail to produce a plan.
///
/// The HTTP layer collapses most of these into the single
/// user-visible string `"will not fit"` via [`GasError::user_message`];
/// the distinct variants stay around for `tracing` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasError {
    /// A resource quantity was negative, non-integer, or otherwise invalid.
    InvalidResource(String),
    /// No per-container plan satisfies every container on this node.
    InfeasibleNode(String),
    /// No card selection satisfies one container's request.
    WillNotFit(String),
    /// No tile assignment satisfies one card's share of a request.
    NoTiles(String),
    /// A fetch from the cache failed; retryable.
    CacheUnavailable(String),
    /// The pod's UID does not parse as a UUID.
    InvalidPod(String),
    /// The external annotation patch call failed.
    PatchFailed(String),
}

impl GasError {
    /// The string the HTTP layer puts in `ExtenderFilterResult.FailedNodes`
    /// or `ExtenderBindingResult.Error`. Feasibility failures collapse to a
    /// single phrase; callers only need to know the node was rejected,
    /// the reason is observable via `tracing`.
    pub fn user_message(&self) -> &'static str {
        match self {
            GasError::InfeasibleNode(_) | GasError::WillNotFit(_) | GasError::NoTiles(_) => {
                "will not fit"
            }
            GasError::CacheUnavailable(_) => "cache unavailable, retry",
            GasError::InvalidPod(_) => "invalid pod",
            GasError::PatchFailed(_) => "failed to apply annotations",
            GasError::InvalidResource(_) => "invalid resource quantity",
        }
    }

    /// True for the three feasibility-only kinds that `filterNodes` records
    /// in `FailedNodes` rather than propagating as a top-level `Error`.
    pub fn is_feasibility_failure(&self) -> bool {
        matches!(
            self,
            GasError::InfeasibleNode(_) | GasError::WillNotFit(_) | GasError::NoTiles(_)
        )
    }
}

impl fmt::Display for GasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasError::InvalidResource(msg) => write!(f, "invalid resource: {msg}"),
            GasError::InfeasibleNode(msg) => write!(f, "infeasible node: {msg}"),
            GasError::WillNotFit(msg) => write!(f, "will not fit: {msg}"),
            GasError::NoTiles(msg) => write!(f, "no tiles: {msg}"),
            GasError::CacheUnavailable(msg) => write!(f, "cache unavailable: {msg}"),
            GasError::InvalidPod(msg) => write!(f, "invalid pod: {msg}"),
            GasError::PatchFailed(msg) => write!(f, "patch failed: {msg}"),
        }
    }
}

impl std::error::Error for GasError {}
