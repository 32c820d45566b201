//! Error types for the planner.
//!
//! Inner search failures are data, not errors: the single-agent planners
//! return an empty result and the CBS engine treats the branch as dead.
//! Only failures at a collaborator boundary (invalid map, cancelled run)
//! or at the root of a plan surface as `Error`.

use thiserror::Error;

/// Planner error type
#[derive(Error, Debug)]
pub enum Error {
    /// The single-agent search exhausted its open set or iteration cap.
    #[error("no kinodynamically feasible path exists")]
    NoPath,

    /// Root planning failed for an agent; the whole run is infeasible.
    #[error("no initial path exists for agent {agent}")]
    Infeasible { agent: usize },

    /// The CBS open set ran dry before a conflict-free node was found.
    #[error("conflict search exhausted without a solution")]
    Unresolved,

    /// Dubins endpoints coincide but the headings differ.
    #[error("degenerate geometry: coincident endpoints with distinct headings")]
    GeometryDegenerate,

    /// The cancellation flag was raised; no partial paths are published.
    #[error("planning was cancelled")]
    Cancelled,

    /// The map collaborator handed over inconsistent data. Fatal at load.
    #[error("invalid map: {0}")]
    MapInvalid(String),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A map snapshot could not be decoded.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
