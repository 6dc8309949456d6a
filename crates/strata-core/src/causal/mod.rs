//! Append-only causal graph of actions and effects.
//!
//! Two node kinds and two edge kinds only: an action `causes` an effect, an
//! effect `enables` an action. Every mutation is also appended to a log
//! tagged with the external event id that drove it, so the graph can be
//! cross-referenced with the audit trail and rebuilt with
//! [`CausalGraph::replay`].

mod graph;
mod query;
mod types;

pub use graph::CausalGraph;
pub use query::{WhatIfResult, WhyResult};
pub use types::{
    ActionNode, EdgeKind, EffectNode, EffectStateDiff, GraphEdge, GraphLogEntry, GraphMutation,
    GraphNode,
};

/// Errors produced by graph mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// No node of the required kind has this id.
    #[error("node not found: {id}")]
    NodeNotFound { id: String },

    #[error("node already exists: {id}")]
    NodeExists { id: String },
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
