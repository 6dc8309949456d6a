use std::collections::HashMap;

use parking_lot::RwLock;
use strata_store::{Collection, RecordStore};
use tracing::debug;

use super::types::{
    ActionNode, EdgeKind, EffectNode, GraphEdge, GraphLogEntry, GraphMutation, GraphNode,
};
use super::{GraphError, GraphResult};
use crate::persist::WriteBehind;

#[derive(Debug, Default)]
pub(super) struct GraphInner {
    pub(super) nodes: HashMap<String, GraphNode>,
    /// Insertion position of each node; breaks ties in query ordering.
    pub(super) positions: HashMap<String, usize>,
    pub(super) order: Vec<String>,
    pub(super) edges: Vec<GraphEdge>,
    pub(super) outgoing: HashMap<String, Vec<usize>>,
    pub(super) incoming: HashMap<String, Vec<usize>>,
    log: Vec<GraphLogEntry>,
}

impl GraphInner {
    pub(super) fn outgoing_edges<'a>(
        &'a self,
        id: &str,
        kind: EdgeKind,
    ) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edge_list(&self.outgoing, id, kind)
    }

    pub(super) fn incoming_edges<'a>(
        &'a self,
        id: &str,
        kind: EdgeKind,
    ) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edge_list(&self.incoming, id, kind)
    }

    fn edge_list<'a>(
        &'a self,
        index: &'a HashMap<String, Vec<usize>>,
        id: &str,
        kind: EdgeKind,
    ) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        index
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
            .filter(move |e| e.kind == kind)
    }

    pub(super) fn position(&self, id: &str) -> usize {
        self.positions.get(id).copied().unwrap_or(usize::MAX)
    }

    fn insert_node(&mut self, node: GraphNode) -> GraphResult<()> {
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            return Err(GraphError::NodeExists { id });
        }
        self.positions.insert(id.clone(), self.order.len());
        self.order.push(id.clone());
        self.nodes.insert(id, node);
        Ok(())
    }

    fn require(&self, id: &str, action: bool) -> GraphResult<()> {
        match self.nodes.get(id) {
            Some(node) if node.is_action() == action => Ok(()),
            _ => Err(GraphError::NodeNotFound { id: id.to_string() }),
        }
    }

    fn insert_edge(&mut self, edge: GraphEdge) -> GraphResult<()> {
        let (from_is_action, to_is_action) = match edge.kind {
            EdgeKind::Causes => (true, false),
            EdgeKind::Enables => (false, true),
        };
        self.require(&edge.from, from_is_action)?;
        self.require(&edge.to, to_is_action)?;

        let idx = self.edges.len();
        self.outgoing.entry(edge.from.clone()).or_default().push(idx);
        self.incoming.entry(edge.to.clone()).or_default().push(idx);
        self.edges.push(edge);
        Ok(())
    }

    fn apply(&mut self, mutation: &GraphMutation) -> GraphResult<()> {
        match mutation {
            GraphMutation::AddNode { node } => self.insert_node(node.clone()),
            GraphMutation::AddEdge { edge } => self.insert_edge(edge.clone()),
        }
    }
}

/// Append-only graph of actions and effects.
///
/// Safe to share across threads; mutations serialize on an internal lock and
/// the log order is the order in which they took it.
#[derive(Debug, Default)]
pub struct CausalGraph {
    pub(super) inner: RwLock<GraphInner>,
    persistence: Option<WriteBehind>,
    last_sequence: u64,
}

impl CausalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_persistence(mut self, writer: WriteBehind) -> Self {
        writer.resume_after(self.last_sequence);
        self.persistence = Some(writer);
        self
    }

    /// Replay the graph log persisted in `store`.
    pub async fn hydrate(store: &dyn RecordStore) -> crate::Result<Self> {
        let records = store.load_all(Collection::GraphLog).await?;
        let last_sequence = records.iter().map(|r| r.sequence).max().unwrap_or(0);
        let entries = records
            .into_iter()
            .map(|r| serde_json::from_value(r.body))
            .collect::<Result<Vec<GraphLogEntry>, _>>()?;
        let mut graph = Self::replay(&entries)?;
        graph.last_sequence = last_sequence;
        debug!(entries = entries.len(), "causal graph hydrated");
        Ok(graph)
    }

    /// Rebuild a graph by re-applying a previously recorded log.
    ///
    /// Log entries keep their original ids and timestamps.
    pub fn replay(entries: &[GraphLogEntry]) -> GraphResult<Self> {
        let graph = Self::new();
        {
            let mut inner = graph.inner.write();
            for entry in entries {
                inner.apply(&entry.mutation)?;
                inner.log.push(entry.clone());
            }
        }
        Ok(graph)
    }

    pub fn add_action(&self, action: ActionNode, event_id: &str) -> GraphResult<ActionNode> {
        self.append(event_id, GraphMutation::AddNode {
            node: GraphNode::Action(action.clone()),
        })?;
        debug!(node_id = %action.id, event_id = %event_id, "action added");
        Ok(action)
    }

    pub fn add_effect(&self, effect: EffectNode, event_id: &str) -> GraphResult<EffectNode> {
        self.append(event_id, GraphMutation::AddNode {
            node: GraphNode::Effect(effect.clone()),
        })?;
        debug!(node_id = %effect.id, event_id = %event_id, "effect added");
        Ok(effect)
    }

    /// Add a `causes` edge from an action to an effect.
    pub fn link_action_to_effect(
        &self,
        action_id: &str,
        effect_id: &str,
        event_id: &str,
    ) -> GraphResult<GraphEdge> {
        self.link(action_id, effect_id, EdgeKind::Causes, event_id)
    }

    /// Add an `enables` edge from an effect to an action.
    pub fn link_effect_to_action(
        &self,
        effect_id: &str,
        action_id: &str,
        event_id: &str,
    ) -> GraphResult<GraphEdge> {
        self.link(effect_id, action_id, EdgeKind::Enables, event_id)
    }

    fn link(&self, from: &str, to: &str, kind: EdgeKind, event_id: &str) -> GraphResult<GraphEdge> {
        let edge = GraphEdge::new(from, to, kind);
        self.append(event_id, GraphMutation::AddEdge { edge: edge.clone() })?;
        debug!(from = %from, to = %to, kind = ?kind, event_id = %event_id, "edge added");
        Ok(edge)
    }

    fn append(&self, event_id: &str, mutation: GraphMutation) -> GraphResult<()> {
        let mut inner = self.inner.write();
        inner.apply(&mutation)?;
        let entry = GraphLogEntry::new(event_id, mutation);
        if let Some(writer) = &self.persistence {
            writer.enqueue(Collection::GraphLog, &entry.id, None, entry.timestamp, &entry);
        }
        inner.log.push(entry);
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Option<GraphNode> {
        self.inner.read().nodes.get(id).cloned()
    }

    /// All nodes in insertion order.
    pub fn get_all_nodes(&self) -> Vec<GraphNode> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.nodes.get(id).cloned())
            .collect()
    }

    /// All edges in insertion order.
    pub fn get_all_edges(&self) -> Vec<GraphEdge> {
        self.inner.read().edges.clone()
    }

    pub fn get_log(&self) -> Vec<GraphLogEntry> {
        self.inner.read().log.clone()
    }

    /// Log entries produced by one external event, in log order.
    pub fn log_for_event(&self, event_id: &str) -> Vec<GraphLogEntry> {
        self.inner
            .read()
            .log
            .iter()
            .filter(|e| e.event_id == event_id)
            .cloned()
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().edges.len()
    }
}
