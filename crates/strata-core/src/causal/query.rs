//! Backward ("why") and forward ("what if") causal queries.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::graph::{CausalGraph, GraphInner};
use super::types::{ActionNode, EdgeKind, EffectNode, GraphNode};

/// Explanation of how an effect came about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhyResult {
    pub effect: EffectNode,
    /// Contributing actions in causal order.
    pub actions: Vec<ActionNode>,
    /// Every contributing node, dependencies first, ending with `effect`.
    pub path: Vec<GraphNode>,
}

/// Impact of removing an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfResult {
    pub removed_action: ActionNode,
    pub direct_effects: Vec<EffectNode>,
    pub indirect_effects: Vec<EffectNode>,
    pub impacted_actions: Vec<ActionNode>,
}

impl CausalGraph {
    /// Trace `effect_id` back to the actions that produced it.
    ///
    /// Walks breadth-first against the edges: an effect's incoming `causes`
    /// edges lead to actions, an action's incoming `enables` edges lead to
    /// effects. The visited subgraph is then ordered topologically, ties
    /// broken by insertion order. Returns `None` unless `effect_id` names an
    /// effect.
    pub fn why(&self, effect_id: &str) -> Option<WhyResult> {
        let inner = self.inner.read();
        let effect = inner.nodes.get(effect_id)?.as_effect()?.clone();

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(effect_id);
        queue.push_back(effect_id);

        while let Some(id) = queue.pop_front() {
            let Some(node) = inner.nodes.get(id) else {
                continue;
            };
            let kind = if node.is_action() {
                EdgeKind::Enables
            } else {
                EdgeKind::Causes
            };
            for edge in inner.incoming_edges(id, kind) {
                if visited.insert(edge.from.as_str()) {
                    queue.push_back(edge.from.as_str());
                }
            }
        }

        let path: Vec<GraphNode> = topological_order(&inner, &visited)
            .into_iter()
            .filter_map(|id| inner.nodes.get(id).cloned())
            .collect();
        let actions = path
            .iter()
            .filter_map(|n| n.as_action().cloned())
            .collect();

        Some(WhyResult {
            effect,
            actions,
            path,
        })
    }

    /// Everything downstream of `action_id` that would be lost without it.
    ///
    /// Direct effects come from the action's own `causes` edges. From each
    /// effect, `enables` edges reach impacted actions, whose `causes` edges
    /// reach indirect effects, until nothing new is found. Every node is
    /// reported at most once. Returns `None` unless `action_id` names an action.
    pub fn what_if(&self, action_id: &str) -> Option<WhatIfResult> {
        let inner = self.inner.read();
        let removed_action = inner.nodes.get(action_id)?.as_action()?.clone();

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(action_id);

        let mut queue: VecDeque<&str> = VecDeque::new();
        let mut direct_effects = Vec::new();
        for edge in inner.outgoing_edges(action_id, EdgeKind::Causes) {
            if visited.insert(edge.to.as_str()) {
                queue.push_back(edge.to.as_str());
                if let Some(effect) = inner.nodes.get(&edge.to).and_then(GraphNode::as_effect) {
                    direct_effects.push(effect.clone());
                }
            }
        }

        let mut impacted_actions = Vec::new();
        let mut indirect_effects = Vec::new();
        while let Some(effect_id) = queue.pop_front() {
            for enable in inner.outgoing_edges(effect_id, EdgeKind::Enables) {
                if !visited.insert(enable.to.as_str()) {
                    continue;
                }
                if let Some(action) = inner.nodes.get(&enable.to).and_then(GraphNode::as_action) {
                    impacted_actions.push(action.clone());
                }
                for cause in inner.outgoing_edges(&enable.to, EdgeKind::Causes) {
                    if visited.insert(cause.to.as_str()) {
                        queue.push_back(cause.to.as_str());
                        if let Some(effect) =
                            inner.nodes.get(&cause.to).and_then(GraphNode::as_effect)
                        {
                            indirect_effects.push(effect.clone());
                        }
                    }
                }
            }
        }

        Some(WhatIfResult {
            removed_action,
            direct_effects,
            indirect_effects,
            impacted_actions,
        })
    }
}

/// Kahn's algorithm over the subgraph induced by `nodes`.
///
/// Ready nodes are taken in insertion order. Nodes caught in a cycle never
/// become ready; they are appended afterwards, also in insertion order.
fn topological_order<'a>(inner: &'a GraphInner, nodes: &HashSet<&'a str>) -> Vec<&'a str> {
    let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|&id| (id, 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &inner.edges {
        let (from, to) = (edge.from.as_str(), edge.to.as_str());
        if nodes.contains(from) && nodes.contains(to) {
            successors.entry(from).or_default().push(to);
            if let Some(d) = in_degree.get_mut(to) {
                *d += 1;
            }
        }
    }

    let mut ready: BTreeSet<(usize, &str)> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(&id, _)| (inner.position(id), id))
        .collect();

    let mut ordered = Vec::with_capacity(nodes.len());
    while let Some(next) = ready.pop_first() {
        let (_, id) = next;
        ordered.push(id);
        for &succ in successors.get(id).into_iter().flatten() {
            if let Some(d) = in_degree.get_mut(succ) {
                *d -= 1;
                if *d == 0 {
                    ready.insert((inner.position(succ), succ));
                }
            }
        }
    }

    if ordered.len() < nodes.len() {
        let placed: HashSet<&str> = ordered.iter().copied().collect();
        let mut rest: Vec<&str> = nodes.iter().copied().filter(|id| !placed.contains(id)).collect();
        rest.sort_by_key(|id| inner.position(id));
        ordered.extend(rest);
    }
    ordered
}
