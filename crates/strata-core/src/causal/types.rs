use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::state::StateDiff;
use crate::Metadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionNode {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl ActionNode {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            tool_call: None,
            inputs: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_tool_call(mut self, tool_call: Value) -> Self {
        self.tool_call = Some(tool_call);
        self
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The state change an effect describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectStateDiff {
    pub key: String,
    pub before: Value,
    pub after: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectNode {
    pub id: String,
    pub description: String,
    pub state_diff: EffectStateDiff,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl EffectNode {
    pub fn new(id: &str, description: &str, key: &str, before: Value, after: Value) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            state_diff: EffectStateDiff {
                key: key.to_string(),
                before,
                after,
            },
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Build an effect from a state store diff; absent sides become `null`.
    pub fn from_state_diff(id: &str, description: &str, diff: &StateDiff<Value>) -> Self {
        let side = |e: &Option<crate::state::StateEntry<Value>>| {
            e.as_ref().map(|e| e.value.clone()).unwrap_or(Value::Null)
        };
        Self::new(id, description, &diff.key, side(&diff.before), side(&diff.after))
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphNode {
    Action(ActionNode),
    Effect(EffectNode),
}

impl GraphNode {
    pub fn id(&self) -> &str {
        match self {
            Self::Action(a) => &a.id,
            Self::Effect(e) => &e.id,
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action(_))
    }

    pub fn as_action(&self) -> Option<&ActionNode> {
        match self {
            Self::Action(a) => Some(a),
            Self::Effect(_) => None,
        }
    }

    pub fn as_effect(&self) -> Option<&EffectNode> {
        match self {
            Self::Effect(e) => Some(e),
            Self::Action(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Action → Effect.
    Causes,
    /// Effect → Action.
    Enables,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub timestamp: DateTime<Utc>,
}

impl GraphEdge {
    pub(crate) fn new(from: &str, to: &str, kind: EdgeKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum GraphMutation {
    AddNode { node: GraphNode },
    AddEdge { edge: GraphEdge },
}

/// One immutable record of a graph mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLogEntry {
    pub id: String,
    /// External event that caused the mutation.
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub mutation: GraphMutation,
}

impl GraphLogEntry {
    pub(crate) fn new(event_id: &str, mutation: GraphMutation) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_id: event_id.to_string(),
            timestamp: Utc::now(),
            mutation,
        }
    }

    pub fn node(&self) -> Option<&GraphNode> {
        match &self.mutation {
            GraphMutation::AddNode { node } => Some(node),
            GraphMutation::AddEdge { .. } => None,
        }
    }

    pub fn edge(&self) -> Option<&GraphEdge> {
        match &self.mutation {
            GraphMutation::AddEdge { edge } => Some(edge),
            GraphMutation::AddNode { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DiffOperation, StateEntry};
    use serde_json::json;

    #[test]
    fn node_serializes_with_kind_tag() {
        let node = GraphNode::Action(ActionNode::new("a1", "fetch"));
        let v = serde_json::to_value(&node).unwrap();
        assert_eq!(v["kind"], "action");
        assert_eq!(v["name"], "fetch");
        let back: GraphNode = serde_json::from_value(v).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn edge_kind_serializes_as_type() {
        let edge = GraphEdge::new("a", "e", EdgeKind::Causes);
        let v = serde_json::to_value(&edge).unwrap();
        assert_eq!(v["type"], "causes");
    }

    #[test]
    fn effect_from_state_diff_fills_null_for_create() {
        let diff = StateDiff {
            key: "user:1".into(),
            before: None,
            after: Some(StateEntry {
                key: "user:1".into(),
                value: json!({"name": "A"}),
                version: 1,
                timestamp: Utc::now(),
                metadata: Metadata::new(),
            }),
            operation: DiffOperation::Create,
            timestamp: Utc::now(),
        };
        let effect = EffectNode::from_state_diff("e1", "user created", &diff);
        assert_eq!(effect.state_diff.key, "user:1");
        assert_eq!(effect.state_diff.before, Value::Null);
        assert_eq!(effect.state_diff.after, json!({"name": "A"}));
    }

    #[test]
    fn log_entry_accessors() {
        let entry = GraphLogEntry::new(
            "evt-1",
            GraphMutation::AddNode {
                node: GraphNode::Action(ActionNode::new("a", "a")),
            },
        );
        assert!(entry.node().is_some());
        assert!(entry.edge().is_none());
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["mutation"]["operation"], "add_node");
    }
}
