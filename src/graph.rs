//! The committed node/edge graph driving visualization, and the position map
//! that persists its geometry.
//!
//! Positions of grouped table nodes are relative to their group's interior;
//! every other node carries absolute coordinates. Both kinds are stored
//! verbatim in the [`PositionMap`], so a map round-trips without coordinate
//! conversion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel id of the single project panel node.
pub const PROJECT_NODE_ID: &str = "__project__";

/// Node id of the group named `name`.
pub fn group_node_id(name: &str) -> String {
    format!("group-{name}")
}

/// Clamps non-finite coordinates to zero. Every computed position or size
/// passes through here before being stored on a node.
pub fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Table,
    Group,
    Project,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub type_name: String,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_not_null: bool,
    pub note: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodePayload {
    Table {
        fields: Vec<FieldInfo>,
        header_color: String,
        note: Option<String>,
    },
    Group {
        color: Option<String>,
    },
    Project {
        name: Option<String>,
        database_type: Option<String>,
        note: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub position: Point,
    pub size: Size,
    /// Set only on table nodes, pointing at the owning group node.
    pub parent_id: Option<String>,
    pub payload: NodePayload,
}

impl Node {
    /// Whether the reconciler may apply a stored `{width, height}` override.
    /// Group sizes are always derived from their children instead.
    pub fn is_resizable(&self) -> bool {
        matches!(self.kind, NodeKind::Table | NodeKind::Project)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }
}

/// Persisted geometry for one node. Width/height are present only for
/// resizable kinds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeGeometry {
    pub x: f32,
    pub y: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
}

impl NodeGeometry {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            width: None,
            height: None,
        }
    }

    /// Whether the coordinates are safe to apply to a node.
    pub fn has_finite_position(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The unit of layout persistence: node id to geometry. BTreeMap keeps
/// serialization deterministic.
pub type PositionMap = BTreeMap<String, NodeGeometry>;

/// Harvests the current geometry of every node into a position map, the
/// shape handed to the persistence collaborator.
pub fn harvest_positions(graph: &Graph) -> PositionMap {
    let mut map = PositionMap::new();
    for node in &graph.nodes {
        let mut geometry = NodeGeometry::at(node.position.x, node.position.y);
        if node.is_resizable() {
            geometry.width = Some(node.size.width);
            geometry.height = Some(node.size.height);
        }
        map.insert(node.id.clone(), geometry);
    }
    map
}

/// Lenient loader for position maps coming out of storage. Entries whose
/// coordinates are missing or not finite numbers are dropped; width/height
/// are kept only when finite. Anything that is not a JSON object yields an
/// empty map.
pub fn position_map_from_json(value: &serde_json::Value) -> PositionMap {
    let mut map = PositionMap::new();
    let Some(entries) = value.as_object() else {
        return map;
    };
    for (id, entry) in entries {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let coord = |key: &str| obj.get(key).and_then(|v| v.as_f64()).map(|v| v as f32);
        let (Some(x), Some(y)) = (coord("x"), coord("y")) else {
            continue;
        };
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        let mut geometry = NodeGeometry::at(x, y);
        geometry.width = coord("width").filter(|w| w.is_finite());
        geometry.height = coord("height").filter(|h| h.is_finite());
        map.insert(id.clone(), geometry);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finite_or_zero_clamps_nan_and_infinity() {
        assert_eq!(finite_or_zero(f32::NAN), 0.0);
        assert_eq!(finite_or_zero(f32::INFINITY), 0.0);
        assert_eq!(finite_or_zero(f32::NEG_INFINITY), 0.0);
        assert_eq!(finite_or_zero(-12.5), -12.5);
        assert_eq!(finite_or_zero(0.0), 0.0);
    }

    #[test]
    fn lenient_json_loader_drops_malformed_entries() {
        let value = json!({
            "users": {"x": 10.0, "y": 20.0, "width": 220.0, "height": 92.0},
            "posts": {"x": "oops", "y": 5.0},
            "tags": {"y": 5.0},
            "group-auth": {"x": 1.0, "y": 2.0},
            "junk": 42,
        });
        let map = position_map_from_json(&value);
        assert_eq!(map.len(), 2);
        assert_eq!(map["users"].width, Some(220.0));
        assert!(map["group-auth"].has_finite_position());
        assert!(!map.contains_key("posts"));
        assert!(!map.contains_key("tags"));
    }

    #[test]
    fn lenient_json_loader_tolerates_non_objects() {
        assert!(position_map_from_json(&json!([1, 2, 3])).is_empty());
        assert!(position_map_from_json(&json!("positions")).is_empty());
    }
}
