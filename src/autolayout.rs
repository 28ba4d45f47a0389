//! On-demand hierarchical layout over the committed graph.
//!
//! Runs dagre over the table nodes driven by relationship edges, then wraps
//! each group around its relocated members and re-seats the project panel.
//! Positions are rewritten in place; persisting the result is the caller's
//! job, through the same path as a manual drag.

use dagre_rust::{
    GraphConfig as DagreConfig, GraphEdge as DagreEdge, GraphNode as DagreNode,
    layout as dagre_layout,
};
use graphlib_rust::{Graph as DagreGraph, GraphOption};
use std::collections::HashSet;

use crate::config::LayoutConfig;
use crate::graph::{Graph, NodeKind, PROJECT_NODE_ID, finite_or_zero};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutDirection {
    TopBottom,
    LeftRight,
}

impl LayoutDirection {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "TB" | "TD" => Some(Self::TopBottom),
            "LR" => Some(Self::LeftRight),
            _ => None,
        }
    }

    fn rankdir(self) -> &'static str {
        match self {
            Self::TopBottom => "TB",
            Self::LeftRight => "LR",
        }
    }
}

/// Reassigns every node's position using a layered layout in the given
/// direction. Disconnected tables fall to dagre's default placement;
/// self-edges are ignored since they never affect ranking.
pub fn auto_layout(graph: &mut Graph, direction: LayoutDirection, config: &LayoutConfig) {
    let tables: Vec<(String, f32, f32)> = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Table)
        .map(|n| (n.id.clone(), n.size.width, n.size.height))
        .collect();
    if tables.is_empty() {
        return;
    }

    let mut dagre_graph: DagreGraph<DagreConfig, DagreNode, DagreEdge> =
        DagreGraph::new(Some(GraphOption {
            directed: Some(true),
            multigraph: Some(false),
            compound: Some(false),
        }));

    let mut graph_config = DagreConfig::default();
    graph_config.rankdir = Some(direction.rankdir().to_string());
    graph_config.nodesep = Some(config.node_spacing);
    graph_config.ranksep = Some(config.rank_spacing);
    graph_config.marginx = Some(8.0);
    graph_config.marginy = Some(8.0);
    dagre_graph.set_graph(graph_config);

    let table_set: HashSet<&str> = tables.iter().map(|(id, _, _)| id.as_str()).collect();
    for (order, (id, width, height)) in tables.iter().enumerate() {
        let mut node = DagreNode::default();
        node.width = *width;
        node.height = *height;
        node.order = Some(order);
        dagre_graph.set_node(id.clone(), Some(node));
    }

    let mut edge_set: HashSet<(String, String)> = HashSet::new();
    for edge in &graph.edges {
        if edge.source == edge.target {
            continue;
        }
        if !table_set.contains(edge.source.as_str()) || !table_set.contains(edge.target.as_str()) {
            continue;
        }
        if !edge_set.insert((edge.source.clone(), edge.target.clone())) {
            continue;
        }
        let edge_label = DagreEdge::default();
        let _ = dagre_graph.set_edge(&edge.source, &edge.target, Some(edge_label), None);
    }

    dagre_layout::run_layout(&mut dagre_graph);

    // Dagre reports centers; nodes store top-left corners.
    for (id, width, height) in &tables {
        let Some(dagre_node) = dagre_graph.node(id) else {
            continue;
        };
        if let Some(node) = graph.node_mut(id) {
            node.position.x = finite_or_zero(dagre_node.x - width / 2.0);
            node.position.y = finite_or_zero(dagre_node.y - height / 2.0);
        }
    }

    wrap_groups(graph, config);
    reseat_project(graph, config);
}

/// Moves each group to enclose its members and converts the members back to
/// group-relative coordinates.
fn wrap_groups(graph: &mut Graph, config: &LayoutConfig) {
    let group_ids: Vec<String> = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Group)
        .map(|n| n.id.clone())
        .collect();
    for group_id in &group_ids {
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        for node in &graph.nodes {
            if node.parent_id.as_deref() == Some(group_id.as_str()) {
                min_x = min_x.min(node.position.x);
                min_y = min_y.min(node.position.y);
            }
        }
        if !min_x.is_finite() || !min_y.is_finite() {
            continue; // empty group keeps its place
        }
        let origin_x = min_x - config.group_padding;
        let origin_y = min_y - config.group_header_height - config.group_padding;
        for node in &mut graph.nodes {
            if node.parent_id.as_deref() == Some(group_id.as_str()) {
                node.position.x = finite_or_zero(node.position.x - origin_x);
                node.position.y = finite_or_zero(node.position.y - origin_y);
            }
        }
        if let Some(group) = graph.node_mut(group_id) {
            group.position.x = finite_or_zero(origin_x);
            group.position.y = finite_or_zero(origin_y);
        }
        crate::compiler::fit_group_to_children(graph, group_id, config);
    }
}

fn reseat_project(graph: &mut Graph, config: &LayoutConfig) {
    let mut bottom = 0.0f32;
    let mut left = f32::INFINITY;
    for node in &graph.nodes {
        if node.kind == NodeKind::Project || node.parent_id.is_some() {
            continue;
        }
        bottom = bottom.max(node.position.y + node.size.height);
        left = left.min(node.position.x);
    }
    if let Some(project) = graph.node_mut(PROJECT_NODE_ID) {
        project.position.x = finite_or_zero(if left.is_finite() { left } else { 0.0 });
        project.position.y = finite_or_zero(bottom + config.project_gap);
    }
}
