//! Schema-to-graph compilation: tables, groups and the project panel become
//! typed nodes with default geometry, relationships become edges.
//!
//! Compilation is a pure function of the schema. It knows nothing about
//! previously saved positions; the reconciler overlays those afterwards.

use std::collections::HashMap;
use tracing::warn;

use crate::config::LayoutConfig;
use crate::graph::{
    Edge, FieldInfo, Graph, Node, NodeKind, NodePayload, Point, PROJECT_NODE_ID, Size,
    finite_or_zero, group_node_id,
};
use crate::schema::{Schema, Table};

/// Row-major cell of the `index`-th table in a grid `per_row` wide.
pub(crate) fn packed_cell(index: usize, per_row: usize) -> (usize, usize) {
    let per_row = per_row.max(1);
    (index / per_row, index % per_row)
}

/// Default size of a group holding `member_count` tables, derived from the
/// same packing grid that places the members. The reconciler reuses this as
/// the floor when refitting groups around dragged children.
pub(crate) fn default_group_size(member_count: usize, config: &LayoutConfig) -> Size {
    let per_row = config.tables_per_group_row.max(1);
    let cols = member_count.min(per_row).max(1);
    let rows = member_count.div_ceil(per_row);
    Size {
        width: finite_or_zero(config.group_padding * 2.0 + cols as f32 * config.cell_width),
        height: finite_or_zero(
            config.group_header_height + config.group_padding * 2.0
                + rows as f32 * config.cell_height,
        ),
    }
}

/// Group-relative position of the `index`-th member table.
pub(crate) fn member_position(index: usize, config: &LayoutConfig) -> Point {
    let (row, col) = packed_cell(index, config.tables_per_group_row);
    Point {
        x: finite_or_zero(config.group_padding + col as f32 * config.cell_width),
        y: finite_or_zero(
            config.group_header_height + config.group_padding + row as f32 * config.cell_height,
        ),
    }
}

/// Resizes a group so it encloses its current children (group-relative
/// coordinates), never shrinking below the packing-grid default for its
/// member count. Runs at compile time and again after every reconciliation.
pub(crate) fn fit_group_to_children(graph: &mut Graph, group_id: &str, config: &LayoutConfig) {
    let mut member_count = 0usize;
    let mut max_x = 0.0f32;
    let mut max_y = 0.0f32;
    for node in &graph.nodes {
        if node.parent_id.as_deref() != Some(group_id) {
            continue;
        }
        member_count += 1;
        max_x = max_x.max(node.position.x + node.size.width);
        max_y = max_y.max(node.position.y + node.size.height);
    }
    let floor = default_group_size(member_count, config);
    let fitted = Size {
        width: finite_or_zero(floor.width.max(max_x + config.group_padding)),
        height: finite_or_zero(floor.height.max(max_y + config.group_padding)),
    };
    if let Some(group) = graph.node_mut(group_id) {
        group.size = fitted;
    }
}

fn table_size(table: &Table, config: &LayoutConfig) -> Size {
    Size {
        width: finite_or_zero(config.table_width),
        height: finite_or_zero(
            config.table_header_height + table.fields.len() as f32 * config.field_row_height,
        ),
    }
}

fn table_payload(table: &Table, group_color: Option<&str>, config: &LayoutConfig) -> NodePayload {
    // Inline annotation wins over the group color, which wins over the default.
    let header_color = table
        .header_color
        .clone()
        .or_else(|| group_color.map(|c| c.to_string()))
        .unwrap_or_else(|| config.default_header_color.clone());
    NodePayload::Table {
        fields: table
            .fields
            .iter()
            .map(|f| FieldInfo {
                name: f.name.clone(),
                type_name: f.type_name.clone(),
                is_primary_key: f.is_primary_key,
                is_unique: f.is_unique,
                is_not_null: f.is_not_null,
                note: f.note.clone(),
                default: f.default.clone(),
            })
            .collect(),
        header_color,
        note: table.note.clone(),
    }
}

/// Compiles a canonical schema into a fresh graph with default geometry.
/// Never fails: an empty schema yields an empty graph, and malformed
/// relationships are skipped individually.
pub fn compile(schema: &Schema, config: &LayoutConfig) -> Graph {
    let mut graph = Graph::default();
    if schema.tables.is_empty() {
        return graph;
    }

    // A table belongs to the first group that declares it.
    let mut membership: HashMap<&str, usize> = HashMap::new();
    for (group_idx, group) in schema.groups.iter().enumerate() {
        for name in &group.table_names {
            if membership.contains_key(name.as_str()) {
                warn!(
                    table = %name,
                    group = %group.name,
                    "table is already grouped, ignoring later membership"
                );
                continue;
            }
            membership.insert(name.as_str(), group_idx);
        }
    }
    let mut member_counts: Vec<usize> = vec![0; schema.groups.len()];
    for table in &schema.tables {
        if let Some(&idx) = membership.get(table.name.as_str()) {
            member_counts[idx] += 1;
        }
    }

    // Group row, left to right in declaration order.
    let mut cursor_x = 0.0f32;
    let mut group_row_bottom = 0.0f32;
    for (idx, group) in schema.groups.iter().enumerate() {
        let size = default_group_size(member_counts[idx], config);
        graph.nodes.push(Node {
            id: group_node_id(&group.name),
            kind: NodeKind::Group,
            position: Point {
                x: finite_or_zero(cursor_x),
                y: 0.0,
            },
            size,
            parent_id: None,
            payload: NodePayload::Group {
                color: group.header_color.clone(),
            },
        });
        cursor_x += size.width + config.group_gap;
        group_row_bottom = group_row_bottom.max(size.height);
    }

    // Ungrouped tables go in a wider grid below the group row.
    let free_top = if schema.groups.is_empty() {
        0.0
    } else {
        group_row_bottom + config.group_gap
    };
    let mut member_cursor: Vec<usize> = vec![0; schema.groups.len()];
    let mut free_cursor = 0usize;
    for table in &schema.tables {
        let (position, parent_id, group_color) = match membership.get(table.name.as_str()) {
            Some(&group_idx) => {
                let group = &schema.groups[group_idx];
                let position = member_position(member_cursor[group_idx], config);
                member_cursor[group_idx] += 1;
                (
                    position,
                    Some(group_node_id(&group.name)),
                    group.header_color.as_deref(),
                )
            }
            None => {
                let (row, col) = packed_cell(free_cursor, config.tables_per_free_row);
                free_cursor += 1;
                let position = Point {
                    x: finite_or_zero(col as f32 * config.cell_width),
                    y: finite_or_zero(free_top + row as f32 * config.cell_height),
                };
                (position, None, None)
            }
        };
        graph.nodes.push(Node {
            id: table.name.clone(),
            kind: NodeKind::Table,
            position,
            size: table_size(table, config),
            parent_id,
            payload: table_payload(table, group_color, config),
        });
    }

    // Tall tables can overflow their packing cell; grow the groups to fit.
    let group_ids: Vec<String> = schema.groups.iter().map(|g| group_node_id(&g.name)).collect();
    for group_id in &group_ids {
        fit_group_to_children(&mut graph, group_id, config);
    }

    for (idx, rel) in schema.refs.iter().enumerate() {
        if graph.node(&rel.source_table).is_none() || graph.node(&rel.target_table).is_none() {
            warn!(
                source = %rel.source_table,
                target = %rel.target_table,
                "skipping relationship with missing endpoint"
            );
            continue;
        }
        graph.edges.push(Edge {
            id: format!("ref-{idx}"),
            source: rel.source_table.clone(),
            target: rel.target_table.clone(),
            label: rel.name.clone(),
        });
    }

    if let Some(project) = &schema.project {
        let bottom = graph
            .nodes
            .iter()
            .filter(|n| n.parent_id.is_none())
            .map(|n| n.position.y + n.size.height)
            .fold(0.0f32, f32::max);
        graph.nodes.push(Node {
            id: PROJECT_NODE_ID.to_string(),
            kind: NodeKind::Project,
            position: Point {
                x: 0.0,
                y: finite_or_zero(bottom + config.project_gap),
            },
            size: Size {
                width: finite_or_zero(config.project_width),
                height: finite_or_zero(config.project_height),
            },
            parent_id: None,
            payload: NodePayload::Project {
                name: project.name.clone(),
                database_type: project.database_type.clone(),
                note: project.note.clone(),
            },
        });
    }

    graph
}
