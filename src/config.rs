use serde::{Deserialize, Serialize};

/// Fixed geometry constants shared by the compiler, the reconciler and the
/// auto-layout engine.
///
/// Group sizing and member placement must use identical packing math, so both
/// read their constants from here rather than carrying private copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Width of a table node. Height derives from the field count.
    pub table_width: f32,
    /// Height of a table node's title bar.
    pub table_header_height: f32,
    /// Height of one field row inside a table node.
    pub field_row_height: f32,

    /// Tables per row when packing members inside a group.
    pub tables_per_group_row: usize,
    /// Tables per row in the grid of ungrouped tables.
    pub tables_per_free_row: usize,
    /// Packing cell width. Wider than `table_width` so packed tables keep a gutter.
    pub cell_width: f32,
    /// Packing cell height.
    pub cell_height: f32,

    /// Inner padding between a group's border and its member tables.
    pub group_padding: f32,
    /// Height of a group node's title bar.
    pub group_header_height: f32,
    /// Horizontal gap between adjacent groups, and the vertical gap between
    /// the group row and the ungrouped grid.
    pub group_gap: f32,

    /// Default size of the free-floating project panel.
    pub project_width: f32,
    pub project_height: f32,
    /// Gap between the lowest node and the project panel.
    pub project_gap: f32,

    /// Dagre spacing between nodes in the same rank.
    pub node_spacing: f32,
    /// Dagre spacing between ranks.
    pub rank_spacing: f32,

    /// Header color for tables with no annotation and no group color.
    pub default_header_color: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            table_width: 220.0,
            table_header_height: 36.0,
            field_row_height: 28.0,
            tables_per_group_row: 2,
            tables_per_free_row: 3,
            cell_width: 260.0,
            cell_height: 280.0,
            group_padding: 24.0,
            group_header_height: 40.0,
            group_gap: 48.0,
            project_width: 320.0,
            project_height: 180.0,
            project_gap: 64.0,
            node_spacing: 60.0,
            rank_spacing: 90.0,
            default_header_color: "#316896".to_string(),
        }
    }
}
