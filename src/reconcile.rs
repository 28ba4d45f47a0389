//! Merges freshly compiled default geometry with previously known positions.
//!
//! Exactly one position source wins per pass: an explicitly loaded map (user
//! opened a saved diagram), else the session's last known in-session map,
//! else whatever storage persisted. Nodes absent from the winning source, or
//! present with non-finite coordinates, keep their compiler defaults.

use tracing::debug;

use crate::compiler::fit_group_to_children;
use crate::config::LayoutConfig;
use crate::graph::{Graph, NodeKind, PositionMap, harvest_positions};

/// Applies the winning position source to a freshly compiled graph, refits
/// group sizes around the repositioned children, and returns the graph along
/// with the full output position map for persistence.
///
/// Idempotent: reconciling a reconciled graph against its own output map is
/// a no-op.
pub fn reconcile(
    mut fresh: Graph,
    explicit: Option<&PositionMap>,
    last_known: &PositionMap,
    persisted: &PositionMap,
    config: &LayoutConfig,
) -> (Graph, PositionMap) {
    let winner = match explicit {
        Some(map) if !map.is_empty() => map,
        _ if !last_known.is_empty() => last_known,
        _ => persisted,
    };
    debug!(
        nodes = fresh.nodes.len(),
        known = winner.len(),
        "reconciling compiled graph against saved positions"
    );

    for node in &mut fresh.nodes {
        let Some(geometry) = winner.get(&node.id) else {
            continue;
        };
        if geometry.has_finite_position() {
            node.position.x = geometry.x;
            node.position.y = geometry.y;
        }
        if node.is_resizable() {
            if let Some(width) = geometry.width.filter(|w| w.is_finite()) {
                node.size.width = width;
            }
            if let Some(height) = geometry.height.filter(|h| h.is_finite()) {
                node.size.height = height;
            }
        }
    }

    // Children may now sit anywhere; group sizes must still enclose them.
    let group_ids: Vec<String> = fresh
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Group)
        .map(|n| n.id.clone())
        .collect();
    for group_id in &group_ids {
        fit_group_to_children(&mut fresh, group_id, config);
    }

    let map = harvest_positions(&fresh);
    (fresh, map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, default_group_size};
    use crate::graph::NodeGeometry;
    use crate::schema;

    fn compiled(source: &str) -> Graph {
        compile(&schema::parse(source).unwrap(), &LayoutConfig::default())
    }

    fn two_tables() -> Graph {
        compiled("Table users {\n  id int\n}\nTable posts {\n  id int\n}\n")
    }

    #[test]
    fn round_trip_is_a_no_op() {
        let config = LayoutConfig::default();
        let fresh = two_tables();
        let defaults = harvest_positions(&fresh);
        let (graph, map) = reconcile(
            fresh.clone(),
            None,
            &defaults,
            &PositionMap::new(),
            &config,
        );
        assert_eq!(graph, fresh);
        assert_eq!(map, defaults);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let config = LayoutConfig::default();
        let mut persisted = PositionMap::new();
        persisted.insert("users".into(), NodeGeometry::at(500.0, -40.0));
        let (first, first_map) = reconcile(
            two_tables(),
            None,
            &PositionMap::new(),
            &persisted,
            &config,
        );
        let (second, second_map) =
            reconcile(first.clone(), None, &first_map, &persisted, &config);
        assert_eq!(first, second);
        assert_eq!(first_map, second_map);
    }

    #[test]
    fn explicit_source_beats_last_known() {
        let config = LayoutConfig::default();
        let mut explicit = PositionMap::new();
        explicit.insert("users".into(), NodeGeometry::at(100.0, 100.0));
        let mut last_known = PositionMap::new();
        last_known.insert("users".into(), NodeGeometry::at(900.0, 900.0));
        let (graph, _) = reconcile(
            two_tables(),
            Some(&explicit),
            &last_known,
            &PositionMap::new(),
            &config,
        );
        let users = graph.node("users").unwrap();
        assert_eq!((users.position.x, users.position.y), (100.0, 100.0));
    }

    #[test]
    fn empty_explicit_source_falls_through() {
        let config = LayoutConfig::default();
        let explicit = PositionMap::new();
        let mut last_known = PositionMap::new();
        last_known.insert("users".into(), NodeGeometry::at(55.0, 66.0));
        let (graph, _) = reconcile(
            two_tables(),
            Some(&explicit),
            &last_known,
            &PositionMap::new(),
            &config,
        );
        let users = graph.node("users").unwrap();
        assert_eq!((users.position.x, users.position.y), (55.0, 66.0));
    }

    #[test]
    fn persisted_is_the_fallback_source()  {
        let config = LayoutConfig::default();
        let mut persisted = PositionMap::new();
        persisted.insert("posts".into(), NodeGeometry::at(-10.0, 480.0));
        let (graph, _) = reconcile(
            two_tables(),
            None,
            &PositionMap::new(),
            &persisted,
            &config,
        );
        let posts = graph.node("posts").unwrap();
        assert_eq!((posts.position.x, posts.position.y), (-10.0, 480.0));
    }

    #[test]
    fn non_finite_coordinates_keep_compiler_defaults() {
        let config = LayoutConfig::default();
        let fresh = two_tables();
        let default_pos = fresh.node("users").unwrap().position;
        let mut last_known = PositionMap::new();
        last_known.insert("users".into(), NodeGeometry::at(f32::NAN, 12.0));
        last_known.insert("posts".into(), NodeGeometry::at(7.0, f32::INFINITY));
        let (graph, map) = reconcile(fresh, None, &last_known, &PositionMap::new(), &config);
        assert_eq!(graph.node("users").unwrap().position, default_pos);
        for geometry in map.values() {
            assert!(geometry.has_finite_position());
        }
    }

    #[test]
    fn non_finite_size_override_is_rejected() {
        let config = LayoutConfig::default();
        let fresh = two_tables();
        let default_size = fresh.node("users").unwrap().size;
        let mut last_known = PositionMap::new();
        let mut geometry = NodeGeometry::at(1.0, 2.0);
        geometry.width = Some(f32::NAN);
        geometry.height = Some(300.0);
        last_known.insert("users".into(), geometry);
        let (graph, _) = reconcile(fresh, None, &last_known, &PositionMap::new(), &config);
        let users = graph.node("users").unwrap();
        assert_eq!(users.size.width, default_size.width);
        assert_eq!(users.size.height, 300.0);
    }

    #[test]
    fn group_size_encloses_far_flung_children() {
        let config = LayoutConfig::default();
        let fresh = compiled(concat!(
            "Table a {\n  id int\n}\n",
            "Table b {\n  id int\n}\n",
            "TableGroup g {\n  a\n  b\n}\n",
        ));
        let mut last_known = PositionMap::new();
        last_known.insert("a".into(), NodeGeometry::at(900.0, 1200.0));
        last_known.insert("b".into(), NodeGeometry::at(880.0, 1180.0)); // overlapping
        let (graph, _) = reconcile(fresh, None, &last_known, &PositionMap::new(), &config);
        let group = graph.node("group-g").unwrap();
        let a = graph.node("a").unwrap();
        assert!(group.size.width >= a.position.x + a.size.width + config.group_padding);
        assert!(group.size.height >= a.position.y + a.size.height + config.group_padding);
        assert!(group.size.width >= default_group_size(2, &config).width);
    }

    #[test]
    fn group_shrinks_back_when_children_return() {
        let config = LayoutConfig::default();
        let fresh = compiled(concat!(
            "Table a {\n  id int\n}\n",
            "TableGroup g {\n  a\n}\n",
        ));
        let default_size = fresh.node("group-g").unwrap().size;
        // First stretch the group far out.
        let mut stretched = PositionMap::new();
        stretched.insert("a".into(), NodeGeometry::at(2000.0, 2000.0));
        let (wide, _) = reconcile(
            fresh.clone(),
            None,
            &stretched,
            &PositionMap::new(),
            &config,
        );
        assert!(wide.node("group-g").unwrap().size.width > default_size.width);
        // A later parse with the member back at its default cell shrinks it.
        let (back, _) = reconcile(fresh, None, &PositionMap::new(), &PositionMap::new(), &config);
        assert_eq!(back.node("group-g").unwrap().size, default_size);
    }
}
