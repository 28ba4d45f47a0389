use dbml_graph::{
    LayoutConfig, LayoutDirection, NodeGeometry, NodeKind, PositionMap, Session, compile,
    diagram_key, harvest_positions, parse, reconcile,
};

const BLOG_SCHEMA: &str = r#"
Project blog {
  database_type: 'PostgreSQL'
  Note: 'example blog schema'
}

Table users [headerColor: #3498db] {
  id int [pk, not null]
  email varchar(255) [unique]
  name varchar
}

Table posts {
  id int [pk]
  user_id int [ref: > users.id]
  title varchar [not null]
  body text [note: 'markdown']
}

Table comments {
  id int [pk]
  post_id int [ref: > posts.id]
  author_id int [ref: > users.id]
}

Table audit_log {
  id int [pk]
  payload text
}

TableGroup content [color: #9b59b6] {
  posts
  comments
}
"#;

fn default_config() -> LayoutConfig {
    LayoutConfig::default()
}

#[test]
fn full_pipeline_compiles_blog_schema() {
    let schema = parse(BLOG_SCHEMA).expect("parse failed");
    assert_eq!(schema.tables.len(), 4);
    assert_eq!(schema.groups.len(), 1);
    assert_eq!(schema.refs.len(), 3);
    assert!(schema.project.is_some());

    let graph = compile(&schema, &default_config());
    let tables = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Table)
        .count();
    let groups = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Group)
        .count();
    let projects = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Project)
        .count();
    assert_eq!((tables, groups, projects), (4, 1, 1));
    assert_eq!(graph.edges.len(), 3);

    // Grouped tables reference an existing group node.
    for node in &graph.nodes {
        if let Some(parent) = &node.parent_id {
            assert_eq!(node.kind, NodeKind::Table);
            assert_eq!(graph.node(parent).unwrap().kind, NodeKind::Group);
        }
    }
    // Node ids are unique.
    let mut ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), graph.nodes.len());
}

#[test]
fn positions_stay_finite_under_hostile_position_maps() {
    let schema = parse(BLOG_SCHEMA).unwrap();
    let config = default_config();
    let hostile_values = [f32::NAN, f32::INFINITY, f32::NEG_INFINITY, 1.0e30, -0.0];
    for (i, &x) in hostile_values.iter().enumerate() {
        for (j, &y) in hostile_values.iter().enumerate() {
            let mut map = PositionMap::new();
            let mut geometry = NodeGeometry::at(x, y);
            if (i + j) % 2 == 0 {
                geometry.width = Some(f32::NAN);
            }
            map.insert("users".into(), geometry);
            map.insert("group-content".into(), NodeGeometry::at(y, x));
            let (graph, out) = reconcile(
                compile(&schema, &config),
                None,
                &map,
                &PositionMap::new(),
                &config,
            );
            for node in &graph.nodes {
                assert!(
                    node.position.x.is_finite() && node.position.y.is_finite(),
                    "non-finite position leaked for {}",
                    node.id
                );
                assert!(node.size.width.is_finite() && node.size.height.is_finite());
            }
            for geometry in out.values() {
                assert!(geometry.has_finite_position());
            }
        }
    }
}

#[test]
fn compile_reconcile_round_trip_keeps_defaults() {
    let schema = parse(BLOG_SCHEMA).unwrap();
    let config = default_config();
    let fresh = compile(&schema, &config);
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
fn precedence_explicit_load_then_session_tracking() {
    let config = default_config();
    let mut session = Session::new(config);
    session.update_source(BLOG_SCHEMA).unwrap();
    session.move_node("users", 1111.0, 2222.0);

    let mut loaded = PositionMap::new();
    loaded.insert("users".into(), NodeGeometry::at(50.0, 60.0));
    session.load_diagram(BLOG_SCHEMA, &loaded).unwrap();
    let users = session.graph().node("users").unwrap();
    assert_eq!((users.position.x, users.position.y), (50.0, 60.0));

    // Without an explicit load, the just-applied value is the new
    // in-session source of truth.
    session.update_source(BLOG_SCHEMA).unwrap();
    let users = session.graph().node("users").unwrap();
    assert_eq!((users.position.x, users.position.y), (50.0, 60.0));
}

#[test]
fn auto_layout_then_undo_restores_previous_geometry() {
    let mut session = Session::new(default_config());
    session.update_source(BLOG_SCHEMA).unwrap();
    let before = session.position_map();
    session.apply_auto_layout(LayoutDirection::LeftRight);
    let after = session.position_map();
    assert_ne!(before, after);
    assert!(session.undo());
    assert_eq!(session.position_map(), before);
    assert!(session.redo());
    assert_eq!(session.position_map(), after);
}

#[test]
fn group_invariant_holds_through_drags_and_reparse() {
    let config = default_config();
    let mut session = Session::new(config.clone());
    session.update_source(BLOG_SCHEMA).unwrap();
    session.move_node("posts", 700.0, 900.0);
    session.move_node("comments", -30.0, 40.0);
    session.update_source(BLOG_SCHEMA).unwrap();

    let graph = session.graph();
    let group = graph.node("group-content").unwrap();
    for node in &graph.nodes {
        if node.parent_id.as_deref() == Some("group-content") {
            assert!(node.position.x + node.size.width <= group.size.width);
            assert!(node.position.y + node.size.height <= group.size.height);
        }
    }
}

#[test]
fn renamed_table_is_a_new_node_for_position_purposes() {
    let mut session = Session::new(default_config());
    session.update_source(BLOG_SCHEMA).unwrap();
    session.move_node("audit_log", 5000.0, 5000.0);
    let renamed = BLOG_SCHEMA.replace("audit_log", "event_log");
    session.update_source(&renamed).unwrap();
    let graph = session.graph();
    assert!(graph.node("audit_log").is_none());
    // The renamed table gets fresh compiler defaults, not the dragged spot.
    let moved = graph.node("event_log").unwrap();
    assert_ne!(
        (moved.position.x, moved.position.y),
        (5000.0, 5000.0)
    );
}

#[test]
fn diagram_key_round_trip_matches_source_identity() {
    let key = diagram_key(BLOG_SCHEMA);
    assert_eq!(key, diagram_key(BLOG_SCHEMA));
    assert_ne!(key, diagram_key(&BLOG_SCHEMA.replace("users", "people")));
}

#[test]
fn storage_loader_feeds_reconciler_safely() {
    let raw = serde_json::json!({
        "users": {"x": 42.0, "y": 24.0},
        "posts": {"x": null, "y": 1.0},
        "__project__": {"x": 0.0, "y": 3000.0, "width": 500.0, "height": 220.0},
    });
    let persisted = dbml_graph::position_map_from_json(&raw);
    let mut session = Session::with_persisted(default_config(), persisted);
    session.update_source(BLOG_SCHEMA).unwrap();
    let graph = session.graph();
    let users = graph.node("users").unwrap();
    assert_eq!((users.position.x, users.position.y), (42.0, 24.0));
    let project = graph.node("__project__").unwrap();
    assert_eq!(project.size.width, 500.0);
    // The malformed posts entry was dropped, so posts keeps a compiled default.
    assert!(graph.node("posts").unwrap().position.x.is_finite());
}
