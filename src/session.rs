//! Single-owner editing session tying the pipeline together: source text in,
//! committed graph and position map out.
//!
//! Every successful parse runs compile then reconcile and pushes a history
//! snapshot; manual drags, resizes and auto-layout mutate the committed
//! graph directly and go through the same snapshot path. The session owns
//! the "last known in-session positions" the reconciler consults, so layout
//! survives re-parses without hidden module state.

use std::time::{Duration, Instant};
use tracing::debug;

use crate::autolayout::{LayoutDirection, auto_layout};
use crate::compiler::{compile, fit_group_to_children};
use crate::config::LayoutConfig;
use crate::graph::{Graph, PositionMap, harvest_positions};
use crate::history::{History, Snapshot};
use crate::schema::{self, SchemaError};

/// Identity key of a diagram: hash of its source text. Identical source
/// always maps to the same stored positions.
pub fn diagram_key(source: &str) -> String {
    blake3::hash(source.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Default)]
pub struct Session {
    config: LayoutConfig,
    graph: Graph,
    last_known: PositionMap,
    persisted: PositionMap,
    history: History,
}

impl Session {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Seeds the session with positions the storage collaborator recovered
    /// for this diagram's identity key.
    pub fn with_persisted(config: LayoutConfig, persisted: PositionMap) -> Self {
        Self {
            config,
            persisted,
            ..Self::default()
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The current persistence payload: every node's final geometry.
    pub fn position_map(&self) -> PositionMap {
        harvest_positions(&self.graph)
    }

    pub fn set_persisted_positions(&mut self, persisted: PositionMap) {
        self.persisted = persisted;
    }

    /// Re-parses the source text and commits the resulting graph.
    ///
    /// Empty input commits an empty graph and reports success ("no diagram",
    /// not an error banner). A syntax error clears the committed graph so
    /// the viewer never keeps rendering stale data, and surfaces the
    /// located error for inline highlighting.
    pub fn update_source(&mut self, source: &str) -> Result<&Graph, SchemaError> {
        let schema = match schema::parse(source) {
            Ok(schema) => schema,
            Err(err) if err.is_empty_input() => {
                self.commit(Graph::default());
                return Ok(&self.graph);
            }
            Err(err) => {
                debug!(message = %err.message, "parse failed, clearing committed graph");
                self.graph = Graph::default();
                return Err(err);
            }
        };
        let fresh = compile(&schema, &self.config);
        // The rendered graph's own positions back up the in-session map.
        let last_known = if self.last_known.is_empty() {
            harvest_positions(&self.graph)
        } else {
            self.last_known.clone()
        };
        let (graph, map) = crate::reconcile::reconcile(
            fresh,
            None,
            &last_known,
            &self.persisted,
            &self.config,
        );
        self.last_known = map;
        self.commit(graph);
        Ok(&self.graph)
    }

    /// Opens a saved diagram: the loaded positions win outright and the
    /// in-session position tracking starts over.
    pub fn load_diagram(
        &mut self,
        source: &str,
        positions: &PositionMap,
    ) -> Result<&Graph, SchemaError> {
        let schema = match schema::parse(source) {
            Ok(schema) => schema,
            Err(err) if err.is_empty_input() => {
                self.last_known = PositionMap::new();
                self.commit(Graph::default());
                return Ok(&self.graph);
            }
            Err(err) => {
                self.graph = Graph::default();
                return Err(err);
            }
        };
        let fresh = compile(&schema, &self.config);
        let (graph, _map) = crate::reconcile::reconcile(
            fresh,
            Some(positions),
            &self.last_known,
            &self.persisted,
            &self.config,
        );
        // Loading starts a fresh editing session for position tracking.
        self.last_known = PositionMap::new();
        self.commit(graph);
        Ok(&self.graph)
    }

    /// Moves a node to new coordinates. Non-finite input is rejected and the
    /// node keeps its place.
    pub fn move_node(&mut self, id: &str, x: f32, y: f32) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        let parent = match self.graph.node_mut(id) {
            Some(node) => {
                node.position.x = x;
                node.position.y = y;
                node.parent_id.clone()
            }
            None => return false,
        };
        if let Some(group_id) = parent {
            fit_group_to_children(&mut self.graph, &group_id, &self.config);
        }
        self.commit_in_place();
        true
    }

    /// Resizes a table or project node. Groups derive their size from their
    /// children and reject manual resizing.
    pub fn resize_node(&mut self, id: &str, width: f32, height: f32) -> bool {
        if !width.is_finite() || !height.is_finite() {
            return false;
        }
        let parent = match self.graph.node_mut(id) {
            Some(node) if node.is_resizable() => {
                node.size.width = width;
                node.size.height = height;
                node.parent_id.clone()
            }
            _ => return false,
        };
        if let Some(group_id) = parent {
            fit_group_to_children(&mut self.graph, &group_id, &self.config);
        }
        self.commit_in_place();
        true
    }

    /// Rewrites every node position with the layered layout and commits.
    pub fn apply_auto_layout(&mut self, direction: LayoutDirection) {
        auto_layout(&mut self.graph, direction, &self.config);
        self.commit_in_place();
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.graph = snapshot.restore();
                self.last_known = harvest_positions(&self.graph);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.graph = snapshot.restore();
                self.last_known = harvest_positions(&self.graph);
                true
            }
            None => false,
        }
    }

    fn commit(&mut self, graph: Graph) {
        self.graph = graph;
        self.history.set_present(Snapshot::of(&self.graph));
    }

    fn commit_in_place(&mut self) {
        self.last_known = harvest_positions(&self.graph);
        self.history.set_present(Snapshot::of(&self.graph));
    }
}

/// Coalescing timer for re-parse triggers: rapid keystrokes re-arm a single
/// deadline and only the most recent trigger fires. Purely synchronous; the
/// caller polls with its own clock.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Arms (or re-arms) the deadline. An earlier pending trigger is
    /// superseded and never fires.
    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Returns true exactly once after the armed deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }
}
