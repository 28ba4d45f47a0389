pub mod autolayout;
pub mod compiler;
pub mod config;
pub mod dbml;
pub mod graph;
pub mod history;
pub mod reconcile;
pub mod schema;
pub mod session;

pub use autolayout::{LayoutDirection, auto_layout};
pub use compiler::compile;
pub use config::LayoutConfig;
pub use graph::{
    Edge, Graph, Node, NodeGeometry, NodeKind, NodePayload, PositionMap, harvest_positions,
    position_map_from_json,
};
pub use history::{History, Snapshot};
pub use reconcile::reconcile;
pub use schema::{Schema, SchemaError, parse};
pub use session::{Debouncer, Session, diagram_key};
