//! Bounded linear undo/redo history of graph snapshots.
//!
//! Snapshots own independent copies of the node and edge arrays; later
//! in-place mutation of the live graph can never reach back into a stored
//! snapshot.

use std::collections::VecDeque;

use crate::graph::{Edge, Graph, Node};

/// Oldest entries of `past` are dropped beyond this depth.
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Snapshot {
    pub fn of(graph: &Graph) -> Self {
        Self {
            nodes: graph.nodes.clone(),
            edges: graph.edges.clone(),
        }
    }

    pub fn restore(&self) -> Graph {
        Graph {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct History {
    past: Vec<Snapshot>,
    present: Option<Snapshot>,
    future: VecDeque<Snapshot>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits a new present state. Any existing present moves onto the past
    /// stack and the redo stack is invalidated.
    pub fn set_present(&mut self, snapshot: Snapshot) {
        if let Some(previous) = self.present.take() {
            self.past.push(previous);
            if self.past.len() > HISTORY_LIMIT {
                self.past.remove(0);
            }
        }
        self.present = Some(snapshot);
        self.future.clear();
    }

    /// Steps back one state, or returns `None` (leaving everything
    /// untouched) when there is nothing to undo.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        let previous = self.past.pop()?;
        if let Some(current) = self.present.take() {
            self.future.push_front(current);
        }
        self.present = Some(previous);
        self.present.as_ref()
    }

    /// Steps forward one state, or returns `None` when nothing was undone.
    pub fn redo(&mut self) -> Option<&Snapshot> {
        let next = self.future.pop_front()?;
        if let Some(current) = self.present.take() {
            self.past.push(current);
        }
        self.present = Some(next);
        self.present.as_ref()
    }

    pub fn present(&self) -> Option<&Snapshot> {
        self.present.as_ref()
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }
}
