//! Lightweight identifier for vertices within a [`GraphInfo`](crate::model::GraphInfo).
//!
//! Each vertex added to a graph is assigned a sequential `VertexId`. They are
//! opaque handles used to wire edges while building a graph; the runner and
//! diagnostics refer to vertices by name.
//!
//! They're small, `Copy`, and hashable, so they can be used efficiently as keys
//! in maps or sets while traversing the graph.

use serde::{Deserialize, Serialize};

/// Unique numeric identifier for a vertex in a graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct VertexId(u32);

impl VertexId {
    /// Create a new `VertexId` (used internally by the graph).
    pub(crate) fn new(v: u32) -> Self {
        Self(v)
    }

    /// Return the underlying numeric value.
    ///
    /// Useful mainly for debugging or serialization.
    #[must_use]
    pub fn raw(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}
