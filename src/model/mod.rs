//! Graph model: immutable descriptions of vertices, edges and their wiring.
//!
//! Nothing here performs I/O during execution or runs user code; the model is
//! what a planner produces and what the [`runner`](crate::runner) consumes.

mod descriptor;
mod edge;
mod graph;
mod persist;

pub use descriptor::{DataType, SupplierRef, VertexDescriptor};
pub use edge::{Direction, EdgeDescriptor, EdgeKind, Group, SerDeProvider, SortTerm};
pub use graph::{EdgeInfo, GraphInfo, Port, VertexInfo};
pub use persist::{GRAPH_INFO_PATH, graph_path};
