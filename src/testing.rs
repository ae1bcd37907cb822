//! Testing utilities for dagflow graphs.
//!
//! - **Fixtures**: vertex processors for sources, maps, group reductions,
//!   sinks and deliberate failures
//! - **Assertions**: compare what a sink collected with expected records
//!
//! # Quick Start
//!
//! ```
//! use dagflow::codec::typed::SerdeValueCodec;
//! use dagflow::model::{DataType, EdgeDescriptor, GraphInfo, SupplierRef, VertexDescriptor};
//! use dagflow::registry::Registry;
//! use dagflow::runner::{EngineConfig, Runner};
//! use dagflow::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let source = VecSource::new(vec![1u64, 2, 3]).with_tasks(2);
//! let sink = CollectSink::<u64>::new();
//!
//! let mut registry = Registry::new();
//! registry
//!     .register_processor("source", source.factory())
//!     .register_processor("sink", sink.factory())
//!     .register_value_serde("u64", SerdeValueCodec::<u64>::new());
//!
//! let mut graph = GraphInfo::new();
//! let a = graph.add_vertex("source", VertexDescriptor::of("source")?);
//! let b = graph.add_vertex("sink", VertexDescriptor::of("sink")?);
//! graph.add_edge(
//!     (a, OUTPUT),
//!     (b, INPUT),
//!     EdgeDescriptor::one_to_one(DataType::new("u64")?, SupplierRef::new("u64")?),
//! )?;
//!
//! Runner::new(EngineConfig::default()).run(&graph, &registry)?;
//! assert_collections_unordered_equal(&sink.collected(), &[1, 2, 3]);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
