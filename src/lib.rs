//! # dagflow
//!
//! A **single-machine DAG execution core**. A compiled graph of vertices
//! connected by typed edges is executed by a bounded worker pool: each
//! vertex runs as one or more tasks, and records move between vertices
//! through edge channels that serialize, optionally spill to disk, and
//! (for shuffles) partition, sort and group them.
//!
//! ## Key Features
//!
//! - **Four edge kinds** - `NOTHING` (ordering only), `ONE_TO_ONE`,
//!   `BROADCAST` and `SCATTER_GATHER` (key partitioning with stable sorted
//!   groups)
//! - **Dependency-ordered scheduling** - a vertex starts only after every
//!   upstream vertex completed; independent vertices run concurrently
//! - **Custom task schedules** - source vertices choose their own task list
//!   and concurrency cap
//! - **Spill-to-disk** - writers move data to temporary files past a
//!   configurable threshold, invisibly to vertex code
//! - **Fail-fast execution** - the first task failure cancels the run and is
//!   reported with the failing vertex and task
//! - **Late binding** - graphs name processors and serializers; a
//!   [`Registry`] resolves them at startup
//!
//! ## Quick Start
//!
//! ```
//! use dagflow::codec::typed::SerdeKeyValueCodec;
//! use dagflow::model::{DataType, EdgeDescriptor, GraphInfo, SupplierRef, VertexDescriptor};
//! use dagflow::testing::{CollectSink, GroupVertex, VecSource, INPUT, OUTPUT};
//! use dagflow::{EngineConfig, Registry, Runner};
//!
//! # fn main() -> anyhow::Result<()> {
//! let words = VecSource::new(vec!["a".to_string(), "b".to_string(), "a".to_string()]).with_tasks(2);
//! let count = GroupVertex::new(|word: &String, members: Vec<String>| (word.clone(), members.len()));
//! let sink = CollectSink::<(String, usize)>::new();
//!
//! let mut registry = Registry::new();
//! registry
//!     .register_processor("words", words.factory())
//!     .register_processor("count", count.factory())
//!     .register_processor("sink", sink.factory())
//!     .register_key_value_serde("by-word", SerdeKeyValueCodec::<String, String>::new(String::clone))
//!     .register_value_serde("counts", dagflow::codec::typed::SerdeValueCodec::<(String, usize)>::new());
//!
//! let mut graph = GraphInfo::new();
//! let a = graph.add_vertex("words", VertexDescriptor::of("words")?);
//! let b = graph.add_vertex("count", VertexDescriptor::of("count")?);
//! let c = graph.add_vertex("sink", VertexDescriptor::of("sink")?);
//! graph.add_edge(
//!     (a, OUTPUT),
//!     (b, INPUT),
//!     EdgeDescriptor::scatter_gather(DataType::new("word")?, SupplierRef::new("by-word")?, None),
//! )?;
//! graph.add_edge(
//!     (b, OUTPUT),
//!     (c, INPUT),
//!     EdgeDescriptor::one_to_one(DataType::new("count")?, SupplierRef::new("counts")?),
//! )?;
//!
//! let summary = Runner::new(EngineConfig::default()).run(&graph, &registry)?;
//! let mut counts = sink.collected();
//! counts.sort();
//! assert_eq!(counts, vec![("a".to_string(), 2), ("b".to_string(), 1)]);
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. A planner (outside this crate) produces a [`GraphInfo`], usually
//!    persisted with [`GraphInfo::save`] under the application root
//! 2. The [`launcher`] (or the application itself) loads it and populates a
//!    [`Registry`]
//! 3. The [`runner`] validates the graph, instantiates and initializes every
//!    vertex, opens the edge channels and dispatches tasks in dependency
//!    order
//! 4. The result is an [`ExecutionSummary`], or an [`ExecutionFailure`]
//!    naming the vertex and task that failed
//!
//! ## Module Overview
//!
//! - [`buffer`] - growable data buffers and buffered byte channels
//! - [`codec`] - serializer and comparator contracts, serde-backed codecs
//! - [`model`] - vertex, edge and graph descriptions and their persistence
//! - [`processor`] - the contracts vertex code implements
//! - [`runner`] - the scheduler and task runner
//! - [`testing`] - fixture processors and assertions for tests

pub mod buffer;
pub mod codec;
mod edge;
pub mod error;
pub mod launcher;
pub mod logging;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod model;
pub mod processor;
pub mod registry;
pub mod runner;
pub mod testing;
pub mod vertex_id;

// General re-exports
pub use edge::ChannelStats;
pub use error::{DagError, ExecutionFailure, FailureSite};
pub use model::{EdgeDescriptor, EdgeKind, GraphInfo, VertexDescriptor};
pub use processor::{TaskContext, TaskProcessor, TaskSchedule, VertexContext, VertexProcessor};
pub use registry::Registry;
pub use runner::{EngineConfig, ExecutionSummary, Runner};
pub use vertex_id::VertexId;

#[cfg(feature = "metrics")]
pub use metrics::MetricsCollector;
