//! Contracts between the runtime and user vertex code.
//!
//! A [`VertexProcessor`] is instantiated once per vertex and execution. It is
//! initialized before any task of the graph runs and may supply a custom
//! [`TaskSchedule`] when the vertex has no partitioned input. Each task then
//! runs a [`TaskProcessor`] created by the vertex processor.
//!
//! ```
//! use dagflow::processor::{TaskContext, TaskProcessor, VertexProcessor};
//!
//! struct Upper;
//!
//! impl VertexProcessor for Upper {
//!     fn create_task_processor(&self) -> anyhow::Result<Box<dyn TaskProcessor>> {
//!         Ok(Box::new(UpperTask))
//!     }
//! }
//!
//! struct UpperTask;
//!
//! impl TaskProcessor for UpperTask {
//!     fn run(&mut self, context: &mut TaskContext<'_>) -> anyhow::Result<()> {
//!         let mut input = context.input("in")?;
//!         let output = context.output("out")?;
//!         while input.next_object()? {
//!             output.put(&input.object::<String>()?.to_uppercase())?;
//!         }
//!         Ok(())
//!     }
//! }
//! ```

mod context;
mod io;
mod schedule;

pub(crate) use context::Ports;
pub use context::{TaskContext, VertexContext};
pub use io::{GroupReader, ObjectReader, ObjectWriter, OutputWriter};
pub use schedule::{TaskInfo, TaskSchedule};

use anyhow::Result;

/// Per-vertex processor, shared by all tasks of the vertex.
///
/// Anything mutable a task needs belongs in its [`TaskProcessor`].
pub trait VertexProcessor: Send + Sync {
    /// Prepare the vertex. Returning a schedule is only legal for vertices
    /// without non-broadcast inputs; other vertices get one task per
    /// upstream partition.
    fn initialize(&mut self, _context: &VertexContext<'_>) -> Result<Option<TaskSchedule>> {
        Ok(None)
    }

    /// Upper bound on concurrently running tasks of this vertex.
    fn max_concurrency(&self) -> Option<usize> {
        None
    }

    /// Whether one task processor may run several tasks in sequence.
    ///
    /// When `false` (the default) the runtime creates a fresh task processor
    /// for every task. When `true` it creates one per worker and reuses it;
    /// two concurrently running tasks never share an instance either way.
    fn reusable_task_processor(&self) -> bool {
        false
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>>;

    /// Called once after the vertex finished, successfully or not.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Work of a single task.
pub trait TaskProcessor: Send {
    fn run(&mut self, context: &mut TaskContext<'_>) -> Result<()>;
}
