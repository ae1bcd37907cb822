use super::io::{GroupReader, ObjectReader, OutputWriter};
use super::schedule::TaskInfo;
use crate::edge::EdgeChannel;
use crate::error::DagError;
use crate::model::EdgeKind;
use crate::registry::Registry;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Channels bound to one vertex's named ports.
#[derive(Default)]
pub(crate) struct Ports {
    pub inputs: BTreeMap<String, Arc<dyn EdgeChannel>>,
    pub outputs: BTreeMap<String, Vec<Arc<dyn EdgeChannel>>>,
}

impl Ports {
    pub fn input(&self, vertex: &str, name: &str) -> Result<&Arc<dyn EdgeChannel>> {
        self.inputs
            .get(name)
            .ok_or_else(|| DagError::illegal_state(format!("vertex '{vertex}' has no input '{name}'")))
    }
}

/// What a vertex processor sees while it is being initialized.
pub struct VertexContext<'a> {
    pub(crate) vertex: &'a str,
    pub(crate) registry: &'a Registry,
    pub(crate) properties: &'a BTreeMap<String, String>,
    pub(crate) ports: &'a Ports,
}

impl VertexContext<'_> {
    #[must_use]
    pub fn vertex_name(&self) -> &str {
        self.vertex
    }

    /// Registry used to resolve this graph; processors may look up
    /// additional serializers or comparators through it.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        self.registry
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, String> {
        self.properties
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.ports.inputs.keys().map(String::as_str)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.ports.outputs.keys().map(String::as_str)
    }

    /// Movement policy of the edge feeding input port `name`.
    #[must_use]
    pub fn input_kind(&self, name: &str) -> Option<EdgeKind> {
        self.ports.inputs.get(name).map(|c| c.kind())
    }
}

/// What a task sees while it runs.
///
/// Inputs can be opened any number of times; each call returns a fresh
/// cursor. Outputs are opened once per port and the same writer is
/// returned on later calls.
pub struct TaskContext<'a> {
    pub(crate) vertex: &'a str,
    pub(crate) task_index: usize,
    pub(crate) task_count: usize,
    pub(crate) info: &'a TaskInfo,
    pub(crate) properties: &'a BTreeMap<String, String>,
    pub(crate) ports: &'a Ports,
    pub(crate) cancel: &'a AtomicBool,
    pub(crate) outputs: HashMap<String, OutputWriter>,
}

impl TaskContext<'_> {
    #[must_use]
    pub fn vertex_name(&self) -> &str {
        self.vertex
    }

    /// Position of this task in the vertex schedule.
    #[must_use]
    pub fn task_index(&self) -> usize {
        self.task_index
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.task_count
    }

    #[must_use]
    pub fn task_info(&self) -> &TaskInfo {
        self.info
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// `true` once another task of the execution has failed. Long-running
    /// tasks should poll this and return early; their output is discarded.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Open a record cursor over input port `name`.
    ///
    /// # Errors
    /// Illegal state for an unknown port; I/O errors reopening spilled data.
    pub fn input(&self, name: &str) -> Result<Box<dyn ObjectReader>> {
        let channel = self.ports.input(self.vertex, name)?;
        channel
            .open_reader(self.task_index, self.task_count)
            .with_context(|| format!("open input '{name}' ({})", channel.label()))
    }

    /// Open a grouped cursor over scatter-gather input port `name`.
    ///
    /// # Errors
    /// Illegal state for an unknown port or an edge that is not scatter-gather.
    pub fn group_input(&self, name: &str) -> Result<Box<dyn GroupReader>> {
        let channel = self.ports.input(self.vertex, name)?;
        channel
            .open_group_reader(self.task_index, self.task_count)
            .with_context(|| format!("open grouped input '{name}' ({})", channel.label()))
    }

    /// Writer for output port `name`.
    ///
    /// # Errors
    /// Illegal state for an unknown port or a channel that is already frozen.
    pub fn output(&mut self, name: &str) -> Result<OutputWriter> {
        if let Some(writer) = self.outputs.get(name) {
            return Ok(writer.clone());
        }
        let channels = self.ports.outputs.get(name).ok_or_else(|| {
            DagError::illegal_state(format!("vertex '{}' has no output '{name}'", self.vertex))
        })?;
        let sinks = channels
            .iter()
            .map(|c| c.open_sink(self.task_index))
            .collect::<Result<Vec<_>>>()?;
        let writer = OutputWriter::new(name, sinks);
        self.outputs.insert(name.to_string(), writer.clone());
        Ok(writer)
    }

    /// Commit every opened output after a successful run.
    pub(crate) fn commit(&mut self) -> Result<()> {
        for (name, writer) in self.outputs.drain() {
            writer
                .commit()
                .with_context(|| format!("commit output '{name}'"))?;
        }
        Ok(())
    }

    pub(crate) fn discard(&mut self) {
        for (_, writer) in self.outputs.drain() {
            writer.discard();
        }
    }
}
