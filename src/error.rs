//! Error taxonomy for graph execution.
//!
//! Core functions return [`anyhow::Result`]; the errors they raise are
//! [`DagError`] values so callers can classify a failure with
//! `err.downcast_ref::<DagError>()`. A failed execution is reported as a single
//! [`ExecutionFailure`] naming the failing vertex and task.

use std::fmt::{Display, Formatter, Result as FormatResult};
use thiserror::Error;

/// Classified failure raised by the DAG core.
#[derive(Debug, Error)]
pub enum DagError {
    /// Invalid graph, descriptor, schedule or registry configuration.
    /// Always detected before any task runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Spill or channel I/O failure.
    #[error("I/O error on {context}: {source}")]
    Io {
        /// What was being read or written.
        context: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A serializer, comparator or processor broke its contract.
    #[error("contract violation: {0}")]
    Contract(String),

    /// An API was used in a state that does not permit it.
    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl DagError {
    pub(crate) fn config(msg: impl Into<String>) -> anyhow::Error {
        Self::Configuration(msg.into()).into()
    }

    pub(crate) fn contract(msg: impl Into<String>) -> anyhow::Error {
        Self::Contract(msg.into()).into()
    }

    pub(crate) fn illegal_state(msg: impl Into<String>) -> anyhow::Error {
        Self::IllegalState(msg.into()).into()
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> anyhow::Error {
        Self::Io {
            context: context.into(),
            source,
        }
        .into()
    }

    /// Returns `true` if `err` (or any error in its chain) is a configuration error.
    pub fn is_configuration(err: &anyhow::Error) -> bool {
        Self::find(err).is_some_and(|e| matches!(e, Self::Configuration(_)))
    }

    /// Returns `true` if `err` (or any error in its chain) is an illegal-state error.
    pub fn is_illegal_state(err: &anyhow::Error) -> bool {
        Self::find(err).is_some_and(|e| matches!(e, Self::IllegalState(_)))
    }

    /// Find the first `DagError` in the chain of `err`.
    pub fn find(err: &anyhow::Error) -> Option<&Self> {
        err.chain().find_map(|e| e.downcast_ref::<Self>())
    }
}

/// Where a task failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSite {
    /// Name of the vertex.
    pub vertex: String,
    /// Task index inside the vertex schedule, if the failure came from a task.
    pub task: Option<usize>,
}

impl Display for FailureSite {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self.task {
            Some(task) => write!(f, "vertex '{}' task #{task}", self.vertex),
            None => write!(f, "vertex '{}'", self.vertex),
        }
    }
}

/// The aggregated outcome of a failed graph execution.
///
/// The first failure observed is the primary cause; failures from racing
/// tasks are kept in [`suppressed`](Self::suppressed).
#[derive(Debug, Error)]
#[error("graph execution failed at {site}: {cause:#}")]
pub struct ExecutionFailure {
    /// Failing vertex and task.
    pub site: FailureSite,
    /// First failure observed.
    pub cause: anyhow::Error,
    /// Later failures, in the order they were observed.
    pub suppressed: Vec<(FailureSite, anyhow::Error)>,
}

impl ExecutionFailure {
    /// Multi-line diagnostic including suppressed failures.
    pub fn diagnostic(&self) -> String {
        let mut out = self.to_string();
        for (site, err) in &self.suppressed {
            out.push_str(&format!("\n  suppressed at {site}: {err:#}"));
        }
        out
    }
}
