use crate::edge::ChannelStats;
use crate::model::EdgeKind;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::time::Duration;

/// Lifecycle of one vertex within an execution.
///
/// `Pending -> Initialized -> Running -> {Completed | Failed}`; the terminal
/// states are final, a failed vertex is never retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexState {
    Pending,
    Initialized,
    Running,
    Completed,
    Failed,
}

impl VertexState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal step.
    #[must_use]
    pub fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Initialized)
                | (Self::Initialized, Self::Running)
                | (Self::Running, Self::Completed | Self::Failed)
        )
    }
}

impl Display for VertexState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Initialized => "INITIALIZED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        })
    }
}

#[derive(Clone, Debug)]
pub struct VertexReport {
    pub name: String,
    pub state: VertexState,
    /// Size of the vertex schedule.
    pub tasks: usize,
    /// Effective concurrency the vertex ran with.
    pub concurrency: usize,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct EdgeReport {
    pub label: String,
    pub kind: EdgeKind,
    pub stats: ChannelStats,
}

/// Outcome of a successful execution.
#[derive(Clone, Debug, Default)]
pub struct ExecutionSummary {
    /// One entry per vertex, in the order vertices finished.
    pub vertices: Vec<VertexReport>,
    pub edges: Vec<EdgeReport>,
    pub elapsed: Duration,
}

impl ExecutionSummary {
    #[must_use]
    pub fn vertex(&self, name: &str) -> Option<&VertexReport> {
        self.vertices.iter().find(|v| v.name == name)
    }

    #[must_use]
    pub fn total_tasks(&self) -> usize {
        self.vertices.iter().map(|v| v.tasks).sum()
    }
}

impl Display for ExecutionSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        writeln!(f, "┌─ Execution Summary ─────────────────────────────")?;
        writeln!(f, "│ Elapsed: {} ms", self.elapsed.as_millis())?;
        writeln!(f, "│")?;
        writeln!(f, "│ Vertices:")?;
        for v in &self.vertices {
            writeln!(
                f,
                "│   {:<20} {:<10} tasks={:<4} concurrency={:<3} {} ms",
                v.name,
                v.state,
                v.tasks,
                v.concurrency,
                v.elapsed.as_millis()
            )?;
        }
        if !self.edges.is_empty() {
            writeln!(f, "│")?;
            writeln!(f, "│ Edges:")?;
            for e in &self.edges {
                writeln!(
                    f,
                    "│   {} [{}] records={} bytes={} spilled={}",
                    e.label, e.kind, e.stats.records, e.stats.bytes, e.stats.spilled_bytes
                )?;
            }
        }
        writeln!(f, "└─────────────────────────────────────────────────")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_forward_transitions_are_legal() {
        use VertexState::*;
        assert!(Pending.can_become(Initialized));
        assert!(Running.can_become(Failed));
        assert!(!Completed.can_become(Running));
        assert!(!Pending.can_become(Running));
        assert!(Failed.is_terminal() && !Running.is_terminal());
    }
}
