use std::any::Any;
use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::sync::Arc;

/// Opaque per-task payload handed to a task through its context.
///
/// Custom schedules attach whatever a task needs (an input split, a seed, a
/// file name); tasks of a partition-derived schedule carry an empty payload.
#[derive(Clone)]
pub struct TaskInfo(Arc<dyn Any + Send + Sync>);

impl TaskInfo {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Payload of partition-derived tasks.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::new(()))
    }

    /// Borrow the payload as `T`, if it is one.
    #[must_use]
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is::<()>()
    }
}

impl Debug for TaskInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        if self.is_empty() {
            f.write_str("TaskInfo(<empty>)")
        } else {
            f.write_str("TaskInfo(..)")
        }
    }
}

/// The task units a vertex runs, with an optional concurrency cap.
///
/// A schedule is fixed once the vertex is initialized.
#[derive(Clone, Debug, Default)]
pub struct TaskSchedule {
    tasks: Vec<TaskInfo>,
    max_concurrency: Option<usize>,
}

impl TaskSchedule {
    pub fn new(tasks: Vec<TaskInfo>) -> Self {
        Self {
            tasks,
            max_concurrency: None,
        }
    }

    /// One task per value, in iteration order.
    pub fn from_values<T, I>(values: I) -> Self
    where
        T: Any + Send + Sync,
        I: IntoIterator<Item = T>,
    {
        Self::new(values.into_iter().map(TaskInfo::new).collect())
    }

    /// `count` tasks with empty payloads.
    #[must_use]
    pub fn uniform(count: usize) -> Self {
        Self::new(vec![TaskInfo::empty(); count])
    }

    /// Cap the number of this vertex's tasks running at the same time.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    #[must_use]
    pub fn tasks(&self) -> &[TaskInfo] {
        &self.tasks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }
}
