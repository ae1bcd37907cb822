//! Ready-made vertex processors for building test graphs.
//!
//! Every fixture reads from input port `"in"` and writes to output port
//! `"out"`. Fixtures are registered through their `factory()`, which clones
//! the configured fixture for each execution.

use crate::error::DagError;
use crate::processor::{TaskContext, TaskProcessor, TaskSchedule, VertexContext, VertexProcessor};
use anyhow::{Result, anyhow};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Input port read by the fixtures.
pub const INPUT: &str = "in";
/// Output port written by the fixtures.
pub const OUTPUT: &str = "out";

fn factory_of<P>(fixture: P) -> impl Fn() -> Result<Box<dyn VertexProcessor>> + Send + Sync + 'static
where
    P: VertexProcessor + Clone + 'static,
{
    move || Ok(Box::new(fixture.clone()) as Box<dyn VertexProcessor>)
}

/// Source vertex emitting a fixed list of values.
///
/// Values are split into contiguous slices, one per task, through a custom
/// schedule, so a source of `[a, b, c]` over two tasks emits `[a, b]` from
/// task 0 and `[c]` from task 1.
///
/// ```
/// use dagflow::testing::VecSource;
///
/// let source = VecSource::new(vec![1u32, 2, 3]).with_tasks(2);
/// assert_eq!(source.slices(), vec![vec![1, 2], vec![3]]);
/// ```
#[derive(Clone)]
pub struct VecSource<T> {
    values: Arc<Vec<T>>,
    tasks: usize,
    max_concurrency: Option<usize>,
}

impl<T: Clone + Send + Sync + 'static> VecSource<T> {
    #[must_use]
    pub fn new(values: Vec<T>) -> Self {
        Self {
            values: Arc::new(values),
            tasks: 1,
            max_concurrency: None,
        }
    }

    #[must_use]
    pub fn with_tasks(mut self, tasks: usize) -> Self {
        self.tasks = tasks;
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Values emitted by each task, in task order.
    #[must_use]
    pub fn slices(&self) -> Vec<Vec<T>> {
        let per_task = self.values.len().div_ceil(self.tasks.max(1)).max(1);
        let mut slices: Vec<Vec<T>> = self.values.chunks(per_task).map(<[T]>::to_vec).collect();
        slices.resize_with(self.tasks, Vec::new);
        slices
    }

    pub fn factory(&self) -> impl Fn() -> Result<Box<dyn VertexProcessor>> + Send + Sync + 'static {
        factory_of(self.clone())
    }
}

impl<T: Clone + Send + Sync + 'static> VertexProcessor for VecSource<T> {
    fn initialize(&mut self, _context: &VertexContext<'_>) -> Result<Option<TaskSchedule>> {
        let schedule = TaskSchedule::from_values(self.slices());
        Ok(Some(match self.max_concurrency {
            Some(limit) => schedule.with_max_concurrency(limit),
            None => schedule,
        }))
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>> {
        Ok(Box::new(EmitSlice::<T>(std::marker::PhantomData)))
    }
}

struct EmitSlice<T>(std::marker::PhantomData<fn() -> T>);

impl<T: Clone + Send + Sync + 'static> TaskProcessor for EmitSlice<T> {
    fn run(&mut self, context: &mut TaskContext<'_>) -> Result<()> {
        let slice = context
            .task_info()
            .get::<Vec<T>>()
            .cloned()
            .ok_or_else(|| DagError::illegal_state("source task has no slice payload"))?;
        let output = context.output(OUTPUT)?;
        for value in &slice {
            output.put(value)?;
        }
        Ok(())
    }
}

type MapFn<A, B> = Arc<dyn Fn(&A) -> B + Send + Sync>;

/// Vertex applying a function to every input record.
pub struct MapVertex<A, B> {
    map: MapFn<A, B>,
}

impl<A, B> Clone for MapVertex<A, B> {
    fn clone(&self) -> Self {
        Self {
            map: Arc::clone(&self.map),
        }
    }
}

impl<A: Any, B: Any> MapVertex<A, B> {
    pub fn new<F>(map: F) -> Self
    where
        F: Fn(&A) -> B + Send + Sync + 'static,
    {
        Self { map: Arc::new(map) }
    }

    pub fn factory(&self) -> impl Fn() -> Result<Box<dyn VertexProcessor>> + Send + Sync + 'static {
        factory_of(self.clone())
    }
}

impl<A: Any, B: Any> VertexProcessor for MapVertex<A, B> {
    fn reusable_task_processor(&self) -> bool {
        true
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>> {
        Ok(Box::new(self.clone()))
    }
}

impl<A: Any, B: Any> TaskProcessor for MapVertex<A, B> {
    fn run(&mut self, context: &mut TaskContext<'_>) -> Result<()> {
        let mut input = context.input(INPUT)?;
        let output = context.output(OUTPUT)?;
        while input.next_object()? {
            output.put(&(self.map)(input.object::<A>()?))?;
        }
        Ok(())
    }
}

type GroupFn<K, T, O> = Arc<dyn Fn(&K, Vec<T>) -> O + Send + Sync>;

/// Vertex reducing each group of a scatter-gather input to one record.
///
/// The function receives the group key and the group's records in merge order.
pub struct GroupVertex<K, T, O> {
    reduce: GroupFn<K, T, O>,
}

impl<K, T, O> Clone for GroupVertex<K, T, O> {
    fn clone(&self) -> Self {
        Self {
            reduce: Arc::clone(&self.reduce),
        }
    }
}

impl<K: Any, T: Any + Clone, O: Any> GroupVertex<K, T, O> {
    pub fn new<F>(reduce: F) -> Self
    where
        F: Fn(&K, Vec<T>) -> O + Send + Sync + 'static,
    {
        Self {
            reduce: Arc::new(reduce),
        }
    }

    pub fn factory(&self) -> impl Fn() -> Result<Box<dyn VertexProcessor>> + Send + Sync + 'static {
        factory_of(self.clone())
    }
}

impl<K: Any, T: Any + Clone, O: Any> VertexProcessor for GroupVertex<K, T, O> {
    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>> {
        Ok(Box::new(self.clone()))
    }
}

impl<K: Any, T: Any + Clone, O: Any> TaskProcessor for GroupVertex<K, T, O> {
    fn run(&mut self, context: &mut TaskContext<'_>) -> Result<()> {
        let mut groups = context.group_input(INPUT)?;
        let output = context.output(OUTPUT)?;
        while groups.next_group()? {
            let mut members = Vec::new();
            while groups.next_object()? {
                members.push(groups.object::<T>()?.clone());
            }
            output.put(&(self.reduce)(groups.group::<K>()?, members))?;
        }
        Ok(())
    }
}

/// Sink vertex collecting every input record into shared memory.
///
/// Clones (and the processors built by [`factory`](Self::factory)) share one
/// collection, so the test keeps a handle and reads it after the run.
pub struct CollectSink<T> {
    collected: Arc<Mutex<Vec<T>>>,
    max_concurrency: Option<usize>,
}

impl<T> Clone for CollectSink<T> {
    fn clone(&self) -> Self {
        Self {
            collected: Arc::clone(&self.collected),
            max_concurrency: self.max_concurrency,
        }
    }
}

impl<T: Any + Clone + Send> CollectSink<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collected: Arc::new(Mutex::new(Vec::new())),
            max_concurrency: None,
        }
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn factory(&self) -> impl Fn() -> Result<Box<dyn VertexProcessor>> + Send + Sync + 'static {
        factory_of(self.clone())
    }

    /// Records received so far, in arrival order.
    #[must_use]
    pub fn collected(&self) -> Vec<T> {
        self.collected.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl<T: Any + Clone + Send> Default for CollectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Any + Clone + Send> VertexProcessor for CollectSink<T> {
    fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>> {
        Ok(Box::new(self.clone()))
    }
}

impl<T: Any + Clone + Send> TaskProcessor for CollectSink<T> {
    fn run(&mut self, context: &mut TaskContext<'_>) -> Result<()> {
        let mut input = context.input(INPUT)?;
        let mut batch = Vec::new();
        while input.next_object()? {
            batch.push(input.object::<T>()?.clone());
        }
        self.collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(batch);
        Ok(())
    }
}

/// Vertex whose task `task` fails; every other task succeeds without output.
///
/// Shared counters record how many tasks started and how often the vertex
/// was closed, so tests can check that failures stop downstream work.
#[derive(Clone)]
pub struct FailingVertex {
    task: usize,
    tasks: usize,
    panic: bool,
    started: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl FailingVertex {
    /// Fail task `task` of a `tasks`-task custom schedule.
    #[must_use]
    pub fn new(task: usize, tasks: usize) -> Self {
        Self {
            task,
            tasks,
            panic: false,
            started: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Panic instead of returning an error.
    #[must_use]
    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::Acquire)
    }

    pub fn factory(&self) -> impl Fn() -> Result<Box<dyn VertexProcessor>> + Send + Sync + 'static {
        factory_of(self.clone())
    }
}

impl VertexProcessor for FailingVertex {
    fn initialize(&mut self, context: &VertexContext<'_>) -> Result<Option<TaskSchedule>> {
        // only sources pick their own task count
        if context.input_names().next().is_some() {
            return Ok(None);
        }
        Ok(Some(TaskSchedule::uniform(self.tasks)))
    }

    fn create_task_processor(&self) -> Result<Box<dyn TaskProcessor>> {
        Ok(Box::new(self.clone()))
    }

    fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

impl TaskProcessor for FailingVertex {
    fn run(&mut self, context: &mut TaskContext<'_>) -> Result<()> {
        self.started.fetch_add(1, Ordering::AcqRel);
        if context.task_index() != self.task {
            return Ok(());
        }
        if self.panic {
            panic!("task {} of '{}' panicked", self.task, context.vertex_name());
        }
        Err(anyhow!("task {} of '{}' failed", self.task, context.vertex_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_cover_values_in_order() {
        let source = VecSource::new(vec![1, 2, 3, 4, 5]).with_tasks(3);
        assert_eq!(source.slices(), vec![vec![1, 2], vec![3, 4], vec![5]]);
        let sparse = VecSource::new(vec![7]).with_tasks(3);
        assert_eq!(sparse.slices(), vec![vec![7], vec![], vec![]]);
        let empty = VecSource::<u8>::new(Vec::new()).with_tasks(2);
        assert_eq!(empty.slices(), vec![Vec::<u8>::new(), Vec::new()]);
    }

    #[test]
    fn sink_clones_share_collection() {
        let sink = CollectSink::<u32>::new();
        let other = sink.clone();
        other.collected.lock().unwrap().push(4);
        assert_eq!(sink.collected(), vec![4]);
    }
}
