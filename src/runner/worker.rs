use crate::error::DagError;
use crate::processor::{Ports, TaskContext, TaskProcessor, TaskSchedule, VertexProcessor};
use anyhow::Result;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, error};

/// State shared by the worker units of one running vertex.
pub(crate) struct VertexRun {
    pub index: usize,
    pub name: String,
    pub processor: Arc<dyn VertexProcessor>,
    pub ports: Arc<Ports>,
    pub schedule: Arc<TaskSchedule>,
    pub properties: Arc<BTreeMap<String, String>>,
    pub cancel: Arc<AtomicBool>,
    pub next_task: AtomicUsize,
}

/// What one worker unit reports back to the driver.
pub(crate) struct UnitReport {
    pub vertex: usize,
    pub completed: usize,
    pub failure: Option<(usize, anyhow::Error)>,
}

/// Pull task indexes until the schedule is exhausted, a task fails or the
/// execution is cancelled.
///
/// A unit runs its tasks one at a time, so a reused task processor is never
/// seen by two running tasks.
pub(crate) fn run_unit(run: &VertexRun) -> UnitReport {
    let reusable = run.processor.reusable_task_processor();
    let mut cached: Option<Box<dyn TaskProcessor>> = None;
    let mut report = UnitReport {
        vertex: run.index,
        completed: 0,
        failure: None,
    };
    loop {
        if run.cancel.load(Ordering::Acquire) {
            break;
        }
        let task = run.next_task.fetch_add(1, Ordering::AcqRel);
        if task >= run.schedule.len() {
            break;
        }
        let outcome = contain("task", || run_task(run, task, &mut cached, reusable));
        match outcome {
            Ok(()) => report.completed += 1,
            Err(e) => {
                error!(vertex = %run.name, task, error = %format!("{e:#}"), "task failed");
                run.cancel.store(true, Ordering::Release);
                report.failure = Some((task, e));
                break;
            }
        }
    }
    report
}

fn run_task(
    run: &VertexRun,
    task: usize,
    cached: &mut Option<Box<dyn TaskProcessor>>,
    reusable: bool,
) -> Result<()> {
    let mut processor = match cached.take() {
        Some(p) => p,
        None => run.processor.create_task_processor()?,
    };
    let mut context = TaskContext {
        vertex: &run.name,
        task_index: task,
        task_count: run.schedule.len(),
        info: &run.schedule.tasks()[task],
        properties: &run.properties,
        ports: &run.ports,
        cancel: &run.cancel,
        outputs: HashMap::new(),
    };
    debug!(vertex = %run.name, task, "task started");
    let result = processor.run(&mut context).and_then(|()| context.commit());
    match result {
        Ok(()) => {
            if reusable {
                *cached = Some(processor);
            }
            debug!(vertex = %run.name, task, "task finished");
            Ok(())
        }
        Err(e) => {
            context.discard();
            Err(e)
        }
    }
}

/// Run user vertex code, turning a panic into a contract error.
pub(crate) fn contain<T>(what: &str, call: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(DagError::contract(format!("{what} panicked: {}", panic_message(payload.as_ref()))))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
