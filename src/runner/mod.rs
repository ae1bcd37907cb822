//! Scheduler and task runner.
//!
//! [`Runner::run`] executes a [`GraphInfo`] on a bounded worker pool:
//!
//! 1. validate the graph and order it topologically,
//! 2. instantiate and initialize every vertex, deriving its task schedule,
//! 3. dispatch each vertex once all of its upstream vertices completed,
//!    running its tasks on at most its effective concurrency,
//! 4. when a vertex completes, freeze its output channels and release its
//!    input channels.
//!
//! Channels are frozen only when their producer vertex has completed, so
//! consumers never observe partial data. The first task failure cancels
//! every task not yet started, waits for in-flight tasks, and surfaces as
//! one [`ExecutionFailure`].

mod plan;
mod state;
mod worker;

pub use state::{EdgeReport, ExecutionSummary, VertexReport, VertexState};

use crate::error::{DagError, ExecutionFailure, FailureSite};
#[cfg(feature = "metrics")]
use crate::metrics::MetricsCollector;
use crate::model::GraphInfo;
use crate::registry::Registry;
use anyhow::{Context, Result};
use plan::ExecutionPlan;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};
use tracing::{error, info, trace, warn};
use worker::{UnitReport, VertexRun, run_unit};

/// Engine settings shared by every vertex of an execution.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Worker pool size.
    pub threads: usize,
    /// Partition count of scatter-gather edges.
    pub partitions: usize,
    /// Initial capacity of record buffers, in bytes.
    pub buffer_size: usize,
    /// Bytes buffered in memory per writer before spilling to
    /// `work_directory`; `None` keeps everything in memory.
    pub spill_threshold: Option<usize>,
    /// Parent directory for spill files; created before any task runs when spilling is
    /// enabled. Defaults to the system temp directory.
    pub work_directory: PathBuf,
    /// Properties visible to every vertex and task.
    pub properties: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().max(1),
            partitions: 2 * num_cpus::get().max(1),
            buffer_size: 64 * 1024,
            spill_threshold: Some(64 * 1024 * 1024),
            work_directory: std::env::temp_dir(),
            properties: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// # Errors
    /// Configuration error for a zero thread or partition count.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(DagError::config("thread count must be positive"));
        }
        if self.partitions == 0 {
            return Err(DagError::config("partition count must be positive"));
        }
        Ok(())
    }
}

/// Executes graphs.
#[derive(Default)]
pub struct Runner {
    pub config: EngineConfig,
    /// Collector updated with task, record and spill counts.
    #[cfg(feature = "metrics")]
    pub metrics: Option<MetricsCollector>,
}

impl Runner {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Execute `graph`, resolving its processors and codecs through `registry`.
    ///
    /// # Errors
    /// Configuration errors are returned as [`DagError`] before any task
    /// runs. Task failures are returned as an [`ExecutionFailure`].
    pub fn run(&self, graph: &GraphInfo, registry: &Registry) -> Result<ExecutionSummary> {
        self.config.validate()?;
        let started = Instant::now();
        let plan = plan::prepare(graph, registry, &self.config)?;
        info!(
            vertices = plan.vertices.len(),
            edges = plan.channels.len(),
            threads = self.config.threads,
            "starting graph execution"
        );
        #[cfg(feature = "metrics")]
        if let Some(m) = &self.metrics {
            m.record_start();
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("dagflow-worker-{i}"))
            .build()
            .context("build worker pool")?;
        let mut driver = Driver::new(&plan, &self.config);
        let outcome = driver.drive(&pool);

        driver.close_remaining();
        #[cfg(feature = "metrics")]
        if let Some(m) = &self.metrics {
            record_metrics(m, &plan, &driver);
            m.record_end();
        }
        plan.release_all();

        outcome?;
        let summary = ExecutionSummary {
            vertices: driver.reports,
            edges: plan
                .channels
                .iter()
                .map(|c| EdgeReport {
                    label: c.label().to_string(),
                    kind: c.kind(),
                    stats: c.stats(),
                })
                .collect(),
            elapsed: started.elapsed(),
        };
        info!(
            elapsed_ms = summary.elapsed.as_millis() as u64,
            tasks = summary.total_tasks(),
            "graph execution completed"
        );
        Ok(summary)
    }
}

#[cfg(feature = "metrics")]
fn record_metrics(metrics: &MetricsCollector, plan: &ExecutionPlan, driver: &Driver<'_>) {
    let completed = driver
        .reports
        .iter()
        .filter(|r| r.state == VertexState::Completed)
        .count();
    metrics.increment_counter("vertices_completed", completed as u64);
    metrics.increment_counter("tasks_completed", driver.completed_tasks() as u64);
    for channel in &plan.channels {
        let stats = channel.stats();
        let kind = channel.kind().to_string().to_lowercase();
        metrics.increment_counter(&format!("records_{kind}"), stats.records);
        metrics.increment_counter(&format!("bytes_{kind}"), stats.bytes);
        metrics.increment_counter("spilled_bytes", stats.spilled_bytes);
    }
}

struct VertexSlot {
    state: VertexState,
    pending_upstream: usize,
    active_units: usize,
    completed_tasks: usize,
    failed: bool,
    closed: bool,
    started: Option<Instant>,
}

/// Event loop dispatching vertices and collecting unit reports.
struct Driver<'p> {
    plan: &'p ExecutionPlan,
    properties: Arc<BTreeMap<String, String>>,
    cancel: Arc<AtomicBool>,
    slots: Vec<VertexSlot>,
    ready: VecDeque<usize>,
    failures: Vec<(FailureSite, anyhow::Error)>,
    reports: Vec<VertexReport>,
    active_units: usize,
}

impl<'p> Driver<'p> {
    fn new(plan: &'p ExecutionPlan, config: &EngineConfig) -> Self {
        let slots: Vec<VertexSlot> = plan
            .vertices
            .iter()
            .map(|v| VertexSlot {
                state: VertexState::Pending,
                pending_upstream: v.upstream.len(),
                active_units: 0,
                completed_tasks: 0,
                failed: false,
                closed: false,
                started: None,
            })
            .collect();
        let ready = (0..slots.len()).filter(|&i| slots[i].pending_upstream == 0).collect();
        let mut driver = Self {
            plan,
            properties: Arc::new(config.properties.clone()),
            cancel: Arc::new(AtomicBool::new(false)),
            slots,
            ready,
            failures: Vec::new(),
            reports: Vec::new(),
            active_units: 0,
        };
        // the plan initialized every processor
        for v in 0..driver.slots.len() {
            driver.transition(v, VertexState::Initialized);
        }
        driver
    }

    fn drive(&mut self, pool: &rayon::ThreadPool) -> Result<()> {
        let (tx, rx) = mpsc::channel::<UnitReport>();
        loop {
            if self.failures.is_empty() {
                while let Some(v) = self.ready.pop_front() {
                    self.dispatch(v, pool, &tx);
                }
            }
            if self.active_units == 0 {
                break;
            }
            let report = rx
                .recv()
                .map_err(|_| DagError::illegal_state("worker pool hung up"))?;
            self.active_units -= 1;
            self.absorb(report);
        }

        if self.failures.is_empty() {
            return Ok(());
        }
        let mut failures = std::mem::take(&mut self.failures).into_iter();
        let (site, cause) = failures
            .next()
            .ok_or_else(|| DagError::illegal_state("failure list emptied"))?;
        let failure = ExecutionFailure {
            site,
            cause,
            suppressed: failures.collect(),
        };
        error!(error = %failure.diagnostic(), "graph execution failed");
        Err(failure.into())
    }

    fn dispatch(&mut self, v: usize, pool: &rayon::ThreadPool, tx: &mpsc::Sender<UnitReport>) {
        let plan = self.plan;
        let vertex = &plan.vertices[v];
        self.transition(v, VertexState::Running);
        self.slots[v].started = Some(Instant::now());
        let tasks = vertex.schedule.len();
        let units = vertex.concurrency.min(tasks);
        info!(vertex = %vertex.name, tasks, concurrency = vertex.concurrency, "vertex started");
        if units == 0 {
            self.finish(v);
            return;
        }

        let run = Arc::new(VertexRun {
            index: v,
            name: vertex.name.clone(),
            processor: Arc::clone(&vertex.processor),
            ports: Arc::clone(&vertex.ports),
            schedule: Arc::clone(&vertex.schedule),
            properties: Arc::clone(&self.properties),
            cancel: Arc::clone(&self.cancel),
            next_task: AtomicUsize::new(0),
        });
        for _ in 0..units {
            let run = Arc::clone(&run);
            let tx = tx.clone();
            pool.spawn(move || {
                let report = run_unit(&run);
                drop(run);
                // the driver outlives every unit, so a send error means it already bailed out
                let _ = tx.send(report);
            });
        }
        self.slots[v].active_units = units;
        self.active_units += units;
    }

    fn absorb(&mut self, report: UnitReport) {
        let v = report.vertex;
        let slot = &mut self.slots[v];
        slot.active_units -= 1;
        slot.completed_tasks += report.completed;
        if let Some((task, cause)) = report.failure {
            slot.failed = true;
            self.failures.push((
                FailureSite {
                    vertex: self.plan.vertices[v].name.clone(),
                    task: Some(task),
                },
                cause,
            ));
        }
        if self.slots[v].active_units == 0 {
            self.finish(v);
        }
    }

    fn finish(&mut self, v: usize) {
        let plan = self.plan;
        let vertex = &plan.vertices[v];
        let tasks = vertex.schedule.len();
        let elapsed = self.slots[v].started.map_or(Duration::ZERO, |s| s.elapsed());
        let complete = !self.slots[v].failed && self.slots[v].completed_tasks == tasks;

        let closed = plan::close_processor(vertex.processor.as_ref());
        self.slots[v].closed = true;

        let state = if complete {
            match closed.and_then(|()| self.seal(v)) {
                Ok(()) => VertexState::Completed,
                Err(cause) => {
                    self.failures.push((
                        FailureSite {
                            vertex: vertex.name.clone(),
                            task: None,
                        },
                        cause,
                    ));
                    VertexState::Failed
                }
            }
        } else {
            if let Err(e) = closed {
                warn!(vertex = %vertex.name, error = %format!("{e:#}"), "closing processor failed");
            }
            if !self.slots[v].failed {
                warn!(
                    vertex = %vertex.name,
                    completed = self.slots[v].completed_tasks,
                    tasks,
                    "vertex cancelled"
                );
            }
            VertexState::Failed
        };
        self.transition(v, state);
        self.reports.push(VertexReport {
            name: vertex.name.clone(),
            state,
            tasks,
            concurrency: vertex.concurrency,
            elapsed,
        });

        if state == VertexState::Completed {
            info!(vertex = %vertex.name, tasks, elapsed_ms = elapsed.as_millis() as u64, "vertex completed");
            for &d in &vertex.downstream {
                self.slots[d].pending_upstream -= 1;
                if self.slots[d].pending_upstream == 0 {
                    self.ready.push_back(d);
                }
            }
        }
    }

    /// Freeze the vertex outputs and release its inputs.
    fn seal(&self, v: usize) -> Result<()> {
        let vertex = &self.plan.vertices[v];
        for &e in &vertex.outputs {
            self.plan.channels[e].freeze()?;
        }
        for &e in &vertex.inputs {
            self.plan.channels[e].release();
        }
        Ok(())
    }

    #[cfg(feature = "metrics")]
    fn completed_tasks(&self) -> usize {
        self.slots.iter().map(|s| s.completed_tasks).sum()
    }

    fn transition(&mut self, v: usize, next: VertexState) {
        let slot = &mut self.slots[v];
        debug_assert!(slot.state.can_become(next), "{} -> {next}", slot.state);
        trace!(vertex = %self.plan.vertices[v].name, from = %slot.state, to = %next, "vertex state");
        slot.state = next;
    }

    /// Close processors of vertices that never ran.
    fn close_remaining(&self) {
        self.plan.close_all(|i| self.slots[i].closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VertexDescriptor;
    use crate::testing::VecSource;

    #[test]
    fn driver_starts_with_every_vertex_initialized() -> Result<()> {
        let mut registry = Registry::new();
        registry
            .register_processor("one", VecSource::new(vec![1u8]).factory())
            .register_processor("two", VecSource::new(vec![2u8]).with_tasks(2).factory());
        let mut graph = GraphInfo::new();
        graph.add_vertex("one", VertexDescriptor::of("one")?);
        graph.add_vertex("two", VertexDescriptor::of("two")?);
        let config = EngineConfig {
            spill_threshold: None,
            ..EngineConfig::default()
        };

        let plan = plan::prepare(&graph, &registry, &config)?;
        let driver = Driver::new(&plan, &config);
        assert!(driver.slots.iter().all(|s| s.state == VertexState::Initialized));
        assert_eq!(driver.ready.len(), 2);
        driver.close_remaining();
        Ok(())
    }
}
