use super::EngineConfig;
use super::worker::contain;
use crate::edge::{BufferStrategy, EdgeChannel, StoreConfig, open_channel};
use crate::error::DagError;
use crate::model::{EdgeKind, GraphInfo};
use crate::processor::{Ports, TaskSchedule, VertexContext, VertexProcessor};
use crate::registry::Registry;
use crate::vertex_id::VertexId;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::create_dir_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// A vertex after instantiation and initialization.
pub(crate) struct VertexPlan {
    pub name: String,
    pub processor: Arc<dyn VertexProcessor>,
    pub ports: Arc<Ports>,
    pub schedule: Arc<TaskSchedule>,
    pub concurrency: usize,
    /// Edge indices feeding this vertex.
    pub inputs: Vec<usize>,
    /// Edge indices leaving this vertex.
    pub outputs: Vec<usize>,
    /// Plan indices of distinct upstream vertices.
    pub upstream: BTreeSet<usize>,
    /// Plan indices of distinct downstream vertices.
    pub downstream: BTreeSet<usize>,
}

/// Everything the driver needs: vertices in topological order and one
/// channel per graph edge.
pub(crate) struct ExecutionPlan {
    pub vertices: Vec<VertexPlan>,
    pub channels: Vec<Arc<dyn EdgeChannel>>,
}

impl ExecutionPlan {
    /// Close every processor; failures are only logged.
    pub fn close_all(&self, skip: impl Fn(usize) -> bool) {
        for (i, v) in self.vertices.iter().enumerate() {
            if !skip(i)
                && let Err(e) = close_processor(v.processor.as_ref())
            {
                warn!(vertex = %v.name, error = %format!("{e:#}"), "closing processor failed");
            }
        }
    }

    pub fn release_all(&self) {
        for c in &self.channels {
            c.release();
        }
    }
}

/// Close a vertex processor, reporting a panic as a contract error.
pub(crate) fn close_processor(processor: &dyn VertexProcessor) -> Result<()> {
    contain("close", || processor.close())
}

pub(crate) fn store_config(config: &EngineConfig) -> Result<StoreConfig> {
    let strategy = match config.spill_threshold {
        None => BufferStrategy::Memory,
        Some(0) => return Err(DagError::config("spill threshold must be positive")),
        Some(threshold) => {
            create_dir_all(&config.work_directory).map_err(|e| {
                DagError::io(format!("work directory {}", config.work_directory.display()), e)
            })?;
            BufferStrategy::Spill {
                threshold,
                directory: config.work_directory.clone(),
            }
        }
    };
    Ok(StoreConfig {
        initial_capacity: config.buffer_size.max(1),
        strategy,
    })
}

/// Instantiate and initialize every vertex before any task runs, so that
/// configuration errors surface eagerly.
///
/// # Errors
/// Configuration errors for invalid graphs, unresolved names, illegal
/// custom schedules or disagreeing partition counts; anything a processor
/// factory or `initialize` returns.
pub(crate) fn prepare(graph: &GraphInfo, registry: &Registry, config: &EngineConfig) -> Result<ExecutionPlan> {
    graph.validate()?;
    let order = graph.topological_order()?;
    let store = Arc::new(store_config(config)?);

    let channels = graph
        .edges()
        .iter()
        .enumerate()
        .map(|(i, e)| open_channel(graph.edge_label(i), &e.descriptor, registry, &store, config.partitions))
        .collect::<Result<Vec<_>>>()?;

    let position: HashMap<_, _> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut vertices: Vec<VertexPlan> = Vec::with_capacity(order.len());
    for id in &order {
        let planned = plan_vertex(graph, registry, config, &channels, &position, &vertices, *id);
        match planned {
            Ok(v) => vertices.push(v),
            Err(e) => {
                for v in &vertices {
                    if let Err(close) = close_processor(v.processor.as_ref()) {
                        warn!(vertex = %v.name, error = %format!("{close:#}"), "closing processor failed");
                    }
                }
                return Err(e);
            }
        }
    }
    for i in 0..vertices.len() {
        for u in vertices[i].upstream.clone() {
            vertices[u].downstream.insert(i);
        }
    }
    Ok(ExecutionPlan { vertices, channels })
}

fn plan_vertex(
    graph: &GraphInfo,
    registry: &Registry,
    config: &EngineConfig,
    channels: &[Arc<dyn EdgeChannel>],
    position: &HashMap<VertexId, usize>,
    planned: &[VertexPlan],
    id: VertexId,
) -> Result<VertexPlan> {
    let info = graph
        .vertex(id)
        .ok_or_else(|| DagError::config(format!("unknown vertex {id:?}")))?;
    let name = info.name().to_string();

    let mut ports = Ports::default();
    let inputs: Vec<usize> = graph.input_edges(id).collect();
    let outputs: Vec<usize> = graph.output_edges(id).collect();
    for &e in &inputs {
        let port = graph.edges()[e].destination.name.clone();
        ports.inputs.insert(port, Arc::clone(&channels[e]));
    }
    for &e in &outputs {
        let port = graph.edges()[e].source.name.clone();
        ports.outputs.entry(port).or_default().push(Arc::clone(&channels[e]));
    }

    let mut processor =
        contain("processor factory", || registry.new_processor(info.descriptor().processor()))
            .with_context(|| format!("instantiate vertex '{name}'"))?;
    let context = VertexContext {
        vertex: &name,
        registry,
        properties: &config.properties,
        ports: &ports,
    };
    let custom = contain("initialize", || processor.initialize(&context))
        .with_context(|| format!("initialize vertex '{name}'"))?;
    let processor: Arc<dyn VertexProcessor> = Arc::from(processor);

    let upstream: BTreeSet<usize> = inputs
        .iter()
        .filter_map(|&e| position.get(&graph.edges()[e].source.vertex).copied())
        .collect();
    let schedule = derive_schedule(graph, config, &name, &inputs, custom, |e| {
        position
            .get(&graph.edges()[e].source.vertex)
            .and_then(|&p| planned.get(p))
            .map(|v| v.schedule.len())
    })
    .inspect_err(|_| {
        if let Err(e) = close_processor(processor.as_ref()) {
            warn!(vertex = %name, error = %format!("{e:#}"), "closing processor failed");
        }
    })?;

    let concurrency = [processor.max_concurrency(), schedule.max_concurrency()]
        .into_iter()
        .flatten()
        .fold(config.threads, usize::min)
        .max(1);
    debug!(vertex = %name, tasks = schedule.len(), concurrency, "initialized vertex");

    Ok(VertexPlan {
        name,
        processor,
        ports: Arc::new(ports),
        schedule: Arc::new(schedule),
        concurrency,
        inputs,
        outputs,
        upstream,
        downstream: BTreeSet::new(),
    })
}

/// Custom schedules are only legal when every input is a broadcast. Other
/// vertices run one task per upstream partition, and all partitioned
/// (one-to-one or scatter-gather) inputs must agree on that count.
fn derive_schedule(
    graph: &GraphInfo,
    config: &EngineConfig,
    name: &str,
    inputs: &[usize],
    custom: Option<TaskSchedule>,
    producer_tasks: impl Fn(usize) -> Option<usize>,
) -> Result<TaskSchedule> {
    let mut counts: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut non_broadcast = None;
    for &e in inputs {
        let kind = graph.edges()[e].descriptor.kind();
        if kind != EdgeKind::Broadcast && non_broadcast.is_none() {
            non_broadcast = Some((kind, graph.edge_label(e)));
        }
        let count = match kind {
            EdgeKind::OneToOne => producer_tasks(e).ok_or_else(|| {
                DagError::config(format!("producer of {} is not planned", graph.edge_label(e)))
            })?,
            EdgeKind::ScatterGather => config.partitions,
            EdgeKind::Broadcast | EdgeKind::Nothing => continue,
        };
        counts.entry(count).or_default().push(graph.edge_label(e));
    }

    if let Some(schedule) = custom {
        if let Some((kind, edge)) = non_broadcast {
            return Err(DagError::config(format!(
                "vertex '{name}' requests a custom task schedule but has {kind} input {edge}"
            )));
        }
        return Ok(schedule);
    }

    match counts.len() {
        0 => Ok(TaskSchedule::uniform(1)),
        1 => Ok(TaskSchedule::uniform(counts.keys().next().copied().unwrap_or(1))),
        _ => Err(DagError::config(format!(
            "vertex '{name}' has partitioned inputs with different partition counts: {counts:?}"
        ))),
    }
}
