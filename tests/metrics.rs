//! Counters reported to an attached metrics collector.

#![cfg(feature = "metrics")]

mod common;

use anyhow::Result;
use common::{broadcast, one_to_one, spill_config, vertex};
use dagflow::codec::typed::SerdeValueCodec;
use dagflow::metrics::{CounterMetric, MetricsCollector};
use dagflow::model::GraphInfo;
use dagflow::testing::{CollectSink, FailingVertex, INPUT, MapVertex, OUTPUT, VecSource};
use dagflow::{Registry, Runner};
use serde_json::Value;
use std::fs;

fn pipeline(registry: &mut Registry, lines: usize) -> Result<GraphInfo> {
    let words: Vec<String> = (0..lines).map(|i| format!("word-{i:04}")).collect();
    registry
        .register_processor("source", VecSource::new(words).with_tasks(3).factory())
        .register_processor("length", MapVertex::new(|s: &String| s.len() as u64).factory())
        .register_processor("sink", CollectSink::<u64>::new().factory())
        .register_value_serde("line", SerdeValueCodec::<String>::new())
        .register_value_serde("u64", SerdeValueCodec::<u64>::new());

    let mut graph = GraphInfo::new();
    let a = vertex(&mut graph, "source")?;
    let b = vertex(&mut graph, "length")?;
    let c = vertex(&mut graph, "sink")?;
    graph.add_edge((a, OUTPUT), (b, INPUT), one_to_one("line")?)?;
    graph.add_edge((b, OUTPUT), (c, INPUT), broadcast("u64")?)?;
    Ok(graph)
}

#[test]
fn successful_run_reports_tasks_records_and_spills() -> Result<()> {
    let work = tempfile::tempdir()?;
    let mut registry = Registry::new();
    let graph = pipeline(&mut registry, 3_000)?;
    let metrics = MetricsCollector::new();

    Runner::new(spill_config(work.path(), 256))
        .with_metrics(metrics.clone())
        .run(&graph, &registry)?;

    assert_eq!(metrics.counter("vertices_completed"), Some(3));
    // three source tasks, three mapping tasks, one sink task
    assert_eq!(metrics.counter("tasks_completed"), Some(7));
    assert_eq!(metrics.counter("records_one_to_one"), Some(3_000));
    assert_eq!(metrics.counter("records_broadcast"), Some(3_000));
    assert!(metrics.counter("bytes_one_to_one").is_some_and(|b| b > 0));
    assert!(metrics.counter("spilled_bytes").is_some_and(|b| b > 0));
    assert!(metrics.elapsed().is_some());
    Ok(())
}

#[test]
fn failed_run_still_reports_what_completed() -> Result<()> {
    let failing = FailingVertex::new(0, 2);
    let mut registry = Registry::new();
    registry
        .register_processor("ok", VecSource::new(vec![1u64, 2]).factory())
        .register_processor("sink", CollectSink::<u64>::new().factory())
        .register_processor("bad", failing.factory())
        .register_value_serde("u64", SerdeValueCodec::<u64>::new());
    let mut graph = GraphInfo::new();
    let ok = vertex(&mut graph, "ok")?;
    let sink = vertex(&mut graph, "sink")?;
    vertex(&mut graph, "bad")?;
    graph.add_edge((ok, OUTPUT), (sink, INPUT), one_to_one("u64")?)?;

    let metrics = MetricsCollector::new();
    let runner = Runner::new(common::memory_config(1, 1)).with_metrics(metrics.clone());
    assert!(runner.run(&graph, &registry).is_err());
    assert!(metrics.counter("tasks_completed").is_some());
    assert!(metrics.counter("vertices_completed").is_some_and(|v| v < 3));
    Ok(())
}

#[test]
fn saved_json_holds_builtin_and_custom_metrics() -> Result<()> {
    let out = tempfile::tempdir()?;
    let mut registry = Registry::new();
    let graph = pipeline(&mut registry, 10)?;
    let metrics = MetricsCollector::new();
    metrics.register(Box::new(CounterMetric::with_value("batches", 4)));

    Runner::new(common::memory_config(2, 2))
        .with_metrics(metrics.clone())
        .run(&graph, &registry)?;

    let path = out.path().join("metrics.json");
    metrics.save_to_file(&path)?;
    let json: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(json["batches"]["value"], 4);
    assert_eq!(json["records_one_to_one"]["value"], 10);
    assert!(json["execution_time_ms"]["value"].is_u64());
    Ok(())
}
