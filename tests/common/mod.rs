//! Shared graph-building helpers for the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use dagflow::model::{DataType, EdgeDescriptor, GraphInfo, SupplierRef, VertexDescriptor};
use dagflow::runner::EngineConfig;
use dagflow::VertexId;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Keyed {
    pub key: u32,
    pub val: String,
}

impl Keyed {
    pub fn new(key: u32, val: &str) -> Self {
        Self {
            key,
            val: val.to_string(),
        }
    }
}

/// Add a vertex whose processor is registered under its own name.
pub fn vertex(graph: &mut GraphInfo, name: &str) -> Result<VertexId> {
    Ok(graph.add_vertex(name, VertexDescriptor::of(name)?))
}

pub fn one_to_one(serde: &str) -> Result<EdgeDescriptor> {
    Ok(EdgeDescriptor::one_to_one(DataType::new(serde)?, SupplierRef::new(serde)?))
}

pub fn broadcast(serde: &str) -> Result<EdgeDescriptor> {
    Ok(EdgeDescriptor::broadcast(DataType::new(serde)?, SupplierRef::new(serde)?))
}

pub fn scatter_gather(serde: &str, comparator: Option<&str>) -> Result<EdgeDescriptor> {
    Ok(EdgeDescriptor::scatter_gather(
        DataType::new(serde)?,
        SupplierRef::new(serde)?,
        comparator.map(SupplierRef::new).transpose()?,
    ))
}

/// In-memory engine with a fixed pool and partition count.
pub fn memory_config(threads: usize, partitions: usize) -> EngineConfig {
    EngineConfig {
        threads,
        partitions,
        spill_threshold: None,
        ..EngineConfig::default()
    }
}

/// Engine spilling every chunk above `threshold` bytes into `dir`.
pub fn spill_config(dir: &Path, threshold: usize) -> EngineConfig {
    EngineConfig {
        threads: 4,
        partitions: 3,
        buffer_size: 64,
        spill_threshold: Some(threshold),
        work_directory: dir.to_path_buf(),
        ..EngineConfig::default()
    }
}

pub fn sorted<T: Ord>(mut v: Vec<T>) -> Vec<T> {
    v.sort();
    v
}
