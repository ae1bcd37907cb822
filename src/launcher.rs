//! Process entry point for packaged applications.
//!
//! A launcher binary registers the application's processors and codecs,
//! then hands its arguments to [`launch_from`]:
//!
//! ```no_run
//! fn main() {
//!     let registry = dagflow::registry::Registry::new();
//!     // registry.register_processor(..) for every vertex of the graph
//!     std::process::exit(dagflow::launcher::launch_from(std::env::args_os(), &registry));
//! }
//! ```
//!
//! The exit status is `0` when every vertex completed and `1` otherwise; the
//! diagnostic goes to the log on stderr.

use crate::error::ExecutionFailure;
use crate::logging;
use crate::model::{GraphInfo, graph_path};
use crate::registry::Registry;
use crate::runner::{EngineConfig, Runner};
use anyhow::Result;
use clap::Parser;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::{error, info};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser, Debug, Clone)]
#[command(name = "dagflow", about = "Execute a compiled dagflow graph")]
pub struct LaunchArgs {
    /// Serialized graph file.
    #[arg(long, conflicts_with = "application", required_unless_present = "application")]
    pub graph: Option<PathBuf>,

    /// Application root; the graph is read from its META-INF/dagflow/graph.bin.
    #[arg(long)]
    pub application: Option<PathBuf>,

    /// Worker pool size (defaults to the number of CPUs).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Partition count of scatter-gather edges.
    #[arg(long)]
    pub partitions: Option<usize>,

    /// Initial record buffer capacity in bytes.
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// In-memory bytes per writer before spilling.
    #[arg(long, conflicts_with = "no_spill")]
    pub spill_threshold: Option<usize>,

    /// Keep all intermediate data in memory.
    #[arg(long)]
    pub no_spill: bool,

    /// Directory for spill files.
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Property passed to every vertex, as `key=value`.
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

impl LaunchArgs {
    #[must_use]
    pub fn graph_file(&self) -> Option<PathBuf> {
        self.graph
            .clone()
            .or_else(|| self.application.as_ref().map(graph_path))
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(partitions) = self.partitions {
            config.partitions = partitions;
        }
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if self.no_spill {
            config.spill_threshold = None;
        } else if let Some(threshold) = self.spill_threshold {
            config.spill_threshold = Some(threshold);
        }
        if let Some(dir) = &self.work_dir {
            config.work_directory.clone_from(dir);
        }
        config.properties = self.properties.iter().cloned().collect::<BTreeMap<_, _>>();
        config
    }
}

/// Parse `argv` (program name first) and run the graph it names.
pub fn launch_from<I, T>(argv: I, registry: &Registry) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match LaunchArgs::try_parse_from(argv) {
        Ok(args) => launch(&args, registry),
        Err(e) => {
            let _ = e.print();
            e.exit_code()
        }
    }
}

/// Load the graph named by `args` and execute it.
pub fn launch(args: &LaunchArgs, registry: &Registry) -> i32 {
    logging::init();
    match execute(args, registry) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ExecutionFailure>() {
                Some(failure) => error!("{}", failure.diagnostic()),
                None => error!("{e:#}"),
            }
            EXIT_FAILURE
        }
    }
}

fn execute(args: &LaunchArgs, registry: &Registry) -> Result<()> {
    let path = args
        .graph_file()
        .ok_or_else(|| crate::error::DagError::config("either --graph or --application is required"))?;
    let graph = GraphInfo::load(&path)?;
    info!(graph = %path.display(), vertices = graph.vertices().len(), "loaded graph");
    let summary = Runner::new(args.engine_config()).run(&graph, registry)?;
    info!("\n{summary}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_engine_config() -> Result<()> {
        let args = LaunchArgs::try_parse_from([
            "dagflow",
            "--application",
            "/opt/app",
            "--threads",
            "3",
            "--no-spill",
            "-D",
            "batch.date=2024-01-01",
            "-Dmode=full",
        ])?;
        assert_eq!(args.graph_file(), Some(PathBuf::from("/opt/app/META-INF/dagflow/graph.bin")));
        let config = args.engine_config();
        assert_eq!(config.threads, 3);
        assert_eq!(config.spill_threshold, None);
        assert_eq!(config.properties.get("batch.date").map(String::as_str), Some("2024-01-01"));
        assert_eq!(config.properties.get("mode").map(String::as_str), Some("full"));
        Ok(())
    }

    #[test]
    fn graph_source_is_required_and_exclusive() {
        assert!(LaunchArgs::try_parse_from(["dagflow"]).is_err());
        assert!(LaunchArgs::try_parse_from(["dagflow", "--graph", "a", "--application", "b"]).is_err());
        assert!(LaunchArgs::try_parse_from(["dagflow", "--graph", "g", "-D", "novalue"]).is_err());
    }
}
