//! On-disk layout of a compiled graph.
//!
//! The graph is stored inside the application package at
//! [`GRAPH_INFO_PATH`] so a launcher can load it without re-planning:
//!
//! ```text
//! magic "DAGF" | version u16 | SHA-256 of payload (32 bytes) | payload length u32 | postcard payload
//! ```

use super::graph::GraphInfo;
use crate::buffer::DataBuffer;
use crate::error::DagError;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{File, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Location of the serialized graph, relative to the application root.
pub const GRAPH_INFO_PATH: &str = "META-INF/dagflow/graph.bin";

const MAGIC: &[u8; 4] = b"DAGF";
const FORMAT_VERSION: u16 = 1;

/// Absolute graph location inside `application_root`.
pub fn graph_path(application_root: impl AsRef<Path>) -> PathBuf {
    application_root.as_ref().join(GRAPH_INFO_PATH)
}

impl GraphInfo {
    /// Encode the graph in the persisted layout.
    ///
    /// # Errors
    /// Fails if the graph cannot be serialized.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = postcard::to_allocvec(self).context("serialize graph")?;
        let len = u32::try_from(payload.len())
            .map_err(|_| DagError::config(format!("graph too large: {} bytes", payload.len())))?;
        let mut buf = DataBuffer::with_capacity(payload.len() + 42, usize::MAX);
        buf.write_raw(MAGIC);
        buf.write_u16(FORMAT_VERSION);
        buf.write_raw(&Sha256::digest(&payload));
        buf.write_u32(len);
        buf.write_raw(&payload);
        Ok(buf.as_slice().to_vec())
    }

    /// Decode a graph written by [`to_bytes`](Self::to_bytes) and validate it.
    ///
    /// # Errors
    /// Configuration error on a bad header, digest mismatch, truncated payload
    /// or an invalid graph.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buf = DataBuffer::from_bytes(bytes);
        let mut magic = [0u8; 4];
        buf.read_fully(&mut magic)
            .map_err(|_| DagError::config("graph file is truncated"))?;
        if &magic != MAGIC {
            return Err(DagError::config("not a graph file (bad magic)"));
        }
        let version = buf.read_u16().map_err(|_| DagError::config("graph file is truncated"))?;
        if version != FORMAT_VERSION {
            return Err(DagError::config(format!("unsupported graph format version {version}")));
        }
        let mut digest = [0u8; 32];
        buf.read_fully(&mut digest)
            .map_err(|_| DagError::config("graph file is truncated"))?;
        let len = buf.read_u32().map_err(|_| DagError::config("graph file is truncated"))? as usize;
        if buf.remaining() != len {
            return Err(DagError::config(format!(
                "graph payload length mismatch: header says {len}, found {}",
                buf.remaining()
            )));
        }
        let payload = buf.remaining_slice();
        if Sha256::digest(payload).as_slice() != digest.as_slice() {
            return Err(DagError::config("graph integrity check failed: checksum mismatch"));
        }
        let graph: Self = postcard::from_bytes(payload)
            .map_err(|e| DagError::config(format!("cannot decode graph: {e}")))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Write the graph to `path`, creating parent directories.
    ///
    /// # Errors
    /// Fails on serialization or file system errors.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        let bytes = self.to_bytes()?;
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        file.write_all(&bytes)
            .with_context(|| format!("write {}", path.display()))?;
        file.sync_all()
            .with_context(|| format!("sync {}", path.display()))?;
        Ok(())
    }

    /// Read and validate the graph stored at `path`.
    ///
    /// # Errors
    /// Fails on file system errors or any [`from_bytes`](Self::from_bytes) error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut bytes = Vec::new();
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("load graph from {}", path.display()))
    }
}
