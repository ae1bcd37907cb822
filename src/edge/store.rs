//! Record storage shared by all channel kinds.
//!
//! A record is `key length u32 | key bytes | value length u32 | value bytes`.
//! A writer appends records to an in-memory chunk; under the spilling
//! strategy, a chunk that grows past the threshold is moved to a temporary
//! file in the work directory. A finished [`Fragment`] is immutable and can
//! be read by any number of cursors at once.

use crate::buffer::{BufferedReadableByteChannel, BufferedWritableByteChannel, DataBuffer};
use crate::error::DagError;
use anyhow::Result;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

/// How a channel buffers data that has been written but not yet read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BufferStrategy {
    /// Everything stays in memory.
    Memory,
    /// Chunks above `threshold` bytes move to files under `directory`.
    Spill { threshold: usize, directory: PathBuf },
}

#[derive(Clone, Debug)]
pub(crate) struct StoreConfig {
    pub initial_capacity: usize,
    pub strategy: BufferStrategy,
}

impl StoreConfig {
    pub fn memory(initial_capacity: usize) -> Self {
        Self {
            initial_capacity,
            strategy: BufferStrategy::Memory,
        }
    }

    pub fn threshold(&self) -> Option<usize> {
        match self.strategy {
            BufferStrategy::Memory => None,
            BufferStrategy::Spill { threshold, .. } => Some(threshold),
        }
    }

    pub fn new_buffer(&self) -> DataBuffer {
        let soft = self.threshold().unwrap_or(usize::MAX);
        DataBuffer::with_capacity(self.initial_capacity.min(soft), soft)
    }
}

/// A temporary file holding one spilled chunk. Deleted on drop.
#[derive(Debug)]
pub(crate) struct SpillFile {
    file: NamedTempFile,
    len: u64,
}

impl SpillFile {
    pub fn write(config: &StoreConfig, bytes: &[u8]) -> Result<Self> {
        let BufferStrategy::Spill { directory, .. } = &config.strategy else {
            return Err(DagError::illegal_state("spill requested without a spill directory"));
        };
        let file = tempfile::Builder::new()
            .prefix("dagflow-spill-")
            .suffix(".bin")
            .tempfile_in(directory)
            .map_err(|e| DagError::io(format!("create spill file in {}", directory.display()), e))?;
        let mut out = BufferedWritableByteChannel::new(file.as_file());
        out.write_all(bytes)
            .and_then(|()| out.close().map(|_| ()))
            .map_err(|e| DagError::io(format!("write spill file {}", file.path().display()), e))?;
        debug!(path = %file.path().display(), bytes = bytes.len(), "spilled chunk");
        Ok(Self {
            file,
            len: bytes.len() as u64,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    fn open(&self) -> Result<BufferedReadableByteChannel<File>> {
        File::open(self.file.path())
            .map(BufferedReadableByteChannel::new)
            .map_err(|e| DagError::io(format!("open spill file {}", self.file.path().display()), e))
    }
}

#[derive(Debug)]
enum Chunk {
    Memory(Arc<[u8]>),
    Spilled(SpillFile),
}

/// Immutable sequence of records produced by one writer.
#[derive(Debug, Default)]
pub(crate) struct Fragment {
    chunks: Vec<Chunk>,
    records: u64,
    bytes: u64,
}

impl Fragment {
    /// Single chunk already holding encoded records.
    pub fn from_chunk(bytes: &[u8], records: u64) -> Self {
        Self {
            chunks: vec![Chunk::Memory(Arc::from(bytes))],
            records,
            bytes: bytes.len() as u64,
        }
    }

    pub fn from_spill(file: SpillFile, records: u64) -> Self {
        Self {
            bytes: file.len(),
            chunks: vec![Chunk::Spilled(file)],
            records,
        }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn spilled_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .map(|c| match c {
                Chunk::Memory(_) => 0,
                Chunk::Spilled(f) => f.len(),
            })
            .sum()
    }
}

/// Append a record in the stored layout.
pub(crate) fn encode_record(out: &mut DataBuffer, key: &[u8], value: &[u8]) -> Result<()> {
    out.write_u32(segment_len(key)?);
    out.write_raw(key);
    out.write_u32(segment_len(value)?);
    out.write_raw(value);
    Ok(())
}

fn segment_len(bytes: &[u8]) -> Result<u32> {
    u32::try_from(bytes.len())
        .map_err(|_| DagError::contract(format!("record segment of {} bytes is too large", bytes.len())))
}

/// Builds a [`Fragment`] from records appended by one task.
pub(crate) struct FragmentWriter {
    config: Arc<StoreConfig>,
    buffer: DataBuffer,
    chunks: Vec<Chunk>,
    records: u64,
    bytes: u64,
}

impl FragmentWriter {
    pub fn new(config: Arc<StoreConfig>) -> Self {
        Self {
            buffer: config.new_buffer(),
            config,
            chunks: Vec::new(),
            records: 0,
            bytes: 0,
        }
    }

    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let before = self.buffer.limit();
        encode_record(&mut self.buffer, key, value)?;
        self.records += 1;
        self.bytes += (self.buffer.limit() - before) as u64;
        if self
            .config
            .threshold()
            .is_some_and(|t| self.buffer.limit() >= t)
        {
            let file = SpillFile::write(&self.config, self.buffer.as_slice())?;
            self.chunks.push(Chunk::Spilled(file));
            self.buffer.reset();
        }
        Ok(())
    }

    /// Seal the fragment. The unspilled tail stays in memory only while
    /// `hold` grants room for it in the channel; otherwise it spills too.
    pub fn finish(mut self, hold: impl FnOnce(u64) -> bool) -> Result<Fragment> {
        let tail = self.buffer.as_slice();
        if !tail.is_empty() {
            let chunk = if self.config.threshold().is_none() || hold(tail.len() as u64) {
                Chunk::Memory(Arc::from(tail))
            } else {
                Chunk::Spilled(SpillFile::write(&self.config, tail)?)
            };
            self.chunks.push(chunk);
        }
        Ok(Fragment {
            chunks: self.chunks,
            records: self.records,
            bytes: self.bytes,
        })
    }
}

/// Forward-only cursor over the records of a shared fragment.
pub(crate) struct FragmentCursor {
    fragment: Arc<Fragment>,
    next_chunk: usize,
    source: Option<Box<dyn Read + Send>>,
}

impl FragmentCursor {
    pub fn new(fragment: Arc<Fragment>) -> Self {
        Self {
            fragment,
            next_chunk: 0,
            source: None,
        }
    }

    /// Load the next record into `key` and `value`; `false` at the end.
    pub fn next(&mut self, key: &mut DataBuffer, value: &mut DataBuffer) -> Result<bool> {
        loop {
            if self.source.is_none() {
                let Some(chunk) = self.fragment.chunks.get(self.next_chunk) else {
                    return Ok(false);
                };
                self.next_chunk += 1;
                self.source = Some(match chunk {
                    Chunk::Memory(bytes) => Box::new(Cursor::new(Arc::clone(bytes))),
                    Chunk::Spilled(file) => Box::new(file.open()?),
                });
            }
            let Some(source) = self.source.as_mut() else {
                continue;
            };
            if read_record(source, key, value).map_err(|e| DagError::io("read channel record", e))? {
                return Ok(true);
            }
            self.source = None;
        }
    }
}

fn read_record(source: &mut impl Read, key: &mut DataBuffer, value: &mut DataBuffer) -> io::Result<bool> {
    let Some(key_len) = read_len(source)? else {
        return Ok(false);
    };
    key.load_from(source, key_len)?;
    let value_len = read_len(source)?.ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
    value.load_from(source, value_len)?;
    Ok(true)
}

/// `None` on a clean end of input, `UnexpectedEof` on a partial header.
fn read_len(source: &mut impl Read) -> io::Result<Option<usize>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match source.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Some(u32::from_be_bytes(header) as usize))
}
