//! Edge channels: how one vertex's output becomes another vertex's input.
//!
//! Every channel moves through `Writable -> Frozen -> Released`. Producer
//! tasks write through sinks while the channel is writable; the runner
//! freezes it once the producing vertex has completed, after which any number
//! of consumer tasks read it concurrently; the runner releases it once the
//! consuming vertex is done, which drops buffered data and spill files.

mod broadcast;
mod group;
mod one_to_one;
mod scatter_gather;
mod store;

use crate::codec::Record;
use crate::error::DagError;
use crate::model::{EdgeDescriptor, EdgeKind};
use crate::processor::{GroupReader, ObjectReader};
use crate::registry::Registry;
use anyhow::{Context, Result};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use tracing::debug;

pub(crate) use store::{BufferStrategy, StoreConfig};

/// Per-task write handle of one channel.
pub(crate) trait RecordSink: Send {
    fn put(&mut self, object: &dyn Any) -> Result<()>;

    /// Publish everything written so far to the channel.
    fn commit(self: Box<Self>) -> Result<()>;
}

pub(crate) trait EdgeChannel: Send + Sync {
    /// Diagnostic name, e.g. `a.out -> b.in`.
    fn label(&self) -> &str;

    fn kind(&self) -> EdgeKind;

    fn open_sink(&self, task_index: usize) -> Result<Box<dyn RecordSink>>;

    fn freeze(&self) -> Result<()>;

    /// Records destined for consumer task `task_index` of `task_count`.
    fn open_reader(&self, task_index: usize, task_count: usize) -> Result<Box<dyn ObjectReader>>;

    fn open_group_reader(&self, _task_index: usize, _task_count: usize) -> Result<Box<dyn GroupReader>> {
        Err(DagError::illegal_state(format!(
            "{} is a {} edge; grouped reads need a SCATTER_GATHER edge",
            self.label(),
            self.kind()
        )))
    }

    fn release(&self);

    fn stats(&self) -> ChannelStats;
}

/// Volume moved through one channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub records: u64,
    pub bytes: u64,
    pub spilled_bytes: u64,
}

const WRITABLE: u8 = 0;
const FROZEN: u8 = 1;
const RELEASED: u8 = 2;

/// Lifecycle and counters common to every channel kind.
pub(crate) struct ChannelCore {
    label: String,
    phase: AtomicU8,
    records: AtomicU64,
    bytes: AtomicU64,
    spilled_bytes: AtomicU64,
    /// Committed bytes held in memory across all producer tasks.
    resident_bytes: AtomicU64,
}

impl ChannelCore {
    pub fn new(label: String) -> Self {
        Self {
            label,
            phase: AtomicU8::new(WRITABLE),
            records: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            spilled_bytes: AtomicU64::new(0),
            resident_bytes: AtomicU64::new(0),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ensure_writable(&self) -> Result<()> {
        match self.phase.load(Ordering::Acquire) {
            WRITABLE => Ok(()),
            FROZEN => Err(DagError::illegal_state(format!("{} is frozen; it no longer accepts writes", self.label))),
            _ => Err(DagError::illegal_state(format!("{} has been released", self.label))),
        }
    }

    pub fn ensure_readable(&self) -> Result<()> {
        match self.phase.load(Ordering::Acquire) {
            FROZEN => Ok(()),
            WRITABLE => Err(DagError::illegal_state(format!("{} is not frozen yet", self.label))),
            _ => Err(DagError::illegal_state(format!("{} has been released", self.label))),
        }
    }

    pub fn freeze(&self) -> Result<()> {
        self.phase
            .compare_exchange(WRITABLE, FROZEN, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DagError::illegal_state(format!("{} is already frozen", self.label)))?;
        debug!(edge = %self.label, records = self.records.load(Ordering::Relaxed), "froze channel");
        Ok(())
    }

    /// Returns `true` on the first release.
    pub fn release(&self) -> bool {
        let first = self.phase.swap(RELEASED, Ordering::AcqRel) != RELEASED;
        if first {
            self.resident_bytes.store(0, Ordering::Release);
        }
        first
    }

    /// Claim room for `bytes` of committed in-memory data. `false` means the
    /// channel would hold more than `limit` bytes and the data must spill.
    pub fn try_hold(&self, bytes: u64, limit: u64) -> bool {
        self.resident_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| {
                held.checked_add(bytes).filter(|total| *total <= limit)
            })
            .is_ok()
    }

    pub fn resident_bytes(&self) -> u64 {
        self.resident_bytes.load(Ordering::Acquire)
    }

    pub fn count(&self, records: u64, bytes: u64, spilled_bytes: u64) {
        self.records.fetch_add(records, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.spilled_bytes.fetch_add(spilled_bytes, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            records: self.records.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            spilled_bytes: self.spilled_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Build the channel for `descriptor`, resolving its codecs through `registry`.
///
/// # Errors
/// Configuration error if a serializer or comparator is not registered.
pub(crate) fn open_channel(
    label: String,
    descriptor: &EdgeDescriptor,
    registry: &Registry,
    store: &Arc<StoreConfig>,
    partitions: usize,
) -> Result<Arc<dyn EdgeChannel>> {
    let channel: Arc<dyn EdgeChannel> = match descriptor {
        EdgeDescriptor::Nothing => Arc::new(NothingChannel {
            core: ChannelCore::new(label),
        }),
        EdgeDescriptor::OneToOne { serde, .. } => {
            let serde = registry.value_serde(serde).with_context(|| format!("edge {label}"))?;
            Arc::new(one_to_one::OneToOneChannel::new(label, serde, Arc::clone(store)))
        }
        EdgeDescriptor::Broadcast { serde, .. } => {
            let serde = registry.value_serde(serde).with_context(|| format!("edge {label}"))?;
            Arc::new(broadcast::BroadcastChannel::new(label, serde, Arc::clone(store)))
        }
        EdgeDescriptor::ScatterGather {
            serde, comparator, ..
        } => {
            let serde = registry
                .key_value_serde(serde)
                .with_context(|| format!("edge {label}"))?;
            let comparator = comparator
                .as_ref()
                .map(|c| registry.comparator(c))
                .transpose()
                .with_context(|| format!("edge {label}"))?;
            if partitions == 0 {
                return Err(DagError::config(format!("edge {label}: partition count must be positive")));
            }
            Arc::new(scatter_gather::ScatterGatherChannel::new(
                label,
                serde,
                comparator,
                partitions,
                Arc::clone(store),
            ))
        }
    };
    Ok(channel)
}

/// Ordering dependency only; carries no records.
struct NothingChannel {
    core: ChannelCore,
}

struct NothingSink {
    label: String,
}

impl RecordSink for NothingSink {
    fn put(&mut self, _object: &dyn Any) -> Result<()> {
        Err(DagError::illegal_state(format!("{} is a NOTHING edge and carries no records", self.label)))
    }

    fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct EmptyReader;

impl ObjectReader for EmptyReader {
    fn next_object(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn get_object(&self) -> Result<&(dyn Any + Send + Sync)> {
        Err(DagError::illegal_state("a NOTHING edge has no records"))
    }
}

impl EdgeChannel for NothingChannel {
    fn label(&self) -> &str {
        self.core.label()
    }

    fn kind(&self) -> EdgeKind {
        EdgeKind::Nothing
    }

    fn open_sink(&self, _task_index: usize) -> Result<Box<dyn RecordSink>> {
        self.core.ensure_writable()?;
        Ok(Box::new(NothingSink {
            label: self.core.label().to_string(),
        }))
    }

    fn freeze(&self) -> Result<()> {
        self.core.freeze()
    }

    fn open_reader(&self, _task_index: usize, _task_count: usize) -> Result<Box<dyn ObjectReader>> {
        self.core.ensure_readable()?;
        Ok(Box::new(EmptyReader))
    }

    fn release(&self) {
        self.core.release();
    }

    fn stats(&self) -> ChannelStats {
        self.core.stats()
    }
}

/// Current record slot shared by the reader implementations.
fn current<'a>(slot: &'a Option<Record>, label: &str) -> Result<&'a (dyn Any + Send + Sync)> {
    slot.as_deref()
        .ok_or_else(|| DagError::illegal_state(format!("no current record on {label}; call next first")))
}

/// Deserializers must consume exactly the bytes they were given.
fn check_consumed(remaining: usize, label: &str) -> Result<()> {
    if remaining == 0 {
        Ok(())
    } else {
        Err(DagError::contract(format!(
            "deserializer on {label} left {remaining} unread bytes"
        )))
    }
}
