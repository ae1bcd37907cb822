use super::group::{compare_records, MergeCursor, MergedGroupReader, MergedObjectReader, Run};
use super::store::{Fragment, SpillFile, StoreConfig, encode_record};
use super::{ChannelCore, ChannelStats, EdgeChannel, RecordSink};
use crate::buffer::DataBuffer;
use crate::codec::{DataComparator, KeyValueSerDe, try_sort_by};
use crate::error::DagError;
use crate::model::EdgeKind;
use crate::processor::{GroupReader, ObjectReader};
use anyhow::{Context, Result};
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

/// Partition for a key: `DefaultHasher::new()` uses fixed keys, so the
/// assignment agrees across producer tasks and runs of the same build. The
/// hash algorithm may change between Rust releases.
pub(crate) fn partition_of(key: &[u8], partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    hasher.write(key);
    (hasher.finish() % partitions as u64) as usize
}

/// Records partitioned by key bytes.
///
/// Each producer task sorts what it wrote into runs per partition (by key
/// bytes, then by the edge comparator over value bytes, stable). Readers
/// merge the runs of their partitions, breaking ties by producer task and
/// run sequence, which keeps the overall order stable.
pub(crate) struct ScatterGatherChannel {
    shared: Arc<Shared>,
}

struct Shared {
    core: ChannelCore,
    serde: Arc<dyn KeyValueSerDe>,
    comparator: Option<Arc<dyn DataComparator>>,
    config: Arc<StoreConfig>,
    partitions: Vec<Mutex<Vec<Run>>>,
}

impl Shared {
    fn partition(&self, index: usize) -> Result<MutexGuard<'_, Vec<Run>>> {
        self.partitions[index]
            .lock()
            .map_err(|_| DagError::illegal_state(format!("{} is poisoned", self.core.label())))
    }

    /// Merged cursor over the runs of every partition assigned to `task_index`.
    fn merge(&self, task_index: usize, task_count: usize) -> Result<MergeCursor> {
        self.core.ensure_readable()?;
        if task_index >= task_count {
            return Err(DagError::illegal_state(format!(
                "task #{task_index} is outside a schedule of {task_count} tasks"
            )));
        }
        let mut runs = Vec::new();
        for p in (task_index..self.partitions.len()).step_by(task_count) {
            runs.extend(self.partition(p)?.iter().cloned());
        }
        // Partitions hold disjoint keys, so ordering all runs by origin
        // keeps ties stable within each key.
        runs.sort_by_key(Run::origin);
        MergeCursor::open(
            self.core.label().to_string(),
            runs,
            self.comparator.clone(),
        )
    }
}

impl ScatterGatherChannel {
    pub fn new(
        label: String,
        serde: Arc<dyn KeyValueSerDe>,
        comparator: Option<Arc<dyn DataComparator>>,
        partitions: usize,
        config: Arc<StoreConfig>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: ChannelCore::new(label),
                serde,
                comparator,
                config,
                partitions: (0..partitions).map(|_| Mutex::new(Vec::new())).collect(),
            }),
        }
    }
}

impl EdgeChannel for ScatterGatherChannel {
    fn label(&self) -> &str {
        self.shared.core.label()
    }

    fn kind(&self) -> EdgeKind {
        EdgeKind::ScatterGather
    }

    fn open_sink(&self, task_index: usize) -> Result<Box<dyn RecordSink>> {
        self.shared.core.ensure_writable()?;
        let partitions = self.shared.partitions.len();
        Ok(Box::new(PartitionSink {
            shared: Arc::clone(&self.shared),
            task_index,
            next_seq: 0,
            arena: self.shared.config.new_buffer(),
            entries: vec![Vec::new(); partitions],
            key: DataBuffer::new(),
            value: DataBuffer::new(),
            runs: Vec::new(),
        }))
    }

    fn freeze(&self) -> Result<()> {
        self.shared.core.freeze()
    }

    fn open_reader(&self, task_index: usize, task_count: usize) -> Result<Box<dyn ObjectReader>> {
        let merge = self.shared.merge(task_index, task_count)?;
        Ok(Box::new(MergedObjectReader::new(merge, Arc::clone(&self.shared.serde))))
    }

    fn open_group_reader(&self, task_index: usize, task_count: usize) -> Result<Box<dyn GroupReader>> {
        let merge = self.shared.merge(task_index, task_count)?;
        Ok(Box::new(MergedGroupReader::new(merge, Arc::clone(&self.shared.serde))))
    }

    fn release(&self) {
        if self.shared.core.release() {
            for partition in &self.shared.partitions {
                if let Ok(mut runs) = partition.lock() {
                    runs.clear();
                }
            }
        }
    }

    fn stats(&self) -> ChannelStats {
        self.shared.core.stats()
    }
}

#[derive(Clone)]
struct Entry {
    key: Range<usize>,
    value: Range<usize>,
}

/// One producer task's view of the channel: an arena of encoded keys and
/// values plus per-partition entry lists, sorted into runs on spill and
/// on commit.
struct PartitionSink {
    shared: Arc<Shared>,
    task_index: usize,
    next_seq: usize,
    arena: DataBuffer,
    entries: Vec<Vec<Entry>>,
    key: DataBuffer,
    value: DataBuffer,
    runs: Vec<(usize, Run)>,
}

impl PartitionSink {
    fn sort_partition(&mut self, partition: usize) -> Result<Vec<Entry>> {
        let mut entries = std::mem::take(&mut self.entries[partition]);
        let arena = self.arena.as_slice();
        let shared = &self.shared;
        try_sort_by(&mut entries, |a, b| {
            compare_records(
                shared.comparator.as_deref(),
                (&arena[a.key.clone()], &arena[a.value.clone()]),
                (&arena[b.key.clone()], &arena[b.value.clone()]),
            )
        })
        .with_context(|| format!("sort records for {}", shared.core.label()))?;
        Ok(entries)
    }

    /// Sort every non-empty partition into a run. `spill` moves the runs to
    /// files; otherwise a run stays in memory while the channel has room
    /// for it under the spill threshold.
    fn flush(&mut self, spill: bool) -> Result<()> {
        let limit = self.shared.config.threshold().map(|t| t as u64);
        let mut encoded = DataBuffer::with_capacity(self.shared.config.initial_capacity, usize::MAX);
        for partition in 0..self.entries.len() {
            if self.entries[partition].is_empty() {
                continue;
            }
            let entries = self.sort_partition(partition)?;
            encoded.reset();
            let arena = self.arena.as_slice();
            for e in &entries {
                encode_record(&mut encoded, &arena[e.key.clone()], &arena[e.value.clone()])?;
            }
            let records = entries.len() as u64;
            let to_disk = spill
                || limit.is_some_and(|limit| !self.shared.core.try_hold(encoded.limit() as u64, limit));
            let fragment = if to_disk {
                Fragment::from_spill(SpillFile::write(&self.shared.config, encoded.as_slice())?, records)
            } else {
                Fragment::from_chunk(encoded.as_slice(), records)
            };
            let run = Run::new((self.task_index, self.next_seq), Arc::new(fragment));
            self.next_seq += 1;
            self.runs.push((partition, run));
        }
        self.arena.reset();
        Ok(())
    }
}

impl RecordSink for PartitionSink {
    fn put(&mut self, object: &dyn Any) -> Result<()> {
        let label = self.shared.core.label();
        self.key.reset();
        self.shared
            .serde
            .serialize_key(object, &mut self.key)
            .with_context(|| format!("serialize key for {label}"))?;
        self.value.reset();
        self.shared
            .serde
            .serialize_value(object, &mut self.value)
            .with_context(|| format!("serialize value for {label}"))?;

        let partition = partition_of(self.key.as_slice(), self.entries.len());
        let key_start = self.arena.limit();
        self.arena.write_raw(self.key.as_slice());
        let value_start = self.arena.limit();
        self.arena.write_raw(self.value.as_slice());
        self.entries[partition].push(Entry {
            key: key_start..value_start,
            value: value_start..self.arena.limit(),
        });

        if self
            .shared
            .config
            .threshold()
            .is_some_and(|t| self.arena.limit() >= t)
        {
            self.flush(true)?;
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.flush(false)?;
        self.shared.core.ensure_writable()?;
        for (partition, run) in self.runs.drain(..) {
            let fragment = run.fragment();
            self.shared
                .core
                .count(fragment.records(), fragment.bytes(), fragment.spilled_bytes());
            self.shared.partition(partition)?.push(run);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::typed::{FnComparator, SerdeKeyValueCodec};
    use crate::edge::BufferStrategy;

    type Row = (u32, i64, u32);

    fn channel(config: StoreConfig, partitions: usize) -> ScatterGatherChannel {
        ScatterGatherChannel::new(
            "map.out -> reduce.in".into(),
            Arc::new(SerdeKeyValueCodec::new(|r: &Row| r.0)),
            Some(Arc::new(FnComparator::new(|a: &Row, b: &Row| b.1.cmp(&a.1))) as Arc<dyn DataComparator>),
            partitions,
            Arc::new(config),
        )
    }

    fn groups(channel: &ScatterGatherChannel, task: usize, tasks: usize) -> Result<Vec<(u32, Vec<Row>)>> {
        let mut reader = channel.open_group_reader(task, tasks)?;
        let mut out = Vec::new();
        while reader.next_group()? {
            let key = *reader.group::<u32>()?;
            let mut rows = Vec::new();
            while reader.next_object()? {
                rows.push(*reader.object::<Row>()?);
            }
            out.push((key, rows));
        }
        Ok(out)
    }

    #[test]
    fn spilled_runs_merge_sorted_and_stable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = StoreConfig {
            initial_capacity: 32,
            strategy: BufferStrategy::Spill {
                threshold: 96,
                directory: dir.path().to_path_buf(),
            },
        };
        let channel = channel(config, 1);
        // seq (third field) records write order across both producers
        let mut seq = 0;
        for task in 0..2 {
            let mut sink = channel.open_sink(task)?;
            for i in 0..40u32 {
                let row: Row = (i % 3, i64::from(i % 4), seq);
                seq += 1;
                sink.put(&row)?;
            }
            sink.commit()?;
        }
        channel.freeze()?;
        assert!(channel.stats().spilled_bytes > 0);
        assert_eq!(channel.stats().records, 80);

        let all = groups(&channel, 0, 1)?;
        assert_eq!(all.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![0, 1, 2]);
        for (key, rows) in &all {
            assert!(rows.iter().all(|r| r.0 == *key));
            for pair in rows.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                assert!(a.1 > b.1 || (a.1 == b.1 && a.2 < b.2), "{a:?} before {b:?}");
            }
        }
        assert_eq!(all.iter().map(|(_, r)| r.len()).sum::<usize>(), 80);

        channel.release();
        drop(channel);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn each_key_lands_in_exactly_one_partition() -> Result<()> {
        let channel = channel(StoreConfig::memory(64), 4);
        let mut sink = channel.open_sink(0)?;
        for i in 0..100u32 {
            sink.put(&(i % 10, 0i64, i))?;
        }
        sink.commit()?;
        channel.freeze()?;

        let mut keys = Vec::new();
        for task in 0..4 {
            for (key, rows) in groups(&channel, task, 4)? {
                assert_eq!(rows.len(), 10);
                keys.push(key);
            }
        }
        keys.sort_unstable();
        assert_eq!(keys, (0..10).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn group_reader_guards_its_cursor() -> Result<()> {
        let channel = channel(StoreConfig::memory(64), 1);
        let mut sink = channel.open_sink(0)?;
        sink.put(&(5u32, 1i64, 0u32))?;
        sink.commit()?;
        channel.freeze()?;

        let mut reader = channel.open_group_reader(0, 1)?;
        assert!(DagError::is_illegal_state(&reader.get_group().err().ok_or_else(|| anyhow::anyhow!("group"))?));
        assert!(reader.next_object().is_err());
        assert!(reader.next_group()?);
        assert!(reader.get_object().is_err());
        assert!(reader.next_object()?);
        assert_eq!(reader.object::<Row>()?.0, 5);
        assert!(!reader.next_object()?);
        assert!(reader.get_object().is_err());
        assert!(!reader.next_group()?);
        assert!(reader.get_group().is_err());
        Ok(())
    }

    #[test]
    fn partition_assignment_is_stable_and_in_range() {
        for n in [1usize, 3, 8] {
            for key in [&b""[..], b"a", b"some longer key"] {
                let p = partition_of(key, n);
                assert!(p < n);
                assert_eq!(p, partition_of(key, n));
            }
        }
    }

    #[test]
    fn committed_runs_share_one_memory_budget() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let threshold = 512;
        let channel = channel(
            StoreConfig {
                initial_capacity: 32,
                strategy: BufferStrategy::Spill {
                    threshold,
                    directory: dir.path().to_path_buf(),
                },
            },
            2,
        );
        for task in 0..100u32 {
            let mut sink = channel.open_sink(task as usize)?;
            for i in 0..4u32 {
                sink.put(&(i, i64::from(task), task))?;
            }
            sink.commit()?;
        }
        channel.freeze()?;

        let stats = channel.stats();
        assert_eq!(stats.records, 400);
        assert!(stats.spilled_bytes > 0);
        assert!(stats.bytes - stats.spilled_bytes <= threshold as u64, "{stats:?}");

        let mut seen = 0;
        for task in 0..2 {
            for (_, rows) in groups(&channel, task, 2)? {
                // descending by the comparator field
                assert!(rows.windows(2).all(|w| w[0].1 >= w[1].1));
                seen += rows.len();
            }
        }
        assert_eq!(seen, 400);
        Ok(())
    }
}
