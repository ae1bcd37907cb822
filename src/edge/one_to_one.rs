use super::store::{Fragment, FragmentCursor, FragmentWriter, StoreConfig};
use super::{ChannelCore, ChannelStats, EdgeChannel, RecordSink, check_consumed, current};
use crate::buffer::DataBuffer;
use crate::codec::{Record, ValueSerDe};
use crate::error::DagError;
use crate::model::EdgeKind;
use crate::processor::ObjectReader;
use anyhow::{Context, Result};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Value fragments keyed by producer task, shared by the one-to-one and
/// broadcast channels.
pub(super) struct ValueStore {
    pub core: ChannelCore,
    serde: Arc<dyn ValueSerDe>,
    config: Arc<StoreConfig>,
    fragments: Mutex<BTreeMap<usize, Vec<Arc<Fragment>>>>,
}

impl ValueStore {
    pub fn new(label: String, serde: Arc<dyn ValueSerDe>, config: Arc<StoreConfig>) -> Arc<Self> {
        Arc::new(Self {
            core: ChannelCore::new(label),
            serde,
            config,
            fragments: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn open_sink(self: &Arc<Self>, task_index: usize) -> Result<Box<dyn RecordSink>> {
        self.core.ensure_writable()?;
        Ok(Box::new(ValueSink {
            writer: FragmentWriter::new(Arc::clone(&self.config)),
            store: Arc::clone(self),
            task_index,
            scratch: DataBuffer::new(),
        }))
    }

    /// Fragments of the producer tasks selected by `select`, in task order.
    pub fn reader(&self, select: impl Fn(usize) -> bool) -> Result<Box<dyn ObjectReader>> {
        self.core.ensure_readable()?;
        let fragments = self
            .lock()?
            .iter()
            .filter(|(task, _)| select(**task))
            .flat_map(|(_, list)| list.iter().cloned())
            .collect();
        Ok(Box::new(ValueReader {
            label: self.core.label().to_string(),
            serde: Arc::clone(&self.serde),
            fragments,
            next_fragment: 0,
            cursor: None,
            key: DataBuffer::new(),
            value: DataBuffer::new(),
            current: None,
        }))
    }

    pub fn release(&self) {
        if self.core.release()
            && let Ok(mut fragments) = self.fragments.lock()
        {
            fragments.clear();
        }
    }

    pub fn stats(&self) -> ChannelStats {
        self.core.stats()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<usize, Vec<Arc<Fragment>>>>> {
        self.fragments
            .lock()
            .map_err(|_| DagError::illegal_state(format!("{} is poisoned", self.core.label())))
    }

    fn publish(&self, task_index: usize, fragment: Fragment) -> Result<()> {
        self.core.ensure_writable()?;
        self.core
            .count(fragment.records(), fragment.bytes(), fragment.spilled_bytes());
        self.lock()?
            .entry(task_index)
            .or_default()
            .push(Arc::new(fragment));
        Ok(())
    }
}

struct ValueSink {
    store: Arc<ValueStore>,
    task_index: usize,
    writer: FragmentWriter,
    scratch: DataBuffer,
}

impl RecordSink for ValueSink {
    fn put(&mut self, object: &dyn Any) -> Result<()> {
        self.scratch.reset();
        self.store
            .serde
            .serialize(object, &mut self.scratch)
            .with_context(|| format!("serialize record for {}", self.store.core.label()))?;
        self.writer.append(&[], self.scratch.as_slice())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let Self {
            store,
            task_index,
            writer,
            ..
        } = *self;
        let limit = store.config.threshold().unwrap_or(usize::MAX) as u64;
        let fragment = writer.finish(|bytes| store.core.try_hold(bytes, limit))?;
        store.publish(task_index, fragment)
    }
}

struct ValueReader {
    label: String,
    serde: Arc<dyn ValueSerDe>,
    fragments: Vec<Arc<Fragment>>,
    next_fragment: usize,
    cursor: Option<FragmentCursor>,
    key: DataBuffer,
    value: DataBuffer,
    current: Option<Record>,
}

impl ObjectReader for ValueReader {
    fn next_object(&mut self) -> Result<bool> {
        loop {
            if self.cursor.is_none() {
                let Some(fragment) = self.fragments.get(self.next_fragment) else {
                    self.current = None;
                    return Ok(false);
                };
                self.next_fragment += 1;
                self.cursor = Some(FragmentCursor::new(Arc::clone(fragment)));
            }
            let Some(cursor) = self.cursor.as_mut() else {
                continue;
            };
            if cursor.next(&mut self.key, &mut self.value)? {
                let record = self
                    .serde
                    .deserialize(&mut self.value)
                    .with_context(|| format!("deserialize record from {}", self.label))?;
                check_consumed(self.value.remaining(), &self.label)?;
                self.current = Some(record);
                return Ok(true);
            }
            self.cursor = None;
        }
    }

    fn get_object(&self) -> Result<&(dyn Any + Send + Sync)> {
        current(&self.current, &self.label)
    }
}

/// Producer task `j` feeds consumer task `j % consumer_tasks`.
pub(crate) struct OneToOneChannel {
    store: Arc<ValueStore>,
}

impl OneToOneChannel {
    pub fn new(label: String, serde: Arc<dyn ValueSerDe>, config: Arc<StoreConfig>) -> Self {
        Self {
            store: ValueStore::new(label, serde, config),
        }
    }
}

impl EdgeChannel for OneToOneChannel {
    fn label(&self) -> &str {
        self.store.core.label()
    }

    fn kind(&self) -> EdgeKind {
        EdgeKind::OneToOne
    }

    fn open_sink(&self, task_index: usize) -> Result<Box<dyn RecordSink>> {
        self.store.open_sink(task_index)
    }

    fn freeze(&self) -> Result<()> {
        self.store.core.freeze()
    }

    fn open_reader(&self, task_index: usize, task_count: usize) -> Result<Box<dyn ObjectReader>> {
        if task_index >= task_count {
            return Err(DagError::illegal_state(format!(
                "task #{task_index} is outside a schedule of {task_count} tasks"
            )));
        }
        self.store.reader(|producer| producer % task_count == task_index)
    }

    fn release(&self) {
        self.store.release();
    }

    fn stats(&self) -> ChannelStats {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::typed::SerdeValueCodec;
    use crate::edge::BufferStrategy;

    fn write(channel: &OneToOneChannel, task: usize, values: &[u32]) -> Result<()> {
        let mut sink = channel.open_sink(task)?;
        for v in values {
            sink.put(v)?;
        }
        sink.commit()
    }

    fn read(channel: &OneToOneChannel, task: usize, count: usize) -> Result<Vec<u32>> {
        let mut reader = channel.open_reader(task, count)?;
        let mut out = Vec::new();
        while reader.next_object()? {
            out.push(*reader.object::<u32>()?);
        }
        Ok(out)
    }

    #[test]
    fn consumer_task_reads_its_paired_producer() -> Result<()> {
        let channel = OneToOneChannel::new(
            "a -> b".into(),
            Arc::new(SerdeValueCodec::<u32>::new()),
            Arc::new(StoreConfig::memory(32)),
        );
        write(&channel, 1, &[10, 11])?;
        write(&channel, 0, &[1, 2, 3])?;
        write(&channel, 2, &[])?;
        channel.freeze()?;

        assert_eq!(read(&channel, 0, 3)?, vec![1, 2, 3]);
        assert_eq!(read(&channel, 1, 3)?, vec![10, 11]);
        assert!(read(&channel, 2, 3)?.is_empty());
        assert_eq!(read(&channel, 0, 1)?, vec![1, 2, 3, 10, 11]);
        Ok(())
    }

    #[test]
    fn reader_rejects_get_without_current_record() -> Result<()> {
        let channel = OneToOneChannel::new(
            "a -> b".into(),
            Arc::new(SerdeValueCodec::<u32>::new()),
            Arc::new(StoreConfig::memory(32)),
        );
        write(&channel, 0, &[7])?;
        channel.freeze()?;
        let mut reader = channel.open_reader(0, 1)?;
        assert!(reader.get_object().is_err());
        assert!(reader.next_object()?);
        assert_eq!(*reader.object::<u32>()?, 7);
        assert!(!reader.next_object()?);
        assert!(reader.get_object().is_err());
        Ok(())
    }

    #[test]
    fn many_small_producers_stay_under_the_channel_threshold() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let threshold = 256;
        let channel = OneToOneChannel::new(
            "a -> b".into(),
            Arc::new(SerdeValueCodec::<u32>::new()),
            Arc::new(StoreConfig {
                initial_capacity: 32,
                strategy: BufferStrategy::Spill {
                    threshold,
                    directory: dir.path().to_path_buf(),
                },
            }),
        );
        // every task stays below the threshold on its own
        for task in 0..200 {
            let values: Vec<u32> = (0..20).map(|i| task as u32 * 100 + i).collect();
            write(&channel, task, &values)?;
        }
        channel.freeze()?;

        let stats = channel.stats();
        assert_eq!(stats.records, 4_000);
        assert!(stats.bytes - stats.spilled_bytes <= threshold as u64, "{stats:?}");
        assert!(channel.store.core.resident_bytes() <= threshold as u64);
        assert_eq!(read(&channel, 7, 200)?, (700..720).collect::<Vec<_>>());
        assert_eq!(read(&channel, 0, 1)?.len(), 4_000);

        channel.release();
        drop(channel);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }
}
