use super::one_to_one::ValueStore;
use super::store::StoreConfig;
use super::{ChannelStats, EdgeChannel, RecordSink};
use crate::codec::ValueSerDe;
use crate::model::EdgeKind;
use crate::processor::ObjectReader;
use anyhow::Result;
use std::sync::Arc;

/// Every consumer task reads the whole frozen data set through its own cursor.
pub(crate) struct BroadcastChannel {
    store: Arc<ValueStore>,
}

impl BroadcastChannel {
    pub fn new(label: String, serde: Arc<dyn ValueSerDe>, config: Arc<StoreConfig>) -> Self {
        Self {
            store: ValueStore::new(label, serde, config),
        }
    }
}

impl EdgeChannel for BroadcastChannel {
    fn label(&self) -> &str {
        self.store.core.label()
    }

    fn kind(&self) -> EdgeKind {
        EdgeKind::Broadcast
    }

    fn open_sink(&self, task_index: usize) -> Result<Box<dyn RecordSink>> {
        self.store.open_sink(task_index)
    }

    fn freeze(&self) -> Result<()> {
        self.store.core.freeze()
    }

    fn open_reader(&self, _task_index: usize, _task_count: usize) -> Result<Box<dyn ObjectReader>> {
        self.store.reader(|_| true)
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

    #[test]
    fn concurrent_readers_see_identical_spilled_sequence() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = StoreConfig {
            initial_capacity: 16,
            strategy: BufferStrategy::Spill {
                threshold: 128,
                directory: dir.path().to_path_buf(),
            },
        };
        let channel = Arc::new(BroadcastChannel::new(
            "dim -> join".into(),
            Arc::new(SerdeValueCodec::<String>::new()),
            Arc::new(config),
        ));
        let mut sink = channel.open_sink(0)?;
        for i in 0..200 {
            sink.put(&format!("row-{i}"))?;
        }
        sink.commit()?;
        channel.freeze()?;
        assert!(channel.stats().spilled_bytes > 0);

        let handles: Vec<_> = (0..4)
            .map(|task| {
                let channel = Arc::clone(&channel);
                std::thread::spawn(move || -> Result<Vec<String>> {
                    let mut reader = channel.open_reader(task, 4)?;
                    let mut out = Vec::new();
                    while reader.next_object()? {
                        out.push(reader.object::<String>()?.clone());
                    }
                    Ok(out)
                })
            })
            .collect();
        let expected: Vec<String> = (0..200).map(|i| format!("row-{i}")).collect();
        for handle in handles {
            let rows = handle.join().map_err(|_| anyhow::anyhow!("reader panicked"))??;
            assert_eq!(rows, expected);
        }

        channel.release();
        drop(channel);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }
}
