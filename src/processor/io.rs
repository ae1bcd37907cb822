use crate::codec::downcast_object;
use crate::edge::RecordSink;
use crate::error::DagError;
use anyhow::Result;
use std::any::Any;
use std::sync::{Arc, Mutex};

/// Sequential cursor over the records of one input.
///
/// `get_object` is only valid after `next_object` returned `true`.
pub trait ObjectReader: Send {
    /// Advance to the next record; `false` once the input is exhausted.
    fn next_object(&mut self) -> Result<bool>;

    /// The current record.
    fn get_object(&self) -> Result<&(dyn Any + Send + Sync)>;
}

impl dyn ObjectReader {
    /// The current record downcast to `T`.
    ///
    /// # Errors
    /// Illegal state without a current record, contract error on a type mismatch.
    pub fn object<T: Any>(&self) -> Result<&T> {
        downcast_object(as_any(self.get_object()?))
    }
}

/// Cursor over a key-grouped scatter-gather input.
///
/// Groups arrive in key order. Within a group, records arrive in the order
/// declared for the edge, ties in the order they were written.
pub trait GroupReader: Send {
    /// Advance to the next distinct key, skipping what is left of the current group.
    fn next_group(&mut self) -> Result<bool>;

    /// Key object of the current group.
    fn get_group(&self) -> Result<&(dyn Any + Send + Sync)>;

    /// Advance within the current group.
    fn next_object(&mut self) -> Result<bool>;

    /// The current record of the current group.
    fn get_object(&self) -> Result<&(dyn Any + Send + Sync)>;
}

impl dyn GroupReader {
    /// # Errors
    /// Illegal state without a current group, contract error on a type mismatch.
    pub fn group<T: Any>(&self) -> Result<&T> {
        downcast_object(as_any(self.get_group()?))
    }

    /// # Errors
    /// Illegal state without a current record, contract error on a type mismatch.
    pub fn object<T: Any>(&self) -> Result<&T> {
        downcast_object(as_any(self.get_object()?))
    }
}

fn as_any(object: &(dyn Any + Send + Sync)) -> &dyn Any {
    object
}

/// Destination for records of one output port.
pub trait ObjectWriter {
    fn put_object(&mut self, object: &dyn Any) -> Result<()>;
}

/// Writer for one output port of one task.
///
/// Records are serialized into every edge attached to the port. Clones share
/// the same underlying sinks. The runtime commits the sinks when the task
/// returns successfully and discards them otherwise; writing afterwards is
/// an illegal-state error.
#[derive(Clone)]
pub struct OutputWriter {
    port: Arc<str>,
    sinks: Arc<Mutex<Option<Vec<Box<dyn RecordSink>>>>>,
}

impl OutputWriter {
    pub(crate) fn new(port: &str, sinks: Vec<Box<dyn RecordSink>>) -> Self {
        Self {
            port: Arc::from(port),
            sinks: Arc::new(Mutex::new(Some(sinks))),
        }
    }

    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Write one record to every edge of the port.
    ///
    /// # Errors
    /// Serialization or spill failures; illegal state after the task ended.
    pub fn put<T: Any>(&self, object: &T) -> Result<()> {
        self.put_dyn(object)
    }

    fn put_dyn(&self, object: &dyn Any) -> Result<()> {
        let mut guard = self
            .sinks
            .lock()
            .map_err(|_| DagError::illegal_state(format!("output '{}' is poisoned", self.port)))?;
        let sinks = guard.as_mut().ok_or_else(|| {
            DagError::illegal_state(format!("output '{}' is already closed", self.port))
        })?;
        for sink in sinks.iter_mut() {
            sink.put(object)?;
        }
        Ok(())
    }

    /// Hand the buffered records to their channels.
    pub(crate) fn commit(&self) -> Result<()> {
        for sink in self.take()? {
            sink.commit()?;
        }
        Ok(())
    }

    /// Drop buffered records (and any spill files) of a failed task.
    pub(crate) fn discard(&self) {
        if let Ok(mut guard) = self.sinks.lock() {
            guard.take();
        }
    }

    fn take(&self) -> Result<Vec<Box<dyn RecordSink>>> {
        self.sinks
            .lock()
            .map_err(|_| DagError::illegal_state(format!("output '{}' is poisoned", self.port)))?
            .take()
            .ok_or_else(|| DagError::illegal_state(format!("output '{}' is already closed", self.port)))
    }
}

impl ObjectWriter for OutputWriter {
    fn put_object(&mut self, object: &dyn Any) -> Result<()> {
        self.put_dyn(object)
    }
}
