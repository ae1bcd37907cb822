use super::current;
use super::store::{Fragment, FragmentCursor};
use crate::buffer::DataBuffer;
use crate::codec::{DataComparator, KeyValueSerDe, Record};
use crate::error::DagError;
use crate::processor::{GroupReader, ObjectReader};
use anyhow::{Context, Result};
use std::any::Any;
use std::cmp::Ordering;
use std::sync::Arc;

/// A sorted run of one producer task for one partition.
#[derive(Clone)]
pub(super) struct Run {
    origin: (usize, usize),
    fragment: Arc<Fragment>,
}

impl Run {
    /// `origin` is `(producer task, run sequence within the task)`.
    pub fn new(origin: (usize, usize), fragment: Arc<Fragment>) -> Self {
        Self { origin, fragment }
    }

    pub fn origin(&self) -> (usize, usize) {
        self.origin
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }
}

/// Order of two encoded records: key bytes first, then the comparator over
/// the value bytes. Without a comparator records with equal keys tie.
pub(super) fn compare_records(
    comparator: Option<&dyn DataComparator>,
    (a_key, a_value): (&[u8], &[u8]),
    (b_key, b_value): (&[u8], &[u8]),
) -> Result<Ordering> {
    match a_key.cmp(b_key) {
        Ordering::Equal => comparator.map_or(Ok(Ordering::Equal), |c| c.compare(a_value, b_value)),
        other => Ok(other),
    }
}

struct Head {
    cursor: FragmentCursor,
    key: DataBuffer,
    value: DataBuffer,
    live: bool,
}

/// K-way merge over sorted runs.
///
/// Selection is a linear scan so comparator errors propagate; among equal
/// records the run that comes first wins.
pub(super) struct MergeCursor {
    label: String,
    heads: Vec<Head>,
    comparator: Option<Arc<dyn DataComparator>>,
    emitted: bool,
}

impl MergeCursor {
    pub fn open(label: String, runs: Vec<Run>, comparator: Option<Arc<dyn DataComparator>>) -> Result<Self> {
        let mut heads = Vec::with_capacity(runs.len());
        for run in runs {
            let mut head = Head {
                cursor: FragmentCursor::new(run.fragment),
                key: DataBuffer::new(),
                value: DataBuffer::new(),
                live: false,
            };
            head.live = head.cursor.next(&mut head.key, &mut head.value)?;
            heads.push(head);
        }
        Ok(Self {
            label,
            heads,
            comparator,
            emitted: false,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn compare(&self, a_key: &[u8], a_value: &[u8], b_key: &[u8], b_value: &[u8]) -> Result<Ordering> {
        compare_records(self.comparator.as_deref(), (a_key, a_value), (b_key, b_value))
            .with_context(|| format!("compare records on {}", self.label))
    }

    /// Move the smallest pending record into `key` and `value`.
    ///
    /// The buffers must still hold the previously returned record; it is
    /// used to verify that output never goes backwards, which catches
    /// comparators that disagree with themselves.
    pub fn next(&mut self, key: &mut DataBuffer, value: &mut DataBuffer) -> Result<bool> {
        let mut best: Option<usize> = None;
        for i in 0..self.heads.len() {
            if !self.heads[i].live {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let (x, y) = (&self.heads[i], &self.heads[b]);
                    if self.compare(x.key.as_slice(), x.value.as_slice(), y.key.as_slice(), y.value.as_slice())?
                        == Ordering::Less
                    {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        let Some(b) = best else {
            return Ok(false);
        };

        if self.emitted {
            let head = &self.heads[b];
            let order = self.compare(head.key.as_slice(), head.value.as_slice(), key.as_slice(), value.as_slice())?;
            if order == Ordering::Less {
                return Err(DagError::contract(format!(
                    "records on {} are out of order; the comparator is inconsistent with the key encoding",
                    self.label
                )));
            }
        }

        let head = &mut self.heads[b];
        std::mem::swap(key, &mut head.key);
        std::mem::swap(value, &mut head.value);
        head.live = head.cursor.next(&mut head.key, &mut head.value)?;
        self.emitted = true;
        Ok(true)
    }
}

/// Flat record view of a scatter-gather partition.
pub(super) struct MergedObjectReader {
    merge: MergeCursor,
    serde: Arc<dyn KeyValueSerDe>,
    key: DataBuffer,
    value: DataBuffer,
    current: Option<Record>,
}

impl MergedObjectReader {
    pub fn new(merge: MergeCursor, serde: Arc<dyn KeyValueSerDe>) -> Self {
        Self {
            merge,
            serde,
            key: DataBuffer::new(),
            value: DataBuffer::new(),
            current: None,
        }
    }
}

impl ObjectReader for MergedObjectReader {
    fn next_object(&mut self) -> Result<bool> {
        self.current = None;
        if !self.merge.next(&mut self.key, &mut self.value)? {
            return Ok(false);
        }
        let record = self
            .serde
            .deserialize_pair(&mut self.key, &mut self.value)
            .with_context(|| format!("deserialize record from {}", self.merge.label()))?;
        self.current = Some(record);
        Ok(true)
    }

    fn get_object(&self) -> Result<&(dyn Any + Send + Sync)> {
        current(&self.current, self.merge.label())
    }
}

/// Group view of a scatter-gather partition, one group per distinct key.
///
/// Keeps one record of lookahead so group boundaries are detected without
/// consuming the first record of the next group.
pub(super) struct MergedGroupReader {
    merge: MergeCursor,
    serde: Arc<dyn KeyValueSerDe>,
    key: DataBuffer,
    value: DataBuffer,
    pending: bool,
    primed: bool,
    group_key: Vec<u8>,
    in_group: bool,
    group: Option<Record>,
    object: Option<Record>,
}

impl MergedGroupReader {
    pub fn new(merge: MergeCursor, serde: Arc<dyn KeyValueSerDe>) -> Self {
        Self {
            merge,
            serde,
            key: DataBuffer::new(),
            value: DataBuffer::new(),
            pending: false,
            primed: false,
            group_key: Vec::new(),
            in_group: false,
            group: None,
            object: None,
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.pending = self.merge.next(&mut self.key, &mut self.value)?;
        Ok(())
    }

    fn pending_in_group(&self) -> bool {
        self.pending && self.key.as_slice() == self.group_key.as_slice()
    }
}

impl GroupReader for MergedGroupReader {
    fn next_group(&mut self) -> Result<bool> {
        if !self.primed {
            self.primed = true;
            self.advance()?;
        }
        if self.in_group {
            while self.pending_in_group() {
                self.advance()?;
            }
        }
        self.object = None;
        self.group = None;
        self.in_group = false;
        if !self.pending {
            return Ok(false);
        }
        self.group_key.clear();
        self.group_key.extend_from_slice(self.key.as_slice());
        self.key.seek(0);
        let group = self
            .serde
            .deserialize_key(&mut self.key)
            .with_context(|| format!("deserialize group key from {}", self.merge.label()))?;
        self.group = Some(group);
        self.in_group = true;
        Ok(true)
    }

    fn get_group(&self) -> Result<&(dyn Any + Send + Sync)> {
        self.group.as_deref().ok_or_else(|| {
            DagError::illegal_state(format!(
                "no current group on {}; call next_group first",
                self.merge.label()
            ))
        })
    }

    fn next_object(&mut self) -> Result<bool> {
        if !self.in_group {
            return Err(DagError::illegal_state(format!(
                "no current group on {}; call next_group first",
                self.merge.label()
            )));
        }
        if !self.pending_in_group() {
            self.object = None;
            return Ok(false);
        }
        self.key.seek(0);
        self.value.seek(0);
        let object = self
            .serde
            .deserialize_pair(&mut self.key, &mut self.value)
            .with_context(|| format!("deserialize record from {}", self.merge.label()))?;
        self.object = Some(object);
        self.advance()?;
        Ok(true)
    }

    fn get_object(&self) -> Result<&(dyn Any + Send + Sync)> {
        current(&self.object, self.merge.label())
    }
}
