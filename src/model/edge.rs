use super::descriptor::{DataType, SupplierRef};
use crate::error::DagError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FormatResult};

/// Sort direction of a [`SortTerm`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One secondary ordering term of a scatter-gather edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortTerm {
    pub property: String,
    pub direction: Direction,
}

impl SortTerm {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Descending,
        }
    }
}

/// Grouping specification of a scatter-gather edge: key properties plus an
/// ordered list of sort terms applied inside each group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Group {
    pub keys: Vec<String>,
    pub ordering: Vec<SortTerm>,
}

impl Group {
    pub fn new(keys: Vec<String>, ordering: Vec<SortTerm>) -> Self {
        Self { keys, ordering }
    }

    /// Parse the compact planner notation: `=name` is a grouping key,
    /// `+name` an ascending term and `-name` a descending term.
    ///
    /// ```
    /// use dagflow::model::{Group, SortTerm};
    ///
    /// let g = Group::parse(&["=shop", "-amount", "+id"]).unwrap();
    /// assert_eq!(g.keys, vec!["shop".to_string()]);
    /// assert_eq!(g.ordering, vec![SortTerm::desc("amount"), SortTerm::asc("id")]);
    /// ```
    ///
    /// # Errors
    /// Configuration error on an unknown prefix or an empty property name.
    pub fn parse(terms: &[&str]) -> Result<Self> {
        let mut group = Self::default();
        for term in terms {
            let term = term.trim();
            let mut chars = term.chars();
            let prefix = chars.next();
            let name = chars.as_str().trim();
            if name.is_empty() {
                return Err(DagError::config(format!("invalid group term '{term}'")));
            }
            match prefix {
                Some('=') => group.keys.push(name.to_string()),
                Some('+') => group.ordering.push(SortTerm::asc(name)),
                Some('-') => group.ordering.push(SortTerm::desc(name)),
                _ => return Err(DagError::config(format!("invalid group term '{term}'"))),
            }
        }
        Ok(group)
    }
}

/// Movement policy of an edge. See [`EdgeDescriptor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Nothing,
    OneToOne,
    Broadcast,
    ScatterGather,
}

impl Display for EdgeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(match self {
            Self::Nothing => "NOTHING",
            Self::OneToOne => "ONE_TO_ONE",
            Self::Broadcast => "BROADCAST",
            Self::ScatterGather => "SCATTER_GATHER",
        })
    }
}

/// How data moves between two vertices.
///
/// Descriptors only *name* serializers and comparators; the implementations
/// are resolved through the [`Registry`](crate::registry::Registry) when the
/// graph is executed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDescriptor {
    /// Ordering dependency only; no records flow.
    Nothing,
    /// Producer task `i` feeds consumer task `i`.
    OneToOne {
        data_type: DataType,
        serde: SupplierRef,
    },
    /// Every consumer task sees every record.
    Broadcast {
        data_type: DataType,
        serde: SupplierRef,
    },
    /// Records are partitioned by key and grouped on the consumer side.
    /// Without a comparator groups keep encounter order.
    ScatterGather {
        data_type: DataType,
        serde: SupplierRef,
        comparator: Option<SupplierRef>,
    },
}

/// Resolves serializer and comparator references for a data type.
///
/// This is the seam to code generation: given a type (and a grouping), the
/// provider returns the names of implementations registered for it.
pub trait SerDeProvider {
    fn value_serde(&self, data_type: &DataType) -> Result<SupplierRef>;
    fn key_value_serde(&self, data_type: &DataType, group: &Group) -> Result<SupplierRef>;
    fn comparator(&self, data_type: &DataType, group: &Group) -> Result<SupplierRef>;
}

impl EdgeDescriptor {
    #[must_use]
    pub fn nothing() -> Self {
        Self::Nothing
    }

    #[must_use]
    pub fn one_to_one(data_type: DataType, serde: SupplierRef) -> Self {
        Self::OneToOne { data_type, serde }
    }

    #[must_use]
    pub fn broadcast(data_type: DataType, serde: SupplierRef) -> Self {
        Self::Broadcast { data_type, serde }
    }

    #[must_use]
    pub fn scatter_gather(
        data_type: DataType,
        serde: SupplierRef,
        comparator: Option<SupplierRef>,
    ) -> Self {
        Self::ScatterGather {
            data_type,
            serde,
            comparator,
        }
    }

    /// One-to-one edge whose serializer comes from `provider`.
    ///
    /// # Errors
    /// Propagates provider failures.
    pub fn one_to_one_for(provider: &dyn SerDeProvider, data_type: DataType) -> Result<Self> {
        let serde = provider.value_serde(&data_type)?;
        Ok(Self::one_to_one(data_type, serde))
    }

    /// Broadcast edge whose serializer comes from `provider`.
    ///
    /// # Errors
    /// Propagates provider failures.
    pub fn broadcast_for(provider: &dyn SerDeProvider, data_type: DataType) -> Result<Self> {
        let serde = provider.value_serde(&data_type)?;
        Ok(Self::broadcast(data_type, serde))
    }

    /// Scatter-gather edge derived from a grouping specification. A
    /// comparator is requested only when `group` has ordering terms.
    ///
    /// # Errors
    /// Propagates provider failures.
    pub fn scatter_gather_for(
        provider: &dyn SerDeProvider,
        data_type: DataType,
        group: &Group,
    ) -> Result<Self> {
        let serde = provider.key_value_serde(&data_type, group)?;
        let comparator = if group.ordering.is_empty() {
            None
        } else {
            Some(provider.comparator(&data_type, group)?)
        };
        Ok(Self::scatter_gather(data_type, serde, comparator))
    }

    #[must_use]
    pub fn kind(&self) -> EdgeKind {
        match self {
            Self::Nothing => EdgeKind::Nothing,
            Self::OneToOne { .. } => EdgeKind::OneToOne,
            Self::Broadcast { .. } => EdgeKind::Broadcast,
            Self::ScatterGather { .. } => EdgeKind::ScatterGather,
        }
    }

    #[must_use]
    pub fn data_type(&self) -> Option<&DataType> {
        match self {
            Self::Nothing => None,
            Self::OneToOne { data_type, .. }
            | Self::Broadcast { data_type, .. }
            | Self::ScatterGather { data_type, .. } => Some(data_type),
        }
    }
}
