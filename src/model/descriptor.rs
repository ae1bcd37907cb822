use crate::error::DagError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FormatResult};

fn checked_name(kind: &str, name: impl Into<String>) -> Result<String> {
    let name = name.into();
    if name.trim().is_empty() {
        return Err(DagError::config(format!("{kind} must not be blank")));
    }
    Ok(name)
}

/// Stable name of an implementation registered in the
/// [`Registry`](crate::registry::Registry): a vertex processor factory, a
/// serializer or a comparator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SupplierRef(String);

impl SupplierRef {
    /// # Errors
    /// Configuration error if `name` is blank.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        checked_name("supplier reference", name).map(Self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for SupplierRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(&self.0)
    }
}

/// Name of the logical data type carried by an edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType(String);

impl DataType {
    /// # Errors
    /// Configuration error if `name` is blank.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        checked_name("data type", name).map(Self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(&self.0)
    }
}

/// Identifies the processor a vertex runs. Resolved once per execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexDescriptor {
    processor: SupplierRef,
}

impl VertexDescriptor {
    #[must_use]
    pub fn new(processor: SupplierRef) -> Self {
        Self { processor }
    }

    /// Shorthand for `VertexDescriptor::new(SupplierRef::new(name)?)`.
    ///
    /// # Errors
    /// Configuration error if `name` is blank.
    pub fn of(name: impl Into<String>) -> Result<Self> {
        SupplierRef::new(name).map(Self::new)
    }

    #[must_use]
    pub fn processor(&self) -> &SupplierRef {
        &self.processor
    }
}
