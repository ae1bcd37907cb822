//! Name-to-implementation registry.
//!
//! Graph descriptors only carry [`SupplierRef`] names. Before execution the
//! runner resolves every name through a `Registry` populated by the
//! application at startup, which keeps planning output late-bound without
//! any reflection.
//!
//! ```
//! use dagflow::codec::typed::SerdeValueCodec;
//! use dagflow::registry::Registry;
//! use dagflow::testing::CollectSink;
//!
//! let sink = CollectSink::<String>::new();
//! let mut registry = Registry::new();
//! registry.register_value_serde("line", SerdeValueCodec::<String>::new());
//! registry.register_processor("sink", sink.factory());
//! assert!(registry.contains_processor("sink"));
//! ```

use crate::codec::{DataComparator, KeyValueSerDe, ValueSerDe};
use crate::error::DagError;
use crate::model::SupplierRef;
use crate::processor::VertexProcessor;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory that builds one vertex processor instance per execution.
pub type ProcessorFactory = Arc<dyn Fn() -> Result<Box<dyn VertexProcessor>> + Send + Sync>;

/// Registered processors, serializers and comparators.
#[derive(Clone, Default)]
pub struct Registry {
    processors: HashMap<String, ProcessorFactory>,
    value_serdes: HashMap<String, Arc<dyn ValueSerDe>>,
    key_value_serdes: HashMap<String, Arc<dyn KeyValueSerDe>>,
    comparators: HashMap<String, Arc<dyn DataComparator>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor factory. A later registration under the same
    /// name replaces the earlier one.
    pub fn register_processor<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Box<dyn VertexProcessor>> + Send + Sync + 'static,
    {
        self.processors.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_value_serde(
        &mut self,
        name: impl Into<String>,
        serde: impl ValueSerDe + 'static,
    ) -> &mut Self {
        self.value_serdes.insert(name.into(), Arc::new(serde));
        self
    }

    pub fn register_key_value_serde(
        &mut self,
        name: impl Into<String>,
        serde: impl KeyValueSerDe + 'static,
    ) -> &mut Self {
        self.key_value_serdes.insert(name.into(), Arc::new(serde));
        self
    }

    pub fn register_comparator(
        &mut self,
        name: impl Into<String>,
        comparator: impl DataComparator + 'static,
    ) -> &mut Self {
        self.comparators.insert(name.into(), Arc::new(comparator));
        self
    }

    #[must_use]
    pub fn contains_processor(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// Instantiate the processor registered under `reference`.
    ///
    /// # Errors
    /// Configuration error if nothing is registered under that name;
    /// otherwise whatever the factory returns.
    pub fn new_processor(&self, reference: &SupplierRef) -> Result<Box<dyn VertexProcessor>> {
        let factory = self
            .processors
            .get(reference.name())
            .ok_or_else(|| DagError::config(format!("no processor registered as '{reference}'")))?;
        factory()
    }

    /// # Errors
    /// Configuration error if nothing is registered under that name.
    pub fn value_serde(&self, reference: &SupplierRef) -> Result<Arc<dyn ValueSerDe>> {
        self.value_serdes
            .get(reference.name())
            .cloned()
            .ok_or_else(|| DagError::config(format!("no value serializer registered as '{reference}'")))
    }

    /// # Errors
    /// Configuration error if nothing is registered under that name.
    pub fn key_value_serde(&self, reference: &SupplierRef) -> Result<Arc<dyn KeyValueSerDe>> {
        self.key_value_serdes.get(reference.name()).cloned().ok_or_else(|| {
            DagError::config(format!("no key-value serializer registered as '{reference}'"))
        })
    }

    /// # Errors
    /// Configuration error if nothing is registered under that name.
    pub fn comparator(&self, reference: &SupplierRef) -> Result<Arc<dyn DataComparator>> {
        self.comparators
            .get(reference.name())
            .cloned()
            .ok_or_else(|| DagError::config(format!("no comparator registered as '{reference}'")))
    }
}
