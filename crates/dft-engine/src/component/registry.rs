//! Component registries, one per kind.
//!
//! Lookup is exact on the snake-case tag. Built-ins are registered by
//! [`ComponentRegistry::with_builtins`]; user components are added through
//! the `register_*` methods before the orchestrator is constructed.

use std::collections::BTreeMap;

use dft_types::StepKind;

use super::builtins;
use super::{ComponentSpec, Endpoint, Processor, Source};

pub type SourceCtor = Box<dyn Fn(&ComponentSpec) -> anyhow::Result<Box<dyn Source>> + Send + Sync>;
pub type ProcessorCtor =
    Box<dyn Fn(&ComponentSpec) -> anyhow::Result<Box<dyn Processor>> + Send + Sync>;
pub type EndpointCtor =
    Box<dyn Fn(&ComponentSpec) -> anyhow::Result<Box<dyn Endpoint>> + Send + Sync>;

/// Three tag-keyed registries of component constructors.
#[derive(Default)]
pub struct ComponentRegistry {
    sources: BTreeMap<String, SourceCtor>,
    processors: BTreeMap<String, ProcessorCtor>,
    endpoints: BTreeMap<String, EndpointCtor>,
}

impl ComponentRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in component set.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register(&mut registry);
        registry
    }

    pub fn register_source<F>(&mut self, tag: impl Into<String>, ctor: F)
    where
        F: Fn(&ComponentSpec) -> anyhow::Result<Box<dyn Source>> + Send + Sync + 'static,
    {
        self.sources.insert(tag.into(), Box::new(ctor));
    }

    pub fn register_processor<F>(&mut self, tag: impl Into<String>, ctor: F)
    where
        F: Fn(&ComponentSpec) -> anyhow::Result<Box<dyn Processor>> + Send + Sync + 'static,
    {
        self.processors.insert(tag.into(), Box::new(ctor));
    }

    pub fn register_endpoint<F>(&mut self, tag: impl Into<String>, ctor: F)
    where
        F: Fn(&ComponentSpec) -> anyhow::Result<Box<dyn Endpoint>> + Send + Sync + 'static,
    {
        self.endpoints.insert(tag.into(), Box::new(ctor));
    }

    /// Whether a tag is registered for the given kind.
    #[must_use]
    pub fn contains(&self, kind: StepKind, tag: &str) -> bool {
        match kind {
            StepKind::Source => self.sources.contains_key(tag),
            StepKind::Processor => self.processors.contains_key(tag),
            StepKind::Endpoint => self.endpoints.contains_key(tag),
        }
    }

    pub(crate) fn source(&self, tag: &str) -> Option<&SourceCtor> {
        self.sources.get(tag)
    }

    pub(crate) fn processor(&self, tag: &str) -> Option<&ProcessorCtor> {
        self.processors.get(tag)
    }

    pub(crate) fn endpoint(&self, tag: &str) -> Option<&EndpointCtor> {
        self.endpoints.get(tag)
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("processors", &self.processors.keys().collect::<Vec<_>>())
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_registered() {
        let registry = ComponentRegistry::with_builtins();
        assert!(registry.contains(StepKind::Source, "csv"));
        assert!(registry.contains(StepKind::Processor, "validator"));
        assert!(registry.contains(StepKind::Endpoint, "csv"));
    }

    #[test]
    fn test_lookup_is_exact_and_per_kind() {
        let registry = ComponentRegistry::with_builtins();
        assert!(!registry.contains(StepKind::Source, "Csv"));
        assert!(!registry.contains(StepKind::Source, "validator"));
        assert!(!registry.contains(StepKind::Processor, "csv"));
    }

    #[test]
    fn test_user_registration() {
        let mut registry = ComponentRegistry::new();
        assert!(!registry.contains(StepKind::Source, "my_custom_source"));
        registry.register_source("my_custom_source", |_spec| {
            anyhow::bail!("constructed in test only")
        });
        assert!(registry.contains(StepKind::Source, "my_custom_source"));
    }
}
