//! Name → pipeline constructor map.

use super::implementation::ImplementationPipeline;
use super::review::ReviewPipeline;
use super::{Pipeline, PipelineMetadata};
use crate::domain::{OrchestratorError, OrchestratorResult};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub type PipelineConstructor = fn() -> Box<dyn Pipeline>;

/// Registered pipelines, keyed by name.
///
/// Every lookup builds a fresh pipeline instance, so workflows never share
/// pipeline objects.
#[derive(Clone, Default)]
pub struct PipelineRegistry {
    constructors: BTreeMap<&'static str, PipelineConstructor>,
}

impl PipelineRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the `implementation` and `review` pipelines.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(ImplementationPipeline::NAME, || Box::new(ImplementationPipeline));
        registry.register(ReviewPipeline::NAME, || Box::new(ReviewPipeline));
        registry
    }

    /// Adds or replaces a pipeline constructor.
    pub fn register(&mut self, name: &'static str, constructor: PipelineConstructor) {
        self.constructors.insert(name, constructor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn get_pipeline(&self, name: &str) -> OrchestratorResult<Box<dyn Pipeline>> {
        self.constructors
            .get(name)
            .map(|construct| construct())
            .ok_or_else(|| {
                OrchestratorError::Configuration(format!(
                    "unknown pipeline '{}' (available: {})",
                    name,
                    self.names().join(", ")
                ))
            })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }

    pub fn list(&self) -> Vec<PipelineMetadata> {
        self.constructors
            .values()
            .map(|construct| construct().metadata())
            .collect()
    }
}

/// The built-in registry, initialised on first use.
pub fn builtin_registry() -> &'static PipelineRegistry {
    static REGISTRY: OnceLock<PipelineRegistry> = OnceLock::new();
    REGISTRY.get_or_init(PipelineRegistry::with_builtin)
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
