// crates/tracehub-providers/src/registry.rs
// ============================================================================
// Module: Judge Registry
// Description: A name-keyed map of judge providers.
// Purpose: Let the decision pipeline look up "heuristic" and "llm" (or any
//          future provider) by name without depending on concrete types.
// Dependencies: std::collections::BTreeMap, tracehub_core::judge
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracehub_core::judge::JudgeProvider;

/// Raised when a provider name has no registered implementation.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No provider is registered under this name.
    #[error("unknown judge provider: {0}")]
    UnknownProvider(String),
}

/// A name-keyed registry of judge providers.
#[derive(Default, Clone)]
pub struct JudgeRegistry {
    providers: BTreeMap<&'static str, Arc<dyn JudgeProvider>>,
}

impl JudgeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its own [`JudgeProvider::name`].
    pub fn register(&mut self, provider: Arc<dyn JudgeProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    /// Looks up a provider by name.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownProvider`] if no provider is
    /// registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn JudgeProvider>, RegistryError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProvider(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::JudgeRegistry;
    use crate::heuristic::HeuristicJudge;
    use std::sync::Arc;

    #[test]
    fn registers_and_resolves_by_name() {
        let mut registry = JudgeRegistry::new();
        registry.register(Arc::new(HeuristicJudge));
        assert!(registry.get("heuristic").is_ok());
        assert!(registry.get("missing").is_err());
    }
}
