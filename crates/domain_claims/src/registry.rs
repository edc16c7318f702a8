//! Decision engine registry
//!
//! Engines are registered under a name at process start and one is bound
//! per deployment from configuration:
//!
//! ```rust,ignore
//! let registry = EngineRegistry::with_defaults()
//!     .register("workshop_v2", |settings| Ok(Arc::new(WorkshopEngine::from_settings(settings)?)));
//! let engine = registry.build(&config.decision.engine, &config.decision.settings)?;
//! ```
//!
//! There is no global lookup: the registry is built, used to resolve the
//! configured engine and then passed along or dropped.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::{DecisionEngine, ReferenceDecisionEngine};
use crate::error::DecisionError;

/// Builds an engine from its settings block
pub type EngineFactory =
    Arc<dyn Fn(&Value) -> Result<Arc<dyn DecisionEngine>, DecisionError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct EngineRegistry {
    factories: BTreeMap<String, EngineFactory>,
}

impl EngineRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in reference engine
    pub fn with_defaults() -> Self {
        Self::new().register(ReferenceDecisionEngine::NAME, |settings| {
            Ok(Arc::new(ReferenceDecisionEngine::from_settings(settings)?))
        })
    }

    /// Registers a factory, replacing any previous one with the same name
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Value) -> Result<Arc<dyn DecisionEngine>, DecisionError> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            tracing::warn!(engine = %name, "Replacing registered decision engine");
        }
        self.factories.insert(name, Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Resolves and builds the named engine
    pub fn build(&self, name: &str, settings: &Value) -> Result<Arc<dyn DecisionEngine>, DecisionError> {
        let factory = self.factories.get(name).ok_or_else(|| DecisionError::UnknownEngine {
            name: name.to_string(),
            available: self.names().join(", "),
        })?;
        let engine = factory(settings)?;
        let identity = engine.identity();
        tracing::info!(
            engine = %identity.name,
            engine_version = %identity.version,
            "Decision engine bound"
        );
        Ok(engine)
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dossier::EngineIdentity;
    use crate::engine::{DecisionInput, EngineDecision};
    use serde_json::json;

    #[derive(Debug)]
    struct AlwaysRefer;

    impl DecisionEngine for AlwaysRefer {
        fn identity(&self) -> EngineIdentity {
            EngineIdentity {
                name: "always_refer".to_string(),
                version: "1".to_string(),
            }
        }

        fn decide(&self, _input: &DecisionInput<'_>) -> Result<EngineDecision, DecisionError> {
            Err(DecisionError::invalid_config("not used"))
        }
    }

    #[test]
    fn test_defaults_contain_reference_engine() {
        let registry = EngineRegistry::with_defaults();
        assert!(registry.contains("reference"));

        let engine = registry.build("reference", &Value::Null).unwrap();
        assert_eq!(engine.identity().name, "reference");
    }

    #[test]
    fn test_unknown_engine_lists_available() {
        let registry = EngineRegistry::with_defaults().register("always_refer", |_| Ok(Arc::new(AlwaysRefer)));
        let err = registry.build("missing", &Value::Null).unwrap_err();

        match err {
            DecisionError::UnknownEngine { name, available } => {
                assert_eq!(name, "missing");
                assert_eq!(available, "always_refer, reference");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_factory_errors_propagate() {
        let registry = EngineRegistry::with_defaults();
        let result = registry.build("reference", &json!({ "hard_checks": "not-a-list" }));
        assert!(matches!(result, Err(DecisionError::InvalidConfig(_))));
    }
}
