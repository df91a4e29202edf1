//! The plugin registries a pipeline resolves its configuration against.

use slmforge_connectors::Connector;
use slmforge_processing::TaskBuilder;
use slmforge_shared::{PluginKind, Registry};

/// One registry per plugin family.
///
/// Built once at start-up and shared (behind an `Arc`) by every pipeline run.
#[derive(Debug)]
pub struct PluginRegistry {
    pub connectors: Registry<dyn Connector>,
    pub task_builders: Registry<dyn TaskBuilder>,
}

impl PluginRegistry {
    /// Empty registries.
    pub fn new() -> Self {
        Self {
            connectors: Registry::new(PluginKind::Connector),
            task_builders: Registry::new(PluginKind::TaskBuilder),
        }
    }

    /// Registries pre-populated with every built-in connector and task builder.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        slmforge_connectors::register_builtin(&registry.connectors);
        slmforge_processing::register_builtin(&registry.task_builders);
        registry
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_both_families() {
        let registry = PluginRegistry::with_builtins();
        assert_eq!(registry.connectors.names(), vec!["database", "documents", "server"]);
        assert_eq!(registry.task_builders.names(), vec!["continuation", "summarization"]);
    }

    #[test]
    fn new_is_empty() {
        let registry = PluginRegistry::new();
        assert!(registry.connectors.names().is_empty());
        assert!(!registry.task_builders.contains("summarization"));
    }
}
