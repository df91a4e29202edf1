//! Connector trait and built-in source connectors.
//!
//! This crate provides:
//! - [`Connector`]: the capability every source adapter implements
//! - [`DocumentConnector`]: walks a directory tree of documents
//! - [`DatabaseConnector`]: streams table rows and query results (libSQL/SQLite)
//! - [`ServerConnector`]: fetches pages from remote servers
//! - [`register_builtin`]: binds the built-ins into a connector registry

mod database;
mod documents;
mod extract;
mod server;

use futures::stream::BoxStream;
use slmforge_shared::{RawChunk, Registry, Result};

pub use database::{DatabaseConnector, DatabaseParams};
pub use documents::{DocumentConnector, DocumentParams};
pub use server::{HttpSettings, ServerConnector, ServerParams};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Lazy, finite sequence of resource identifiers.
pub type ResourceStream<'a> = BoxStream<'a, Result<String>>;

/// Lazy, finite sequence of chunks extracted from one resource.
pub type ChunkStream<'a> = BoxStream<'a, Result<RawChunk>>;

/// A pluggable content source.
///
/// Resource identifiers are minted by `list_resources` and interpreted only by
/// the same connector's `load_resource`; callers treat them as opaque.
/// Both streams are one-shot: call the method again to restart.
pub trait Connector: Send + Sync {
    /// Human-readable connector name for tracing.
    fn name(&self) -> &str;

    /// Enumerate resources in source order.
    fn list_resources(&self) -> ResourceStream<'_>;

    /// Extract zero or more chunks for one resource.
    ///
    /// Fails with `UnknownResourceKind` when the id cannot be interpreted, or
    /// `Extraction` when the underlying read fails.
    fn load_resource<'a>(&'a self, resource_id: &'a str) -> ChunkStream<'a>;
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Register every built-in connector under its configuration name.
pub fn register_builtin(registry: &Registry<dyn Connector>) {
    registry.register(DocumentConnector::NAME, |params| {
        Ok(Box::new(DocumentConnector::from_params(params)?) as Box<dyn Connector>)
    });
    registry.register(DatabaseConnector::NAME, |params| {
        Ok(Box::new(DatabaseConnector::from_params(params)?) as Box<dyn Connector>)
    });
    registry.register(ServerConnector::NAME, |params| {
        Ok(Box::new(ServerConnector::from_params(params)?) as Box<dyn Connector>)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use slmforge_shared::{ForgeError, PluginKind};

    #[test]
    fn builtins_are_registered() {
        let registry: Registry<dyn Connector> = Registry::new(PluginKind::Connector);
        register_builtin(&registry);
        assert_eq!(registry.names(), vec!["database", "documents", "server"]);
    }

    #[test]
    fn bad_params_surface_as_construction_errors() {
        let registry: Registry<dyn Connector> = Registry::new(PluginKind::Connector);
        register_builtin(&registry);

        let err = registry
            .create("documents", serde_json::json!({ "include_exts": [".txt"] }))
            .err()
            .expect("root_path is required");
        assert!(matches!(
            err,
            ForgeError::PluginConstruction { kind: PluginKind::Connector, ref name, .. } if name == "documents"
        ));
    }
}
