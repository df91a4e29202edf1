//! Name-keyed plugin factory table.
//!
//! One [`Registry`] exists per plugin family (connectors, task builders).
//! Factories receive the entry's `params` as an untyped JSON value and
//! deserialize it into their own typed configuration; type erasure happens
//! only here, at the registry boundary.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{ForgeError, PluginKind, Result};

/// Constructor stored in a [`Registry`].
pub type Factory<T> = Arc<dyn Fn(serde_json::Value) -> Result<Box<T>> + Send + Sync>;

/// Holds named factories for one plugin family.
///
/// `register` overwrites silently; `create` is read-only and may be called
/// from concurrent runs.
pub struct Registry<T: ?Sized> {
    kind: PluginKind,
    factories: RwLock<HashMap<String, Factory<T>>>,
}

impl<T: ?Sized> Registry<T> {
    /// Create an empty registry for the given plugin family.
    pub fn new(kind: PluginKind) -> Self {
        Self {
            kind,
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// The plugin family this registry serves.
    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    /// Bind `name` to `factory`, replacing any previous binding.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(serde_json::Value) -> Result<Box<T>> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories.insert(name.clone(), Arc::new(factory)).is_some() {
            tracing::debug!(kind = %self.kind, %name, "replaced plugin registration");
        }
    }

    /// Construct the plugin registered under `name` with `params`.
    ///
    /// Errors from the factory are returned unchanged.
    pub fn create(&self, name: &str, params: serde_json::Value) -> Result<Box<T>> {
        let factory = {
            let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
            factories.get(name).cloned()
        };

        let factory = factory.ok_or_else(|| ForgeError::UnknownPlugin {
            kind: self.kind,
            name: name.to_string(),
        })?;

        factory(params)
    }

    /// Whether `name` has a registered factory.
    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

/// Deserialize plugin params into a typed struct, mapping failures to a
/// construction error for `name`.
///
/// A missing `params` table (JSON `null`) is treated as an empty table so
/// that variants whose fields all have defaults can be declared bare.
pub fn parse_params<P: serde::de::DeserializeOwned>(
    kind: PluginKind,
    name: &str,
    params: serde_json::Value,
) -> Result<P> {
    let params = match params {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| ForgeError::construction(kind, name, e))
}
