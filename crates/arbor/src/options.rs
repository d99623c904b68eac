//! Store configuration.

use crate::error::{BoxError, StoreError};
use crate::middleware::{middleware_fn, Middleware, Next};
use crate::persist::StorageAdapter;
use crate::plugin::StorePlugin;
use crate::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default store name used in diagnostics.
pub const DEFAULT_STORE_NAME: &str = "store";

/// Default nesting limit for state trees.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Receives errors from mutation paths that never return them.
pub type ErrorHandler = Arc<dyn Fn(&StoreError) + Send + Sync>;

/// Serializable subset of [`StoreOptions`].
///
/// ```
/// use arbor::StoreConfig;
///
/// let config: StoreConfig = serde_json::from_str(r#"{"name": "todos", "history_limit": 50}"#).unwrap();
/// assert_eq!(config.history_limit, 50);
/// assert_eq!(config.max_depth, arbor::DEFAULT_MAX_DEPTH);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Label for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Maximum number of undoable changes. 0 disables history.
    pub history_limit: usize,
    /// Maximum nesting depth accepted at construction.
    pub max_depth: usize,
    /// Storage key for persisted state. Needs an adapter, see
    /// [`StoreOptions::storage`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: None,
            history_limit: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            persist_key: None,
        }
    }
}

/// Options for [`Store::new`](crate::Store::new).
#[derive(Clone)]
pub struct StoreOptions {
    pub(crate) name: Option<String>,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) plugins: Vec<Arc<dyn StorePlugin>>,
    pub(crate) history_limit: usize,
    pub(crate) max_depth: usize,
    pub(crate) on_error: Option<ErrorHandler>,
    pub(crate) storage: Option<Arc<dyn StorageAdapter>>,
    pub(crate) persist_key: Option<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from_config(StoreConfig::default())
    }
}

impl StoreOptions {
    /// Default options: no middleware, no plugins, history disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options seeded from a [`StoreConfig`].
    pub fn from_config(config: StoreConfig) -> Self {
        Self {
            name: config.name,
            middleware: Vec::new(),
            plugins: Vec::new(),
            history_limit: config.history_limit,
            max_depth: config.max_depth,
            on_error: None,
            storage: None,
            persist_key: config.persist_key,
        }
    }

    /// Label for diagnostics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a middleware to the dispatch chain.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Append a closure middleware to the dispatch chain.
    pub fn middleware_fn<F>(self, f: F) -> Self
    where
        F: Fn(Value, &Value, Next<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.middleware(middleware_fn(f))
    }

    /// Register a plugin.
    pub fn plugin(mut self, plugin: impl StorePlugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Register a shared plugin.
    pub fn plugin_arc(mut self, plugin: Arc<dyn StorePlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Maximum number of undoable changes. 0 disables history.
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Maximum nesting depth accepted at construction.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Receive errors from `dispatch`, `update_path` and `transaction`.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&StoreError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Persist state under `key` through `adapter`.
    pub fn persistence(mut self, adapter: Arc<dyn StorageAdapter>, key: impl Into<String>) -> Self {
        self.storage = Some(adapter);
        self.persist_key = Some(key.into());
        self
    }

    /// Storage adapter for a key taken from [`StoreConfig::persist_key`].
    pub fn storage(mut self, adapter: Arc<dyn StorageAdapter>) -> Self {
        self.storage = Some(adapter);
        self
    }
}

impl From<StoreConfig> for StoreOptions {
    fn from(config: StoreConfig) -> Self {
        Self::from_config(config)
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("name", &self.name)
            .field("middleware", &self.middleware.len())
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.id()).collect::<Vec<_>>(),
            )
            .field("history_limit", &self.history_limit)
            .field("max_depth", &self.max_depth)
            .field("persist_key", &self.persist_key)
            .finish_non_exhaustive()
    }
}
