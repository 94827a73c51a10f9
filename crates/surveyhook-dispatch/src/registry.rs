//! Handler registry and configuration-driven handler mapping.
//!
//! Two lookups decide which job runs for an event type:
//!
//! - `HandlerMapping` (configuration) maps a sanitised event type to a
//!   handler identifier. No entry, or an empty identifier, means "no
//!   handler" and is not an error.
//! - `HandlerRegistry` (code, populated at startup) maps a handler
//!   identifier to a factory. An identifier the registry does not know is a
//!   configuration defect.

use std::{collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use surveyhook_core::DeliveryRecord;

/// A unit of work scheduled for exactly one matched delivery.
#[async_trait::async_trait]
pub trait WebhookJob: Send + Sync + fmt::Debug {
    /// Handler identifier this job was built from.
    fn name(&self) -> &str;

    /// The delivery the job was constructed with.
    fn record(&self) -> &DeliveryRecord;

    /// Executes the job.
    ///
    /// # Errors
    ///
    /// Any error makes the worker pool apply its retry policy.
    async fn run(&self) -> anyhow::Result<()>;
}

/// Constructs a job from the delivery that selected it.
pub type JobFactory = Arc<dyn Fn(DeliveryRecord) -> Box<dyn WebhookJob> + Send + Sync>;

/// Explicit registry of constructible handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, JobFactory>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Creates a registry holding the jobs that ship with this crate.
    pub fn with_builtin_jobs() -> Self {
        let mut registry = Self::new();
        crate::jobs::register_builtin_jobs(&mut registry);
        registry
    }

    /// Registers a factory under a handler identifier, replacing any
    /// previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(DeliveryRecord) -> Box<dyn WebhookJob> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Returns true if the identifier is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds a job for the identifier, or `None` if it is not registered.
    pub fn build(&self, name: &str, record: DeliveryRecord) -> Option<Box<dyn WebhookJob>> {
        self.factories.get(name).map(|factory| factory(record))
    }

    /// Returns the registered identifiers, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry").field("handlers", &self.names()).finish()
    }
}

/// Turns an event type into a mapping key.
///
/// Configuration keys cannot contain dots, so `response.completed` is
/// looked up as `response_completed`.
pub fn sanitize_event_type(event_type: &str) -> String {
    event_type.replace('.', "_")
}

/// Read-only mapping from sanitised event type to handler identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerMapping(HashMap<String, String>);

impl HandlerMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Adds an entry keyed by sanitised event type.
    pub fn insert(&mut self, key: impl Into<String>, handler: impl Into<String>) {
        self.0.insert(key.into(), handler.into());
    }

    /// Returns the handler identifier for an event type.
    ///
    /// The type is sanitised before lookup. An empty identifier counts as
    /// absent.
    pub fn handler_for(&self, event_type: &str) -> Option<&str> {
        self.0
            .get(&sanitize_event_type(event_type))
            .map(String::as_str)
            .filter(|handler| !handler.is_empty())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the mapping has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, String>> for HandlerMapping {
    fn from(entries: HashMap<String, String>) -> Self {
        Self(entries)
    }
}

impl<K, V> FromIterator<(K, V)> for HandlerMapping
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
