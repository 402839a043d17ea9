//! External collaborator seams: the data store and the event bus.
//!
//! The pipeline never owns persistence. Environment variables, application
//! configuration and session data (cookies) live behind [`PipelineStore`];
//! notifications to the host application go through [`EventBus`]. In-memory
//! implementations are provided for tests and for embedding the engine
//! without a real backend.

use crate::variables::{EnvironmentSnapshot, Variable};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Error raised by a store write the backend rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Store error: {}", self.message)
    }
}

impl std::error::Error for StoreError {}

/// A session cookie written by a `set-cookie` action.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,

    /// URL the cookie is scoped to, when the action sets one.
    #[serde(default)]
    pub url: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            url: None,
        }
    }
}

/// Read/write access to the application's data layer.
///
/// `read_environment` returns a snapshot; the pipeline never holds a live
/// reference into the store. Writes are the effects of actions and
/// permission-scoped module calls.
pub trait PipelineStore: Send + Sync {
    /// Snapshot of the active environment: variables plus host-provided
    /// system variables.
    fn read_environment(&self) -> EnvironmentSnapshot;

    /// Reads one application configuration value.
    fn read_config(&self, key: &str) -> Option<Value>;

    /// Reads the whole application configuration map.
    fn read_config_all(&self) -> HashMap<String, Value>;

    /// Updates one application configuration value.
    fn update_config(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Creates or replaces a variable in the active environment.
    fn set_variable(&self, name: &str, value: &str) -> Result<(), StoreError>;

    /// Stores a session cookie.
    fn set_cookie(&self, cookie: Cookie) -> Result<(), StoreError>;

    /// Deletes session cookies by name and/or URL. Deleting something that
    /// does not exist is not an error.
    fn delete_cookie(&self, name: Option<&str>, url: Option<&str>) -> Result<(), StoreError>;
}

/// Publish side of the host application's event bus. Payloads carry the
/// request id so the host can correlate notifications with pipelines.
pub trait EventBus: Send + Sync {
    fn publish(&self, topic: &str, payload: Value);
}

/// In-memory store used by tests and standalone embedding.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    environment: Mutex<EnvironmentSnapshot>,
    config: Mutex<HashMap<String, Value>>,
    cookies: Mutex<Vec<Cookie>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given environment snapshot.
    pub fn with_environment(environment: EnvironmentSnapshot) -> Self {
        let store = Self::new();
        *store.environment.lock().unwrap() = environment;
        store
    }

    /// Replaces the active environment snapshot.
    pub fn set_environment(&self, environment: EnvironmentSnapshot) {
        *self.environment.lock().unwrap() = environment;
    }

    /// Seeds one configuration value.
    pub fn seed_config(&self, key: &str, value: Value) {
        self.config.lock().unwrap().insert(key.to_string(), value);
    }

    /// When set, every write is rejected. Used to exercise action failure
    /// policies in tests.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current session cookies.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.lock().unwrap().clone()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::new("store rejected the write"))
        } else {
            Ok(())
        }
    }
}

impl PipelineStore for InMemoryStore {
    fn read_environment(&self) -> EnvironmentSnapshot {
        self.environment.lock().unwrap().clone()
    }

    fn read_config(&self, key: &str) -> Option<Value> {
        self.config.lock().unwrap().get(key).cloned()
    }

    fn read_config_all(&self) -> HashMap<String, Value> {
        self.config.lock().unwrap().clone()
    }

    fn update_config(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.check_writable()?;
        self.config.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    fn set_variable(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut environment = self.environment.lock().unwrap();
        let active = environment.name.clone();
        if let Some(existing) = environment
            .variables
            .iter_mut()
            .find(|v| v.name == name && v.environment == active)
        {
            existing.value = value.to_string();
            existing.enabled = true;
        } else {
            environment
                .variables
                .push(Variable::new(name, value, active));
        }
        Ok(())
    }

    fn set_cookie(&self, cookie: Cookie) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut cookies = self.cookies.lock().unwrap();
        cookies.retain(|c| !(c.name == cookie.name && c.url == cookie.url));
        cookies.push(cookie);
        Ok(())
    }

    fn delete_cookie(&self, name: Option<&str>, url: Option<&str>) -> Result<(), StoreError> {
        self.check_writable()?;
        self.cookies.lock().unwrap().retain(|cookie| {
            let name_matches = name.map_or(true, |n| cookie.name == n);
            let url_matches = url.map_or(true, |u| cookie.url.as_deref() == Some(u));
            !(name_matches && url_matches)
        });
        Ok(())
    }
}

/// In-memory event bus recording everything published.
#[derive(Debug, Default)]
pub struct InMemoryBus {
    events: Mutex<Vec<(String, Value)>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far, in order.
    pub fn published(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }
}

impl EventBus for InMemoryBus {
    fn publish(&self, topic: &str, payload: Value) {
        self.events
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
    }
}
