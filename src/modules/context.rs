//! Permission-scoped execution context handed to modules.
//!
//! A module never touches the store or the event bus directly. At invocation
//! time the factory builds an [`ExecutionContext`] restricted to the
//! permissions declared when the module was registered. Calls outside the
//! granted permissions are no-ops: reads yield nothing, writes are dropped.

use crate::store::{Cookie, EventBus, PipelineStore, StoreError};
use crate::variables::EnvironmentSnapshot;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Capabilities a module may be granted at registration time. The list is
/// fixed then; it cannot be escalated at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    /// Read the active environment snapshot.
    Environment,
    /// Publish on the host event bus.
    Events,
    /// Read application configuration.
    StoreRead,
    /// Write application configuration and variables.
    StoreWrite,
    /// Create and delete session cookies.
    Cookies,
}

/// Event-bus facade. Without the `events` permission every publish is
/// silently dropped.
#[derive(Clone)]
pub struct ScopedEvents {
    bus: Option<Arc<dyn EventBus>>,
}

impl ScopedEvents {
    pub fn publish(&self, topic: &str, payload: Value) {
        if let Some(bus) = &self.bus {
            bus.publish(topic, payload);
        }
    }
}

/// Store facade with per-capability gating.
#[derive(Clone)]
pub struct ScopedStore {
    store: Arc<dyn PipelineStore>,
    can_read: bool,
    can_write: bool,
    can_cookies: bool,
}

impl ScopedStore {
    pub fn read_config(&self, key: &str) -> Option<Value> {
        if self.can_read {
            self.store.read_config(key)
        } else {
            None
        }
    }

    pub fn read_config_all(&self) -> HashMap<String, Value> {
        if self.can_read {
            self.store.read_config_all()
        } else {
            HashMap::new()
        }
    }

    pub fn update_config(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.can_write {
            self.store.update_config(key, value)
        } else {
            Ok(())
        }
    }

    pub fn set_variable(&self, name: &str, value: &str) -> Result<(), StoreError> {
        if self.can_write {
            self.store.set_variable(name, value)
        } else {
            Ok(())
        }
    }

    pub fn set_cookie(&self, cookie: Cookie) -> Result<(), StoreError> {
        if self.can_cookies {
            self.store.set_cookie(cookie)
        } else {
            Ok(())
        }
    }

    pub fn delete_cookie(&self, name: Option<&str>, url: Option<&str>) -> Result<(), StoreError> {
        if self.can_cookies {
            self.store.delete_cookie(name, url)
        } else {
            Ok(())
        }
    }
}

/// The sandbox one module invocation runs in. Built fresh per invocation,
/// immutable after construction.
#[derive(Clone)]
pub struct ExecutionContext {
    environment: EnvironmentSnapshot,
    permissions: Vec<Permission>,
    events: ScopedEvents,
    store: ScopedStore,
}

impl ExecutionContext {
    pub fn new(
        permissions: Vec<Permission>,
        environment: EnvironmentSnapshot,
        store: Arc<dyn PipelineStore>,
        events: Arc<dyn EventBus>,
    ) -> Self {
        let granted = |p: Permission| permissions.contains(&p);
        Self {
            environment: if granted(Permission::Environment) {
                environment
            } else {
                EnvironmentSnapshot::default()
            },
            events: ScopedEvents {
                bus: granted(Permission::Events).then(|| Arc::clone(&events)),
            },
            store: ScopedStore {
                store,
                can_read: granted(Permission::StoreRead),
                can_write: granted(Permission::StoreWrite),
                can_cookies: granted(Permission::Cookies),
            },
            permissions,
        }
    }

    /// Environment snapshot, empty unless the `environment` permission was
    /// granted.
    pub fn environment(&self) -> &EnvironmentSnapshot {
        &self.environment
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn events(&self) -> &ScopedEvents {
        &self.events
    }

    pub fn store(&self) -> &ScopedStore {
        &self.store
    }
}
