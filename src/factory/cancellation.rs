//! Cancellation records for in-flight pipelines.
//!
//! Each request entering the pipeline gets a [`Connection`] record in a
//! shared tracker keyed by request id. The record carries the shared
//! [`CancellationToken`] that every suspension point consults; `abort`
//! flags the record and signals the token. The record itself stays until
//! the pipeline winds down and unregisters it, so a phase that starts
//! after the abort still sees the cancellation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared flag consulted cooperatively at every suspension point.
///
/// Cloning produces another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<Mutex<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap()
    }

    pub fn cancel(&self) {
        *self.cancelled.lock().unwrap() = true;
    }
}

/// One in-flight pipeline's cancellation record.
#[derive(Debug, Clone)]
pub struct Connection {
    pub request_id: String,
    pub token: CancellationToken,

    /// Set by `abort`. The record outlives the abort so later phases of
    /// the same pipeline observe it.
    pub aborted: bool,
}

impl Connection {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            token: CancellationToken::new(),
            aborted: false,
        }
    }
}

/// Error types for cancellation operations.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelError {
    /// No in-flight pipeline exists for the given id.
    NotFound(String),

    /// Failed to acquire the tracker lock.
    LockError(String),
}

impl std::fmt::Display for CancelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelError::NotFound(id) => write!(f, "Request not found: {}", id),
            CancelError::LockError(msg) => write!(f, "Lock error: {}", msg),
        }
    }
}

impl std::error::Error for CancelError {}

/// Tracks the cancellation records of all in-flight pipelines.
///
/// At most one record exists per request id. Re-registering an id replaces
/// the stale record and cancels its token, so an abandoned pipeline for the
/// same request winds down at its next suspension point.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    connections: HashMap<String, Connection>,

    /// Request ids by insertion time, oldest first.
    order: Vec<String>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record and returns the token the pipeline should carry.
    pub fn register(&mut self, request_id: &str) -> CancellationToken {
        if let Some(stale) = self.connections.remove(request_id) {
            stale.token.cancel();
            self.order.retain(|id| id != request_id);
        }
        let connection = Connection::new(request_id);
        let token = connection.token.clone();
        self.order.push(request_id.to_string());
        self.connections.insert(request_id.to_string(), connection);
        token
    }

    /// Removes a record, called when the pipeline winds down (response
    /// delivered, or a cancellation observed).
    ///
    /// Returns `true` if the record existed.
    pub fn unregister(&mut self, request_id: &str) -> bool {
        self.order.retain(|id| id != request_id);
        self.connections.remove(request_id).is_some()
    }

    /// Flags the record as aborted and signals its token. The record is
    /// kept; the pipeline unregisters it once it observes the cancellation.
    pub fn abort(&mut self, request_id: &str) -> Result<(), CancelError> {
        let connection = self
            .connections
            .get_mut(request_id)
            .ok_or_else(|| CancelError::NotFound(request_id.to_string()))?;
        connection.aborted = true;
        connection.token.cancel();
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// Active request ids, oldest first.
    pub fn active_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn is_active(&self, request_id: &str) -> bool {
        self.connections.contains_key(request_id)
    }

    /// `true` if the record exists and has been aborted.
    pub fn is_aborted(&self, request_id: &str) -> bool {
        self.connections
            .get(request_id)
            .map_or(false, |connection| connection.aborted)
    }

    /// Token of the in-flight pipeline for `request_id`, if any.
    pub fn token_for(&self, request_id: &str) -> Option<CancellationToken> {
        self.connections
            .get(request_id)
            .map(|connection| connection.token.clone())
    }
}

/// Thread-safe wrapper around [`ConnectionTracker`], shared between the
/// factory and the host's abort entry point.
#[derive(Debug, Clone, Default)]
pub struct SharedConnectionTracker {
    inner: Arc<Mutex<ConnectionTracker>>,
}

impl SharedConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request_id: &str) -> Result<CancellationToken, CancelError> {
        let mut tracker = self
            .inner
            .lock()
            .map_err(|e| CancelError::LockError(e.to_string()))?;
        Ok(tracker.register(request_id))
    }

    pub fn unregister(&self, request_id: &str) -> Result<bool, CancelError> {
        let mut tracker = self
            .inner
            .lock()
            .map_err(|e| CancelError::LockError(e.to_string()))?;
        Ok(tracker.unregister(request_id))
    }

    pub fn abort(&self, request_id: &str) -> Result<(), CancelError> {
        let mut tracker = self
            .inner
            .lock()
            .map_err(|e| CancelError::LockError(e.to_string()))?;
        tracker.abort(request_id)
    }

    pub fn active_count(&self) -> Result<usize, CancelError> {
        let tracker = self
            .inner
            .lock()
            .map_err(|e| CancelError::LockError(e.to_string()))?;
        Ok(tracker.active_count())
    }

    pub fn active_ids(&self) -> Result<Vec<String>, CancelError> {
        let tracker = self
            .inner
            .lock()
            .map_err(|e| CancelError::LockError(e.to_string()))?;
        Ok(tracker.active_ids())
    }

    pub fn is_active(&self, request_id: &str) -> Result<bool, CancelError> {
        let tracker = self
            .inner
            .lock()
            .map_err(|e| CancelError::LockError(e.to_string()))?;
        Ok(tracker.is_active(request_id))
    }

    pub fn is_aborted(&self, request_id: &str) -> Result<bool, CancelError> {
        let tracker = self
            .inner
            .lock()
            .map_err(|e| CancelError::LockError(e.to_string()))?;
        Ok(tracker.is_aborted(request_id))
    }

    pub fn token_for(&self, request_id: &str) -> Result<Option<CancellationToken>, CancelError> {
        let tracker = self
            .inner
            .lock()
            .map_err(|e| CancelError::LockError(e.to_string()))?;
        Ok(tracker.token_for(request_id))
    }
}
