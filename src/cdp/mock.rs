//! Mock CDP implementation for testing
//!
//! This module provides scriptable implementations of [`Debugger`] and [`FrameDirectory`]
//! for development and testing. Responses are produced by per-method handlers; every
//! command is recorded with its start and end time so tests can check ordering.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::cdp::traits::*;
use crate::error::SessionFault;
use crate::types::ResourceId;
use crate::Error;

type Handler = Arc<dyn Fn(&Value) -> Result<Value, Error> + Send + Sync>;

/// One command seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub resource: ResourceId,
    pub method: String,
    pub params: Value,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct MockState {
    handlers: HashMap<String, Handler>,
    attach_failures: VecDeque<Error>,
    command_failures: HashMap<String, VecDeque<Error>>,
    attached: HashSet<ResourceId>,
    calls: Vec<RecordedCall>,
    attach_count: usize,
    detach_count: usize,
}

/// Mock debugger
pub struct MockDebugger {
    state: Mutex<MockState>,
    latency: Duration,
    detach_tx: broadcast::Sender<DetachEvent>,
}

impl std::fmt::Debug for MockDebugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDebugger")
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

impl MockDebugger {
    /// Create a mock that answers every command immediately
    pub fn new() -> Self {
        let (detach_tx, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(MockState::default()),
            latency: Duration::ZERO,
            detach_tx,
        }
    }

    /// Every attach, detach and command takes `latency` to complete
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new()
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the original failure behind a poison error.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer `method` with `handler`
    pub fn on<F>(&self, method: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.state()
            .handlers
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Make the next attach fail with `error`
    pub fn fail_next_attach(&self, error: Error) {
        self.state().attach_failures.push_back(error);
    }

    /// Make the next call of `method` fail with `error`
    pub fn fail_next_command(&self, method: &str, error: Error) {
        self.state()
            .command_failures
            .entry(method.to_string())
            .or_default()
            .push_back(error);
    }

    /// Simulate the browser closing the session
    pub fn emit_detach(&self, resource: &ResourceId, reason: DetachReason) {
        self.state().attached.remove(resource);
        let _ = self.detach_tx.send(DetachEvent {
            resource: resource.clone(),
            reason,
        });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls of `method`
    pub fn count(&self, method: &str) -> usize {
        self.state().calls.iter().filter(|c| c.method == method).count()
    }

    pub fn attach_count(&self) -> usize {
        self.state().attach_count
    }

    pub fn detach_count(&self) -> usize {
        self.state().detach_count
    }

    pub fn is_attached(&self, resource: &ResourceId) -> bool {
        self.state().attached.contains(resource)
    }

    fn record(&self, resource: &ResourceId, method: &str, params: Value, started: Instant) {
        self.state().calls.push(RecordedCall {
            resource: resource.clone(),
            method: method.to_string(),
            params,
            started,
            finished: Instant::now(),
        });
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MockDebugger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Debugger for MockDebugger {
    async fn attach(&self, resource: &ResourceId) -> Result<(), Error> {
        let started = Instant::now();
        self.simulate_latency().await;
        self.record(resource, "Target.attachToTarget", json!({}), started);

        let mut state = self.state();
        state.attach_count += 1;
        if let Some(error) = state.attach_failures.pop_front() {
            return Err(error);
        }
        state.attached.insert(resource.clone());
        Ok(())
    }

    async fn detach(&self, resource: &ResourceId) -> Result<(), Error> {
        let started = Instant::now();
        self.simulate_latency().await;
        self.record(resource, "Target.detachFromTarget", json!({}), started);

        let mut state = self.state();
        state.detach_count += 1;
        state.attached.remove(resource);
        Ok(())
    }

    async fn send_command(
        &self,
        resource: &ResourceId,
        method: &str,
        params: Value,
    ) -> Result<Value, Error> {
        let started = Instant::now();
        self.simulate_latency().await;
        self.record(resource, method, params.clone(), started);

        let handler = {
            let mut state = self.state();
            if !state.attached.contains(resource) {
                return Err(Error::session_unavailable(
                    SessionFault::NotAttached,
                    format!("{} is not attached", resource),
                ));
            }
            if let Some(error) = state
                .command_failures
                .get_mut(method)
                .and_then(|queue| queue.pop_front())
            {
                return Err(error);
            }
            state.handlers.get(method).cloned()
        };

        match handler {
            Some(handler) => handler(&params),
            None => Ok(json!({})),
        }
    }

    fn subscribe_detach(&self) -> broadcast::Receiver<DetachEvent> {
        self.detach_tx.subscribe()
    }
}

/// Mock navigation-level frame listing
#[derive(Debug, Default)]
pub struct MockFrameDirectory {
    frames: Mutex<HashMap<ResourceId, Vec<NavigationFrame>>>,
}

impl MockFrameDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_frames(&self, resource: &ResourceId, frames: Vec<NavigationFrame>) {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(resource.clone(), frames);
    }
}

#[async_trait]
impl FrameDirectory for MockFrameDirectory {
    async fn list_frames(&self, resource: &ResourceId) -> Result<Vec<NavigationFrame>, Error> {
        Ok(self
            .frames
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .get(resource)
            .cloned()
            .unwrap_or_default())
    }
}
