//! Session manager implementation
//!
//! One slot per resource. A slot pairs a fair async turn lock, which queues operations in
//! submission order, with a short-lived state lock that is never held across an `.await`
//! so external disconnects can reset a session while an operation is still queued.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheConfig, CacheStats, Invalidation, InvalidationOutcome, ResolutionCaches, TtlCache};
use crate::cdp::{Debugger, DetachEvent, FrameDirectory, SessionClient};
use crate::error::SessionFault;
use crate::session::context::SessionContext;
use crate::session::types::*;
use crate::types::ResourceId;
use crate::{Error, Result};

/// (protocol frame id, world name)
pub(crate) type FrameContextKey = (String, String);

/// Mutable state of one resource's session
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) state: SessionState,
    pub(crate) last_activity: Instant,
    pub(crate) retry_count: u32,
    /// Bumped on every reset; work started under an older generation is stale
    pub(crate) generation: u64,
    pub(crate) frame_contexts: TtlCache<FrameContextKey, i64>,
    idle_timer: Option<JoinHandle<()>>,
}

impl Session {
    fn new(frame_context_ttl: Duration) -> Self {
        Self {
            state: SessionState::Detached,
            last_activity: Instant::now(),
            retry_count: 0,
            generation: 0,
            frame_contexts: TtlCache::new(frame_context_ttl),
            idle_timer: None,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn cancel_idle(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }

    fn reset(&mut self) {
        self.state = SessionState::Detached;
        self.retry_count = 0;
        self.generation += 1;
        self.frame_contexts.clear();
        self.cancel_idle();
    }
}

/// Queue and state of one resource
#[derive(Debug)]
pub(crate) struct ResourceSlot {
    /// Held for the whole of an operation; tokio's mutex grants it in FIFO order
    turn: tokio::sync::Mutex<()>,
    session: Mutex<Session>,
}

impl ResourceSlot {
    fn new(frame_context_ttl: Duration) -> Self {
        Self {
            turn: tokio::sync::Mutex::new(()),
            session: Mutex::new(Session::new(frame_context_ttl)),
        }
    }

    /// Session state; a poisoned lock is recovered since every field is valid on its own
    pub(crate) fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of a periodic sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub cache_entries: usize,
    pub frame_contexts: usize,
    pub slots_dropped: usize,
}

/// Owns every session and the process-wide resolution caches
#[derive(Debug)]
pub struct SessionManager {
    debugger: Arc<dyn Debugger>,
    frames: Arc<dyn FrameDirectory>,
    config: SessionConfig,
    slots: Mutex<HashMap<ResourceId, Arc<ResourceSlot>>>,
    caches: Arc<Mutex<ResolutionCaches>>,
    this: Weak<SessionManager>,
}

impl SessionManager {
    /// Create a session manager and start listening for external disconnects.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        debugger: Arc<dyn Debugger>,
        frames: Arc<dyn FrameDirectory>,
        config: SessionConfig,
        cache_config: &CacheConfig,
    ) -> Arc<Self> {
        let manager = Arc::new_cyclic(|this| Self {
            debugger,
            frames,
            config,
            slots: Mutex::new(HashMap::new()),
            caches: Arc::new(Mutex::new(ResolutionCaches::new(cache_config))),
            this: this.clone(),
        });
        manager.spawn_disconnect_watcher();
        manager
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn spawn_disconnect_watcher(&self) {
        let mut events = self.debugger.subscribe_detach();
        let this = self.this.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match this.upgrade() {
                        Some(manager) => manager.handle_disconnect(&event),
                        None => break,
                    },
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Missed {} session lifecycle events", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Disconnect watcher stopped");
        });
    }

    fn slot(&self, resource: &ResourceId) -> Result<Arc<ResourceSlot>> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?;
        Ok(Arc::clone(slots.entry(resource.clone()).or_insert_with(|| {
            Arc::new(ResourceSlot::new(self.config.frame_context_ttl))
        })))
    }

    fn existing_slot(&self, resource: &ResourceId) -> Option<Arc<ResourceSlot>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .cloned()
    }

    fn caches(&self) -> MutexGuard<'_, ResolutionCaches> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `operation` in the resource's queue.
    ///
    /// Operations on one resource run one at a time in submission order, each after the
    /// previous one finished, whatever its outcome. Operations on different resources are
    /// independent.
    pub async fn execute_serialized<T, F, Fut>(
        &self,
        resource: &ResourceId,
        options: ExecuteOptions,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce(SessionContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let slot = self.slot(resource)?;
        let _turn = slot.turn.lock().await;

        let generation = {
            let mut session = slot.session();
            if options.attach {
                session.cancel_idle();
            }
            if session.state == SessionState::Attached {
                session.touch();
            }
            session.generation
        };

        if options.attach {
            self.ensure_attached(resource, &slot).await?;
        }

        let context = SessionContext::new(
            SessionClient::new(Arc::clone(&self.debugger), resource.clone()),
            Arc::clone(&self.frames),
            Arc::clone(&self.caches),
            Arc::clone(&slot),
            generation,
        );
        let result = operation(context).await;

        if let Err(error) = &result {
            self.account_error(resource, &slot, error, generation).await;
        }
        if options.schedule_idle {
            self.schedule_idle(resource, &slot);
        }
        result
    }

    /// Bring the session to ATTACHED. Caller holds the turn.
    async fn ensure_attached(&self, resource: &ResourceId, slot: &Arc<ResourceSlot>) -> Result<()> {
        let generation = {
            let mut session = slot.session();
            if session.state == SessionState::Attached {
                return Ok(());
            }
            // ATTACHING here means an earlier caller gave up mid-attach; start over
            session.state = SessionState::Attaching;
            session.generation
        };

        let attempts = self.config.attach_max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("Attaching to {} (attempt {}/{})", resource, attempt, attempts);
            match self.open_session(resource).await {
                Ok(()) => {
                    {
                        let mut session = slot.session();
                        if session.generation == generation {
                            session.state = SessionState::Attached;
                            session.retry_count = 0;
                            session.touch();
                            info!("Attached to {}", resource);
                            return Ok(());
                        }
                    }
                    // Reset while attaching: close the orphaned protocol session
                    if let Err(e) = self.debugger.detach(resource).await {
                        debug!("Detach of orphaned session for {}: {}", resource, e);
                    }
                    return Err(Error::session_unavailable(
                        SessionFault::NotAttached,
                        format!("{} disconnected while attaching", resource),
                    ));
                }
                Err(e) if !e.is_retryable_attach() => {
                    warn!("Attach to {} failed: {}", resource, e);
                    let mut session = slot.session();
                    if session.generation == generation {
                        session.state = SessionState::Detached;
                    }
                    return Err(e);
                }
                Err(e) => {
                    warn!("Attach attempt {}/{} for {} failed: {}", attempt, attempts, resource, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.attach_backoff * attempt).await;
                    }
                }
            }
        }

        self.reset_session(resource, slot);
        Err(Error::fatal(format!(
            "Attach to {} failed after {} attempts: {}",
            resource,
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Open the protocol session and enable the required domains
    async fn open_session(&self, resource: &ResourceId) -> Result<()> {
        self.debugger.attach(resource).await?;

        let client = SessionClient::new(Arc::clone(&self.debugger), resource.clone());
        for domain in REQUIRED_DOMAINS {
            if let Err(e) = client.enable_domain(domain).await {
                if let Err(detach_error) = self.debugger.detach(resource).await {
                    debug!("Detach after failed {}.enable: {}", domain, detach_error);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Count a failed operation against the session and reset it when it can't be trusted
    async fn account_error(&self, resource: &ResourceId, slot: &Arc<ResourceSlot>, error: &Error, generation: u64) {
        if !error.counts_against_session() {
            return;
        }

        let must_reset = {
            let mut session = slot.session();
            if session.generation != generation || session.state != SessionState::Attached {
                return;
            }
            session.retry_count += 1;
            error.invalidates_session() || session.retry_count > self.config.max_error_count
        };

        if must_reset {
            warn!("Resetting session for {} after: {}", resource, error);
            if !matches!(error, Error::SessionUnavailable { .. }) {
                if let Err(e) = self.debugger.detach(resource).await {
                    debug!("Detach during reset of {}: {}", resource, e);
                }
            }
            self.reset_session(resource, slot);
        }
    }

    /// 强制将会话置为 DETACHED，并清除该资源的所有缓存
    fn reset_session(&self, resource: &ResourceId, slot: &ResourceSlot) {
        slot.session().reset();
        let purged = self.caches().purge_resource(resource);
        debug!("Session for {} reset, {} cache entries purged", resource, purged);
    }

    fn schedule_idle(&self, resource: &ResourceId, slot: &Arc<ResourceSlot>) {
        let mut session = slot.session();
        if session.state != SessionState::Attached {
            return;
        }
        session.touch();
        self.arm_idle_timer(&mut session, resource, self.config.idle_timeout);
    }

    fn arm_idle_timer(&self, session: &mut Session, resource: &ResourceId, delay: Duration) {
        session.cancel_idle();

        let this = self.this.clone();
        let resource = resource.clone();
        session.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = this.upgrade() {
                manager.release_if_idle(&resource).await;
            }
        }));
    }

    /// 空闲定时器到期；期间有活动则顺延释放
    async fn release_if_idle(&self, resource: &ResourceId) {
        let Some(slot) = self.existing_slot(resource) else {
            return;
        };
        let _turn = slot.turn.lock().await;

        {
            let mut session = slot.session();
            // This task owns the handle; dropping it detaches rather than aborts
            session.idle_timer = None;
            if session.state != SessionState::Attached {
                return;
            }
            let elapsed = session.last_activity.elapsed();
            if elapsed < self.config.idle_timeout {
                // Touched by an operation that did not arm a timer of its own
                self.arm_idle_timer(&mut session, resource, self.config.idle_timeout - elapsed);
                return;
            }
        }

        info!("Releasing idle session for {}", resource);
        if let Err(e) = self.debugger.detach(resource).await {
            debug!("Idle detach of {} failed: {}", resource, e);
        }
        self.reset_session(resource, &slot);
    }

    /// 浏览器端关闭会话，立即生效（包括排队中的操作）
    fn handle_disconnect(&self, event: &DetachEvent) {
        let Some(slot) = self.existing_slot(&event.resource) else {
            return;
        };
        info!("Session for {} closed externally: {:?}", event.resource, event.reason);
        self.reset_session(&event.resource, &slot);
    }

    /// Close the resource's session and purge its caches; `true` if it was attached
    pub async fn detach_session(&self, resource: &ResourceId) -> Result<bool> {
        let slot = self.slot(resource)?;
        let _turn = slot.turn.lock().await;

        let was_attached = slot.session().state == SessionState::Attached;
        if was_attached {
            if let Err(e) = self.debugger.detach(resource).await {
                warn!("Detach of {} failed: {}", resource, e);
            }
        }
        self.reset_session(resource, &slot);
        Ok(was_attached)
    }

    /// Apply an invalidation signal in the resource's queue, without attaching
    pub async fn invalidate(&self, signal: Invalidation) -> Result<InvalidationOutcome> {
        let resource = signal.resource.clone();
        self.execute_serialized(&resource, ExecuteOptions::without_attach(), |context| async move {
            context.caches(|caches| caches.invalidate(&signal))
        })
        .await
    }

    pub fn session_snapshot(&self, resource: &ResourceId) -> Option<SessionSnapshot> {
        let slot = self.existing_slot(resource)?;
        let session = slot.session();
        Some(SessionSnapshot {
            state: session.state,
            retry_count: session.retry_count,
            idle_ms: session.last_activity.elapsed().as_millis() as u64,
            frame_contexts: session.frame_contexts.len(),
            idle_release_pending: session.idle_timer.is_some(),
        })
    }

    /// Number of attached sessions
    pub fn session_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.session().state == SessionState::Attached)
            .count()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.caches().stats()
    }

    /// Drop expired cache entries and forget detached resources nobody is waiting on
    pub fn sweep(&self) -> SweepOutcome {
        let mut outcome = SweepOutcome {
            cache_entries: self.caches().purge_expired(),
            ..Default::default()
        };

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|_, slot| {
            let mut session = slot.session();
            outcome.frame_contexts += session.frame_contexts.purge_expired();
            // Handles to a slot are only cloned under this lock, so a count of one means idle
            let unused = Arc::strong_count(slot) == 1 && session.state == SessionState::Detached;
            if unused {
                outcome.slots_dropped += 1;
            }
            !unused
        });
        outcome
    }

    /// Detach every session; used on shutdown
    pub async fn shutdown(&self) {
        let resources: Vec<ResourceId> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();

        for resource in resources {
            if let Err(e) = self.detach_session(&resource).await {
                warn!("Failed to detach {} on shutdown: {}", resource, e);
            }
        }
    }
}
