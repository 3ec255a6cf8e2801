//! Handle given to an operation while it holds its resource's turn

use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::cache::ResolutionCaches;
use crate::cdp::{FrameDirectory, SessionClient};
use crate::session::manager::ResourceSlot;
use crate::types::ResourceId;
use crate::{Error, Result};

/// Protocol client, frame listing and cache access for one serialized operation
#[derive(Debug, Clone)]
pub struct SessionContext {
    client: SessionClient,
    frames: Arc<dyn FrameDirectory>,
    caches: Arc<Mutex<ResolutionCaches>>,
    slot: Arc<ResourceSlot>,
    /// Session generation this operation started under
    generation: u64,
}

impl SessionContext {
    pub(crate) fn new(
        client: SessionClient,
        frames: Arc<dyn FrameDirectory>,
        caches: Arc<Mutex<ResolutionCaches>>,
        slot: Arc<ResourceSlot>,
        generation: u64,
    ) -> Self {
        Self {
            client,
            frames,
            caches,
            slot,
            generation,
        }
    }

    pub fn resource(&self) -> &ResourceId {
        self.client.resource()
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    pub fn frame_directory(&self) -> &dyn FrameDirectory {
        self.frames.as_ref()
    }

    /// Run `f` against the process-wide caches
    pub fn caches<R>(&self, f: impl FnOnce(&mut ResolutionCaches) -> R) -> Result<R> {
        let mut caches = self
            .caches
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?;
        Ok(f(&mut caches))
    }

    /// Cached isolated-world execution context for (frame, world)
    pub fn frame_context(&self, frame_id: &str, world: &str) -> Option<i64> {
        self.slot
            .session()
            .frame_contexts
            .get(&(frame_id.to_string(), world.to_string()))
    }

    pub fn store_frame_context(&self, frame_id: &str, world: &str, context_id: i64) {
        let mut session = self.slot.session();
        if session.generation != self.generation {
            debug!("Session for {} was reset; not caching context {}", self.resource(), context_id);
            return;
        }
        session
            .frame_contexts
            .set((frame_id.to_string(), world.to_string()), context_id);
    }

    /// 本操作开始时的会话是否仍然有效
    pub fn is_current(&self) -> bool {
        self.slot.session().generation == self.generation
    }

    /// 写入缓存；若本操作开始后会话已被重置则丢弃。
    ///
    /// 节点 ID 只在单个协议会话内有效，旧会话得到的条目不能在清除后留下。
    /// 写入期间持有会话锁，并发的重置只会在写入之后清除。
    pub fn store(&self, f: impl FnOnce(&mut ResolutionCaches)) -> Result<()> {
        let session = self.slot.session();
        if session.generation != self.generation {
            debug!("Session for {} was reset; dropping cache write", self.resource());
            return Ok(());
        }
        let mut caches = self
            .caches
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?;
        f(&mut caches);
        Ok(())
    }
}
