//! Process-wide count of live progress boxes.
//!
//! A host that loads this library dynamically asks [`ObjectRegistry::can_unload`]
//! before unloading it. The registry is an explicit object the host creates and
//! hands to every box; there is no global counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct ObjectRegistry {
    live: AtomicUsize,
}

impl ObjectRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count one more live object until the returned guard drops.
    pub fn register(self: &Arc<Self>) -> RegistryGuard {
        let live = self.live.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!("Object registered, {} live", live);
        RegistryGuard {
            registry: Arc::clone(self),
        }
    }

    pub fn live_objects(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn can_unload(&self) -> bool {
        self.live_objects() == 0
    }
}

/// Keeps one object counted in its [`ObjectRegistry`].
#[derive(Debug)]
pub struct RegistryGuard {
    registry: Arc<ObjectRegistry>,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        let live = self.registry.live.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::debug!("Object released, {} live", live);
    }
}
