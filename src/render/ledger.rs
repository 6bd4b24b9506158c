use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counts live device-side objects (textures, swapchain images, readback buffers).
///
/// Every allocation holds a [`TrackedResource`]; dropping it releases the slot. After an engine
/// is destroyed its ledger must report zero live objects.
#[derive(Clone, Debug, Default)]
pub struct ResourceLedger {
    inner: Arc<LedgerInner>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    live: AtomicUsize,
    allocated: AtomicU64,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, kind: &'static str) -> TrackedResource {
        self.inner.live.fetch_add(1, Ordering::AcqRel);
        self.inner.allocated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(kind, "resource allocated");
        TrackedResource {
            ledger: self.clone(),
            kind,
        }
    }

    /// Objects currently alive.
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Objects ever allocated through this ledger.
    pub fn allocated_total(&self) -> u64 {
        self.inner.allocated.load(Ordering::Relaxed)
    }
}

/// Guard for one tracked allocation.
#[derive(Debug)]
pub struct TrackedResource {
    ledger: ResourceLedger,
    kind: &'static str,
}

impl TrackedResource {
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl Drop for TrackedResource {
    fn drop(&mut self) {
        self.ledger.inner.live.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!(kind = self.kind, "resource released");
    }
}
