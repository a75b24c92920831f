//! Append-only collection of verified proxies

use crate::proxy::models::VerifiedProxy;
use std::sync::{Arc, Mutex, MutexGuard};

/// Verified-alive proxies collected during a batch run
///
/// Cloning is cheap and every clone shares the same storage, so a caller can
/// keep a handle and read partial results while the batch is still running.
#[derive(Debug, Clone, Default)]
pub struct ResultAccumulator {
    entries: Arc<Mutex<Vec<VerifiedProxy>>>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, proxy: VerifiedProxy) {
        self.lock().push(proxy);
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Entries in append order
    pub fn snapshot(&self) -> Vec<VerifiedProxy> {
        self.lock().clone()
    }

    /// Entries in the order their endpoints appeared in the input
    pub fn sorted_by_index(&self) -> Vec<VerifiedProxy> {
        let mut entries = self.snapshot();
        entries.sort_by_key(|p| p.index);
        entries
    }

    // A panic while holding the lock can only happen inside Vec::push/clone;
    // the vector is still consistent, so keep using it.
    fn lock(&self) -> MutexGuard<'_, Vec<VerifiedProxy>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
