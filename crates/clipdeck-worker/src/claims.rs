//! Per-resource single-flight claims.
//!
//! A claim is held for the lifetime of a running job and released when its
//! guard drops, including when the job task panics or is aborted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use clipdeck_models::ResourceId;

/// Set of resources with a job in flight.
#[derive(Debug, Clone)]
pub struct ClaimTable {
    name: &'static str,
    active: Arc<Mutex<HashSet<ResourceId>>>,
}

impl ClaimTable {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<ResourceId>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `resource_id`, or `None` if it is already claimed.
    pub fn try_claim(&self, resource_id: &ResourceId) -> Option<ClaimGuard> {
        if !self.lock().insert(resource_id.clone()) {
            return None;
        }
        Some(ClaimGuard {
            active: Arc::clone(&self.active),
            resource_id: resource_id.clone(),
        })
    }

    pub fn is_claimed(&self, resource_id: &ResourceId) -> bool {
        self.lock().contains(resource_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Releases its claim on drop.
#[derive(Debug)]
pub struct ClaimGuard {
    active: Arc<Mutex<HashSet<ResourceId>>>,
    resource_id: ResourceId,
}

impl ClaimGuard {
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.resource_id);
    }
}
