use crate::location::ArchiveLocation;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tracing::debug;
use zipvfs_common::{ContentionPolicy, VfsError};

/// Per-location mutual exclusion for random-access handles
///
/// At most one lease exists per archive location. A lease is released when
/// it is dropped, on every exit path.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    held: Mutex<HashMap<ArchiveLocation, ThreadId>>,
    released: Condvar,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the slot for `location`
    ///
    /// A slot already held by the calling thread is always reported busy,
    /// since waiting on it would never finish.
    pub fn acquire(
        &self,
        location: &ArchiveLocation,
        policy: ContentionPolicy,
    ) -> Result<HandleLease<'_>, VfsError> {
        let current = thread::current().id();
        let mut held = self.lock();
        loop {
            let owner = held.get(location).copied();
            match owner {
                None => break,
                Some(owner) if owner == current => {
                    return Err(VfsError::HandleBusy(location.to_string()));
                }
                Some(_) => held = self.wait_or_reject(held, location, policy)?,
            }
        }

        held.insert(location.clone(), current);
        debug!("Acquired handle for {}", location);
        Ok(HandleLease {
            registry: self,
            location: location.clone(),
        })
    }

    /// Waits until no handle is held on `location` or on any archive nested
    /// inside it. Returns immediately when nothing is registered.
    pub fn close(&self, location: &ArchiveLocation, policy: ContentionPolicy) -> Result<(), VfsError> {
        let current = thread::current().id();
        let mut held = self.lock();
        loop {
            let mut busy = false;
            for (key, owner) in held.iter() {
                if key.is_within(location) {
                    if *owner == current {
                        return Err(VfsError::HandleBusy(key.to_string()));
                    }
                    busy = true;
                }
            }
            if !busy {
                debug!("Closed handles for {}", location);
                return Ok(());
            }
            held = self.wait_or_reject(held, location, policy)?;
        }
    }

    pub fn is_held(&self, location: &ArchiveLocation) -> bool {
        self.lock().contains_key(location)
    }

    /// Number of leases currently outstanding
    pub fn held_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ArchiveLocation, ThreadId>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_or_reject<'a>(
        &self,
        held: MutexGuard<'a, HashMap<ArchiveLocation, ThreadId>>,
        location: &ArchiveLocation,
        policy: ContentionPolicy,
    ) -> Result<MutexGuard<'a, HashMap<ArchiveLocation, ThreadId>>, VfsError> {
        match policy {
            ContentionPolicy::Reject => Err(VfsError::HandleBusy(location.to_string())),
            ContentionPolicy::Wait => {
                debug!("Waiting for handle on {}", location);
                Ok(self.released.wait(held).unwrap_or_else(PoisonError::into_inner))
            }
        }
    }
}

/// Exclusive hold on one archive location; released on drop
#[derive(Debug)]
pub struct HandleLease<'a> {
    registry: &'a HandleRegistry,
    location: ArchiveLocation,
}

impl HandleLease<'_> {
    pub fn location(&self) -> &ArchiveLocation {
        &self.location
    }
}

impl Drop for HandleLease<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.location);
        self.registry.released.notify_all();
        debug!("Released handle for {}", self.location);
    }
}
