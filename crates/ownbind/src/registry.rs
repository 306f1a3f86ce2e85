//! Wrapper identity registry
//!
//! Maps native addresses to wrapper identities so a pointer that comes back
//! from native code reuses the wrapper already made for it. When it does,
//! a returned reference the wrapper adopted is surplus and must be dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use crate::custody::ObjectId;
use crate::synthesis::BoundaryAction;

/// Result of [`WrapperRegistry::lookup_or_register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// A wrapper already existed for the address
    Existing(ObjectId),
    /// A new identity was assigned
    Registered(ObjectId),
}

impl Lookup {
    /// The wrapper identity.
    pub fn id(&self) -> ObjectId {
        match self {
            Lookup::Existing(id) | Lookup::Registered(id) => *id,
        }
    }

    /// True when a new identity was assigned.
    pub fn is_new(&self) -> bool {
        matches!(self, Lookup::Registered(_))
    }

    /// True when the returned reference must be released again: the
    /// wrapper adopted one (`AdoptReference`) but already holds its own.
    pub fn must_release_surplus(&self, action: BoundaryAction) -> bool {
        matches!(self, Lookup::Existing(_)) && action == BoundaryAction::AdoptReference
    }
}

/// Native address → wrapper identity.
#[derive(Debug)]
pub struct WrapperRegistry {
    by_address: DashMap<usize, ObjectId>,
    next_id: AtomicU64,
}

impl WrapperRegistry {
    /// Create an empty registry. Identities start at 1.
    pub fn new() -> Self {
        Self {
            by_address: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Address key for a native pointer.
    pub fn address_of<T>(ptr: *const T) -> usize {
        ptr as usize
    }

    /// The wrapper identity for `address`, if one exists.
    pub fn lookup(&self, address: usize) -> Option<ObjectId> {
        self.by_address.get(&address).map(|id| *id)
    }

    /// The existing identity for `address`, or a new one.
    pub fn lookup_or_register(&self, address: usize) -> Lookup {
        match self.by_address.entry(address) {
            Entry::Occupied(entry) => Lookup::Existing(*entry.get()),
            Entry::Vacant(entry) => {
                let id = ObjectId(self.next_id.fetch_add(1, Ordering::Relaxed));
                entry.insert(id);
                trace!(address, %id, "wrapper registered");
                Lookup::Registered(id)
            }
        }
    }

    /// Forget `address`, typically when its wrapper is destroyed.
    pub fn unregister(&self, address: usize) -> Option<ObjectId> {
        self.by_address.remove(&address).map(|(_, id)| id)
    }

    /// Number of registered wrappers.
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

impl Default for WrapperRegistry {
    fn default() -> Self {
        Self::new()
    }
}
