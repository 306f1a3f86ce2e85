//! Single-owner handles for non-refcounted objects

use std::any::type_name;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use crate::error::RefcountError;

/// A wrapper's handle to an object it solely owns.
///
/// Transferring ownership to native code (`OwnedTransferIn`) takes the
/// object out; the handle is then invalid and any further transfer,
/// release or access fails with `Released`.
pub struct OwnedHandle<T> {
    slot: Mutex<Option<T>>,
}

impl<T> OwnedHandle<T> {
    /// Own `value`.
    pub fn new(value: T) -> Self {
        Self {
            slot: Mutex::new(Some(value)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn released() -> RefcountError {
        RefcountError::Released {
            type_name: type_name::<T>(),
        }
    }

    /// Hand the object over; the handle is invalid afterwards.
    pub fn transfer(&self) -> Result<T, RefcountError> {
        let value = self.slot().take().ok_or_else(Self::released)?;
        trace!(type_name = type_name::<T>(), "ownership transferred");
        Ok(value)
    }

    /// Destroy the object now.
    pub fn release(&self) -> Result<(), RefcountError> {
        let value = self.slot().take().ok_or_else(Self::released)?;
        drop(value);
        trace!(type_name = type_name::<T>(), "released");
        Ok(())
    }

    /// Run `f` against the object.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, RefcountError> {
        self.slot().as_ref().map(f).ok_or_else(Self::released)
    }

    /// Run `f` against the object mutably.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, RefcountError> {
        self.slot().as_mut().map(f).ok_or_else(Self::released)
    }

    /// True until the object is transferred or released.
    pub fn is_valid(&self) -> bool {
        self.slot().is_some()
    }
}

impl<T> fmt::Debug for OwnedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("type", &type_name::<T>())
            .field("valid", &self.is_valid())
            .finish()
    }
}
