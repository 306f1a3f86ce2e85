//! Refcount adapter
//!
//! Native types with manual `Ref`/`Unref` counting are wrapped in a
//! [`RefcountCell`], whose counter is atomic whatever the native counter
//! is. Wrappers hold [`SharedRef`]s: one handle is one reference, so the
//! count always matches the number of live handles plus the references
//! native code holds.
//!
//! Non-refcounted objects that change hands use [`OwnedHandle`] instead.

mod owned;

pub use owned::OwnedHandle;

use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, trace};

use crate::classify::{RefcountMode, Role};
use crate::error::RefcountError;
use crate::synthesis::BoundaryAction;

type DestroyHook<T> = Box<dyn FnOnce(T) + Send>;

/// The native object and its destroy hook. The hook runs when the last
/// `Arc` to the payload goes away, which may be after the count hit 0 if a
/// [`RefcountCell::with`] call was still reading it.
struct Payload<T> {
    value: Option<T>,
    on_destroy: Mutex<Option<DestroyHook<T>>>,
}

impl<T> Drop for Payload<T> {
    fn drop(&mut self) {
        let hook = self
            .on_destroy
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let (Some(value), Some(hook)) = (self.value.take(), hook) {
            hook(value);
        }
    }
}

/// Outcome of [`RefcountCell::decrement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// References remain
    Live(usize),
    /// That was the last reference; the object is gone
    Destroyed,
}

/// A natively refcounted object with an atomic counter.
///
/// The count starts at 1 (the constructor's reference). It only reaches 0
/// on the decrement that destroys the object, and no increment succeeds
/// after that.
pub struct RefcountCell<T> {
    count: AtomicUsize,
    slot: Mutex<Option<Arc<Payload<T>>>>,
}

impl<T> RefcountCell<T> {
    /// Wrap `value` with a count of 1. Destruction drops it.
    pub fn new(value: T) -> Self {
        Self::from_payload(value, None)
    }

    /// Wrap `value` with a count of 1 and a destroy hook that receives it.
    pub fn with_destroy(value: T, on_destroy: impl FnOnce(T) + Send + 'static) -> Self {
        Self::from_payload(value, Some(Box::new(on_destroy)))
    }

    fn from_payload(value: T, on_destroy: Option<DestroyHook<T>>) -> Self {
        Self {
            count: AtomicUsize::new(1),
            slot: Mutex::new(Some(Arc::new(Payload {
                value: Some(value),
                on_destroy: Mutex::new(on_destroy),
            }))),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<Payload<T>>>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// True once the last reference has been released.
    pub fn is_destroyed(&self) -> bool {
        self.count() == 0
    }

    /// Add a reference. Returns the new count.
    ///
    /// # Errors
    ///
    /// `Released` once the object has been destroyed.
    pub fn increment(&self) -> Result<usize, RefcountError> {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(RefcountError::Released {
                    type_name: type_name::<T>(),
                });
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    trace!(type_name = type_name::<T>(), count = current + 1, "increment");
                    return Ok(current + 1);
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop a reference, destroying the object on the last one.
    ///
    /// # Errors
    ///
    /// `RefcountUnderflow` when the count is already 0.
    pub fn decrement(&self) -> Result<Decrement, RefcountError> {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(RefcountError::RefcountUnderflow {
                    type_name: type_name::<T>(),
                });
            }
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        trace!(type_name = type_name::<T>(), count = current - 1, "decrement");
        if current > 1 {
            return Ok(Decrement::Live(current - 1));
        }

        // Only the thread that moved the count from 1 to 0 gets here
        let payload = self.slot().take();
        drop(payload);
        trace!(type_name = type_name::<T>(), "destroyed");
        Ok(Decrement::Destroyed)
    }

    /// Run `f` against the live object.
    ///
    /// The slot lock is not held while `f` runs, so `f` may release
    /// references to this same cell. If it releases the last one, the
    /// object is destroyed once `f` returns.
    ///
    /// # Errors
    ///
    /// `Released` once the object has been destroyed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, RefcountError> {
        let payload = self.slot().clone();
        payload
            .as_deref()
            .and_then(|p| p.value.as_ref())
            .map(f)
            .ok_or(RefcountError::Released {
                type_name: type_name::<T>(),
            })
    }
}

impl<T> fmt::Debug for RefcountCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefcountCell")
            .field("type", &type_name::<T>())
            .field("count", &self.count())
            .finish()
    }
}

/// One counted reference to a [`RefcountCell`].
///
/// Dropping the handle releases its reference. An explicit
/// [`SharedRef::release`] reports errors instead of logging them.
///
/// # Example
///
/// ```
/// use ownbind::SharedRef;
///
/// let first = SharedRef::new(String::from("zbr"));
/// let second = first.try_clone().unwrap();
/// assert_eq!(first.count(), 2);
///
/// drop(second);
/// assert_eq!(first.count(), 1);
/// assert_eq!(first.with(|s| s.len()).unwrap(), 3);
/// ```
pub struct SharedRef<T> {
    cell: Arc<RefcountCell<T>>,
    live: bool,
}

impl<T> SharedRef<T> {
    /// Wrap a freshly constructed object, adopting its initial reference.
    pub fn new(value: T) -> Self {
        Self::adopt(Arc::new(RefcountCell::new(value)))
    }

    /// Take over one reference the caller already owns, without incrementing.
    pub fn adopt(cell: Arc<RefcountCell<T>>) -> Self {
        Self { cell, live: true }
    }

    /// Add a reference and return a handle for it.
    ///
    /// # Errors
    ///
    /// `Released` once the object has been destroyed.
    pub fn acquire(cell: &Arc<RefcountCell<T>>) -> Result<Self, RefcountError> {
        cell.increment()?;
        Ok(Self::adopt(Arc::clone(cell)))
    }

    /// A second handle to the same object.
    pub fn try_clone(&self) -> Result<Self, RefcountError> {
        Self::acquire(&self.cell)
    }

    /// Add a reference that a callee will consume. This handle stays valid.
    pub fn transfer_in(&self) -> Result<usize, RefcountError> {
        self.cell.increment()
    }

    /// Release this handle's reference.
    pub fn release(mut self) -> Result<Decrement, RefcountError> {
        self.live = false;
        self.cell.decrement()
    }

    /// The shared cell.
    pub fn cell(&self) -> &Arc<RefcountCell<T>> {
        &self.cell
    }

    /// Current count.
    pub fn count(&self) -> usize {
        self.cell.count()
    }

    /// Run `f` against the object.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, RefcountError> {
        self.cell.with(f)
    }
}

impl<T> Drop for SharedRef<T> {
    fn drop(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        if let Err(e) = self.cell.decrement() {
            error!(error = %e, "implicit release failed");
        }
    }
}

impl<T> fmt::Debug for SharedRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRef")
            .field("cell", &self.cell)
            .field("live", &self.live)
            .finish()
    }
}

impl RefcountMode {
    /// The adapter operation a wrapper performs for this mode in `role`.
    ///
    /// | mode          | parameter             | return              |
    /// |---------------|-----------------------|---------------------|
    /// | `TransferIn`  | `IncrementBeforeCall` | `IncrementBeforeCall` |
    /// | `TransferOut` | `AdoptReference`      | `AdoptReference`    |
    /// | `NonOwning`   | `Borrow`              | `IncrementReturned` |
    pub fn boundary_action(self, role: Role) -> BoundaryAction {
        match (self, role) {
            (RefcountMode::TransferIn, _) => BoundaryAction::IncrementBeforeCall,
            (RefcountMode::TransferOut, _) => BoundaryAction::AdoptReference,
            (RefcountMode::NonOwning, Role::Param(_)) => BoundaryAction::Borrow,
            (RefcountMode::NonOwning, Role::Return) => BoundaryAction::IncrementReturned,
        }
    }
}
