//! Singleton guard
//!
//! A process-wide cell that is initialized at most once. The first callers
//! race for a mutex barrier; the winner runs the factory while the others
//! wait, and every caller gets the same instance. Once `Ready`, reads only
//! touch the `OnceLock`.
//!
//! There is no teardown: the instance lives as long as the slot.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

use tracing::debug;

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

/// Lifecycle of a [`SingletonSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No instance yet
    Uninitialized,
    /// A factory is running
    Initializing,
    /// The instance exists (terminal)
    Ready,
}

/// An at-most-once, process-wide instance cell.
///
/// # Example
///
/// ```
/// use ownbind::{SingletonSlot, SlotState};
///
/// static CONFIG: SingletonSlot<String> = SingletonSlot::new();
///
/// assert_eq!(CONFIG.state(), SlotState::Uninitialized);
/// let first = CONFIG.get_or_init(|| "one".to_string());
/// let second = CONFIG.get_or_init(|| "two".to_string());
/// assert!(std::ptr::eq(first, second));
/// assert_eq!(second, "one");
/// ```
#[derive(Debug)]
pub struct SingletonSlot<T> {
    state: AtomicU8,
    barrier: Mutex<()>,
    value: OnceLock<T>,
}

/// Puts the slot back to `Uninitialized` unless disarmed, so a factory
/// that panics or fails leaves the slot usable.
struct ResetOnUnwind<'a> {
    state: &'a AtomicU8,
    armed: bool,
}

impl ResetOnUnwind<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ResetOnUnwind<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.store(UNINITIALIZED, Ordering::Release);
        }
    }
}

impl<T> SingletonSlot<T> {
    /// An empty slot, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINITIALIZED),
            barrier: Mutex::new(()),
            value: OnceLock::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SlotState {
        match self.state.load(Ordering::Acquire) {
            READY => SlotState::Ready,
            INITIALIZING => SlotState::Initializing,
            _ => SlotState::Uninitialized,
        }
    }

    /// The instance, if initialized.
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    /// The instance, running `factory` if this is the first access.
    ///
    /// Concurrent first callers block until one factory has finished; the
    /// other factories never run. If the factory panics the slot returns to
    /// `Uninitialized` and the next caller tries again.
    pub fn get_or_init(&self, factory: impl FnOnce() -> T) -> &T {
        match self.try_get_or_init(|| Ok::<T, std::convert::Infallible>(factory())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`SingletonSlot::get_or_init`], with a fallible factory. An
    /// error leaves the slot `Uninitialized`.
    pub fn try_get_or_init<E>(&self, factory: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        let _barrier = self
            .barrier
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        self.state.store(INITIALIZING, Ordering::Release);
        let reset = ResetOnUnwind {
            state: &self.state,
            armed: true,
        };
        let created = factory()?;
        let value = self.value.get_or_init(|| created);
        reset.disarm();
        self.state.store(READY, Ordering::Release);
        debug!(type_name = std::any::type_name::<T>(), "singleton initialized");
        Ok(value)
    }
}

impl<T> Default for SingletonSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_states() {
        let slot = SingletonSlot::new();
        assert_eq!(slot.state(), SlotState::Uninitialized);
        assert!(slot.get().is_none());
        slot.get_or_init(|| 7);
        assert_eq!(slot.state(), SlotState::Ready);
        assert_eq!(slot.get(), Some(&7));
    }

    #[test]
    fn test_failed_factory_resets() {
        let slot: SingletonSlot<i32> = SingletonSlot::new();
        let err = slot.try_get_or_init(|| Err("no instance")).unwrap_err();
        assert_eq!(err, "no instance");
        assert_eq!(slot.state(), SlotState::Uninitialized);
        assert_eq!(*slot.try_get_or_init(|| Ok::<_, &str>(3)).unwrap(), 3);
    }

    #[test]
    fn test_panicking_factory_resets() {
        let slot: SingletonSlot<i32> = SingletonSlot::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            slot.get_or_init(|| panic!("factory failed"));
        }));
        assert!(result.is_err());
        assert_eq!(slot.state(), SlotState::Uninitialized);
        assert_eq!(*slot.get_or_init(|| 11), 11);
    }
}
