//! Refcount adapter and owned-handle tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use ownbind::*;
use pretty_assertions::assert_eq;

/// A refcounted object that records its destruction.
fn counted(destroyed: &Arc<AtomicUsize>) -> Arc<RefcountCell<String>> {
    let destroyed = Arc::clone(destroyed);
    Arc::new(RefcountCell::with_destroy("zbr".to_string(), move |_| {
        destroyed.fetch_add(1, Ordering::SeqCst);
    }))
}

// ═══════════════════════════════════════════════════════════════════════
// Acquire / Release Pairing
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_destroyed_after_last_release_only() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let cell = counted(&destroyed);
    let creator = SharedRef::adopt(Arc::clone(&cell));

    let handles: Vec<_> = (0..3)
        .map(|_| SharedRef::acquire(&cell).unwrap())
        .collect();
    assert_eq!(cell.count(), 4);

    for handle in handles {
        assert!(matches!(handle.release().unwrap(), Decrement::Live(_)));
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    }
    assert_eq!(creator.release().unwrap(), Decrement::Destroyed);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(cell.is_destroyed());
}

#[test]
fn test_interleaved_threads_destroy_exactly_once() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;

    for _ in 0..20 {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let cell = counted(&destroyed);
        let creator = SharedRef::adopt(Arc::clone(&cell));
        let start = Arc::new(Barrier::new(THREADS));

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    let mut held = Vec::with_capacity(ROUNDS);
                    for i in 0..ROUNDS {
                        held.push(SharedRef::acquire(&cell).unwrap());
                        if i % 3 == 0 {
                            drop(held.pop());
                        }
                    }
                    held
                })
            })
            .collect();

        let mut survivors = Vec::new();
        for worker in workers {
            survivors.extend(worker.join().unwrap());
        }
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
        assert_eq!(cell.count(), survivors.len() + 1);

        drop(creator);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);

        // Release the rest concurrently
        let chunks: Vec<Vec<SharedRef<String>>> = {
            let mut chunks: Vec<Vec<_>> = (0..THREADS).map(|_| Vec::new()).collect();
            for (i, handle) in survivors.into_iter().enumerate() {
                chunks[i % THREADS].push(handle);
            }
            chunks
        };
        let releasers: Vec<_> = chunks
            .into_iter()
            .map(|chunk| thread::spawn(move || drop(chunk)))
            .collect();
        for releaser in releasers {
            releaser.join().unwrap();
        }

        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(cell.is_destroyed());
    }
}

#[test]
fn test_no_acquire_after_destruction() {
    let cell = Arc::new(RefcountCell::new(7u32));
    assert_eq!(cell.decrement().unwrap(), Decrement::Destroyed);
    assert!(matches!(
        SharedRef::acquire(&cell),
        Err(RefcountError::Released { .. })
    ));
    assert!(cell.with(|v| *v).is_err());
}

#[test]
fn test_double_release_is_underflow() {
    let cell = RefcountCell::new(());
    cell.decrement().unwrap();
    assert!(matches!(
        cell.decrement(),
        Err(RefcountError::RefcountUnderflow { .. })
    ));
    assert_eq!(cell.count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════
// Boundary Modes
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_transfer_in_keeps_caller_handle() {
    let mine = SharedRef::new("zbr".to_string());
    // IncrementBeforeCall: the callee consumes the extra reference
    mine.transfer_in().unwrap();
    assert_eq!(mine.count(), 2);

    let callees = SharedRef::adopt(Arc::clone(mine.cell()));
    drop(callees);
    assert_eq!(mine.count(), 1);
    assert_eq!(mine.with(String::len).unwrap(), 3);
}

#[test]
fn test_transfer_out_adopts_without_increment() {
    let native = Arc::new(RefcountCell::new(1u8));
    // AdoptReference: the returned reference becomes the wrapper's
    let wrapper = SharedRef::adopt(Arc::clone(&native));
    assert_eq!(native.count(), 1);
    drop(wrapper);
    assert!(native.is_destroyed());
}

#[test]
fn test_non_owning_return_increments() {
    let owner = SharedRef::new(1u8);
    // IncrementReturned: the wrapper takes its own reference
    let peeked = SharedRef::acquire(owner.cell()).unwrap();
    assert_eq!(owner.count(), 2);
    drop(owner);
    assert_eq!(peeked.with(|v| *v).unwrap(), 1);
}

#[test]
fn test_mode_actions() {
    assert_eq!(
        RefcountMode::TransferIn.boundary_action(Role::Param(0)),
        BoundaryAction::IncrementBeforeCall
    );
    assert_eq!(
        RefcountMode::TransferOut.boundary_action(Role::Return),
        BoundaryAction::AdoptReference
    );
    assert_eq!(
        RefcountMode::NonOwning.boundary_action(Role::Param(0)),
        BoundaryAction::Borrow
    );
    assert_eq!(
        RefcountMode::NonOwning.boundary_action(Role::Return),
        BoundaryAction::IncrementReturned
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Owned Handles
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_owned_transfer_invalidates_handle() {
    let handle = OwnedHandle::new(vec![1, 2, 3]);
    let taken = handle.transfer().unwrap();
    assert_eq!(taken, vec![1, 2, 3]);
    assert!(!handle.is_valid());

    assert!(matches!(handle.transfer(), Err(RefcountError::Released { .. })));
    assert!(matches!(handle.release(), Err(RefcountError::Released { .. })));
    assert!(handle.with(Vec::len).is_err());
}

#[test]
fn test_owned_release_once() {
    let handle = OwnedHandle::new(String::from("foo"));
    handle.with_mut(|s| s.push('!')).unwrap();
    assert_eq!(handle.with(|s| s.clone()).unwrap(), "foo!");
    handle.release().unwrap();
    assert!(handle.release().is_err());
}

#[test]
fn test_registry_surplus_reference() {
    let registry = WrapperRegistry::new();
    let native = Arc::new(RefcountCell::new(0u8));
    let address = WrapperRegistry::address_of(Arc::as_ptr(&native));

    // First return: a new wrapper adopts the reference
    let first = registry.lookup_or_register(address);
    assert!(!first.must_release_surplus(BoundaryAction::AdoptReference));
    let wrapper = SharedRef::adopt(Arc::clone(&native));

    // Same pointer again: the native side handed out one more reference
    native.increment().unwrap();
    let second = registry.lookup_or_register(address);
    assert_eq!(second.id(), first.id());
    if second.must_release_surplus(BoundaryAction::AdoptReference) {
        native.decrement().unwrap();
    }
    assert_eq!(wrapper.count(), 1);
}
