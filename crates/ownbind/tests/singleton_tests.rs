//! Singleton guard tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use ownbind::*;
use pretty_assertions::assert_eq;

#[derive(Debug)]
struct SingletonClass {
    created_by: usize,
}

#[test]
fn test_concurrent_first_calls_share_one_instance() {
    const THREADS: usize = 16;

    let slot: Arc<SingletonSlot<SingletonClass>> = Arc::new(SingletonSlot::new());
    let runs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|i| {
            let slot = Arc::clone(&slot);
            let runs = Arc::clone(&runs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                let instance = slot.get_or_init(|| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    thread::yield_now();
                    SingletonClass { created_by: i }
                });
                (instance as *const SingletonClass as usize, instance.created_by)
            })
        })
        .collect();

    let seen: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(seen.iter().all(|s| *s == seen[0]));

    let instance = slot.get().unwrap();
    assert_eq!(instance as *const SingletonClass as usize, seen[0].0);
    assert_eq!(slot.state(), SlotState::Ready);
}

#[test]
fn test_static_slot() {
    static SLOT: SingletonSlot<Vec<u8>> = SingletonSlot::new();

    let first = SLOT.get_or_init(|| vec![1, 2, 3]);
    let second = SLOT.get_or_init(Vec::new);
    assert!(std::ptr::eq(first, second));
    assert_eq!(second, &vec![1, 2, 3]);
}

#[test]
fn test_failed_factory_allows_retry() {
    let slot = SingletonSlot::<u32>::default();
    let err = slot.try_get_or_init(|| Err::<u32, &str>("no instance")).unwrap_err();
    assert_eq!(err, "no instance");
    assert_eq!(slot.state(), SlotState::Uninitialized);
    assert!(slot.get().is_none());

    assert_eq!(*slot.try_get_or_init(|| Ok::<u32, &str>(5)).unwrap(), 5);
    assert_eq!(*slot.try_get_or_init(|| Err::<u32, &str>("late")).unwrap(), 5);
}

#[test]
fn test_panicking_factory_allows_retry() {
    let slot = Arc::new(SingletonSlot::<String>::new());

    let panicking = {
        let slot = Arc::clone(&slot);
        thread::spawn(move || {
            slot.get_or_init(|| panic!("factory failed"));
        })
    };
    assert!(panicking.join().is_err());
    assert_eq!(slot.state(), SlotState::Uninitialized);

    assert_eq!(slot.get_or_init(|| "second".to_string()), "second");
    assert_eq!(slot.state(), SlotState::Ready);
}

#[test]
fn test_guard_follows_accessor_plan() {
    let ctx = ClassifyContext::default();
    let source = r#"
        /// -#- is_singleton=true -#-
        struct SingletonClass;
        impl SingletonClass {
            fn GetInstance() -> *mut SingletonClass {}
        }
    "#;
    let catalog = RustFrontend::new().parse(source, &ctx).unwrap();
    let report = Synthesizer::new(&catalog, &ctx).report();
    let plan = report.plan("SingletonClass::GetInstance").unwrap();
    assert_eq!(plan.return_action(), Some(BoundaryAction::SingletonGuard));

    static INSTANCE: SingletonSlot<SingletonClass> = SingletonSlot::new();
    let a = INSTANCE.get_or_init(|| SingletonClass { created_by: 0 });
    let b = INSTANCE.get_or_init(|| SingletonClass { created_by: 1 });
    assert!(std::ptr::eq(a, b));
    assert_eq!(b.created_by, 0);
}
