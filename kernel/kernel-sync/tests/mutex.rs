use kernel_sync::irq::{IrqGuard, interrupts_enabled};
use kernel_sync::SpinMutex;
use std::sync::Arc;
use std::thread;

#[test]
fn basic_lock_and_raii() {
    let l = SpinMutex::new(0_u32);

    // take the lock, mutate, and drop
    {
        let mut g = l.lock();
        *g = 41;
    }

    // lock again; previous drop must have unlocked
    {
        let mut g = l.lock();
        *g += 1;
        assert_eq!(*g, 42);
    }
}

#[test]
fn try_lock_semantics() {
    let l = SpinMutex::new(1_u8);

    // first try_lock should succeed
    let g1 = l.try_lock();
    assert!(g1.is_some());
    assert_eq!(**g1.as_ref().unwrap(), 1);

    // while held, try_lock must fail
    let g2 = l.try_lock();
    assert!(g2.is_none());

    // dropping the guard allows another try_lock
    drop(g1);
    let g3 = l.try_lock();
    assert!(g3.is_some());
}

#[test]
fn get_mut_allows_direct_mutation() {
    let mut l = SpinMutex::new(vec![1, 2, 3]);
    l.get_mut().push(4);
    assert_eq!(l.lock().as_slice(), &[1, 2, 3, 4]);
}

#[test]
fn contended_increments_from_threads() {
    let l = Arc::new(SpinMutex::new(0_u64));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let l = Arc::clone(&l);
        handles.push(thread::spawn(move || {
            for _ in 0..1000 {
                *l.lock() += 1;
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(*l.lock(), 4000);
}

#[test]
fn irq_guard_nesting_restores_outer_state() {
    let outer = IrqGuard::new();
    assert!(!interrupts_enabled());
    {
        let _inner = IrqGuard::new();
        assert!(!interrupts_enabled());
    }
    // The inner guard saw interrupts disabled, so its drop must not
    // re-enable them.
    assert!(!interrupts_enabled());
    drop(outer);
}

#[test]
fn lock_irq_masks_for_guard_lifetime() {
    let l = SpinMutex::new(7_u32);
    {
        let mut g = l.lock_irq();
        assert!(!interrupts_enabled());
        *g += 1;
    }
    assert_eq!(*l.lock(), 8);
}
