//! # Process-Wide Pool Tests
//!
//! The global slot is shared by every test in this binary, so the whole
//! lifecycle runs as one ordered test.

use segpool_core::{global, PoolConfig, PoolError};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Runs a global call on its own thread and waits at most two seconds.
fn within_deadline<T: Send + 'static>(op: fn() -> T) -> Option<T> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(op());
    });
    rx.recv_timeout(Duration::from_secs(2)).ok()
}

#[test]
fn global_pool_lifecycle() {
    // ========================================================================
    // Before init
    // ========================================================================
    assert!(!global::is_initialized());
    assert_eq!(global::allocate(10), Err(PoolError::NotInitialized));
    assert_eq!(global::teardown(), Err(PoolError::NotInitialized));

    // ========================================================================
    // Init
    // ========================================================================
    assert!(matches!(
        global::init(PoolConfig::new(0, 0, 64, 8, 6)),
        Err(PoolError::InvalidArgument(_))
    ));
    assert!(!global::is_initialized());

    global::init(PoolConfig::new(0, 8, 64, 8, 6)).unwrap();
    assert!(global::is_initialized());
    assert_eq!(global::init_default(), Err(PoolError::AlreadyInitialized));

    // ========================================================================
    // Use
    // ========================================================================
    let handle = global::allocate(10).unwrap();
    global::lock(handle).unwrap()[..3].copy_from_slice(b"abc");
    assert_eq!(&global::lock(handle).unwrap()[..3], b"abc");
    global::release(handle).unwrap();
    global::release(None).unwrap();
    assert_eq!(global::snapshot().unwrap().buckets[0], vec![0]);

    let again = global::allocate(10).unwrap();
    assert_eq!(again.slot(), handle.slot());
    global::release(again).unwrap();
    global::teardown().unwrap();
    assert!(!global::is_initialized());

    // ========================================================================
    // Waiting on a block lock leaves the global slot free
    // ========================================================================
    global::init_default().unwrap();
    let contended = global::allocate(100_000).unwrap();
    let mut guard = global::lock(contended).unwrap();
    let waiter = thread::spawn(move || global::lock(contended).map(|payload| payload[0]));
    thread::sleep(Duration::from_millis(100));

    assert_eq!(within_deadline(global::init_default), Some(Err(PoolError::AlreadyInitialized)));
    assert!(matches!(within_deadline(global::snapshot), Some(Ok(_))));

    // ========================================================================
    // Teardown with a block still held (and locked)
    // ========================================================================
    assert_eq!(
        within_deadline(global::teardown),
        Some(Err(PoolError::OutstandingBlocks { count: 1 }))
    );
    assert!(!global::is_initialized());
    assert!(matches!(within_deadline(global::snapshot), Some(Err(PoolError::NotInitialized))));

    // The waiter still gets the payload once the guard is dropped.
    guard[0] = 0x5A;
    drop(guard);
    assert_eq!(waiter.join().unwrap(), Ok(0x5A));
}
