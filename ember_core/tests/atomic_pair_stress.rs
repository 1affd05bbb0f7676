//! Concurrent readers must never observe a torn pair.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use ember_core::{AtomicPair, AtomicPair32};

const RELATION: u64 = 0x9E37_79B9_7F4A_7C15;

fn related(first: u64) -> u64 {
    first.wrapping_mul(RELATION)
}

#[test]
fn test_readers_never_see_torn_pairs() {
    let pair = Arc::new(AtomicPair::new(0, related(0)));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let pair = Arc::clone(&pair);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut observed = 0u64;
                while !done.load(Ordering::Acquire) {
                    let (first, second) = pair.load();
                    assert_eq!(second, related(first), "torn read at {first}");
                    observed += 1;
                }
                observed
            })
        })
        .collect();

    for i in 1..50_000u64 {
        pair.store(i, related(i));
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert_eq!(pair.load(), (49_999, related(49_999)));
}

#[test]
fn test_concurrent_writers_serialize() {
    let pair = Arc::new(AtomicPair::new(0, 0));

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let pair = Arc::clone(&pair);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    pair.update(|first, second| (first + 1, second + 2));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(pair.load(), (40_000, 80_000));
}

#[test]
fn test_pair32_readers_see_whole_values() {
    let pair = Arc::new(AtomicPair32::new(0, 0));
    let writer = {
        let pair = Arc::clone(&pair);
        thread::spawn(move || {
            for i in 1..100_000u32 {
                pair.store(i, !i);
            }
        })
    };

    for _ in 0..100_000 {
        let (first, second) = pair.load();
        if first != 0 {
            assert_eq!(second, !first);
        }
    }
    writer.join().unwrap();
}
