//! Cross-thread hammering of one pool through its gate: every live
//! allocation is stamped with its owner's pattern, and the stamp must
//! survive until that owner frees it. Overlapping allocations or a
//! broken gate would tear the stamps.

use libkernel::kernel::pool::Pool;
use std::thread;

#[repr(align(4096))]
struct Arena([u8; 0x40000]);

#[test]
fn no_live_allocations_overlap_under_contention() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 200;

    let region = &mut Box::leak(Box::new(Arena([0_u8; 0x40000]))).0[..];
    let pool = Pool::create("hammer", region, 0x200, true).unwrap();

    thread::scope(|scope| {
        for thread_id in 0..THREADS {
            let pool = &pool;
            scope.spawn(move || {
                let stamp = 0x10 + thread_id as u8;
                for round in 0..ROUNDS {
                    let units = 1 + (round + thread_id) % 3;
                    let Ok(block) = pool.allocate(units) else {
                        continue;
                    };
                    let bytes = unsafe {
                        std::slice::from_raw_parts_mut(pool.block_ptr(&block), units * 0x200)
                    };
                    bytes.fill(stamp);
                    thread::yield_now();
                    assert!(
                        bytes.iter().all(|&b| b == stamp),
                        "allocation shared with another thread"
                    );
                    pool.free(block, true).unwrap();
                }
            });
        }
    });

    assert_eq!(pool.occupied(), 0, "every allocation was returned");
}

#[test]
fn round_trips_preserve_occupancy_across_threads() {
    let region = &mut Box::leak(Box::new(Arena([0_u8; 0x40000]))).0[..];
    let pool = Pool::create("balance", region, 0x1000, true).unwrap();

    let base = pool.allocate(2).unwrap();
    let baseline = pool.occupied();

    thread::scope(|scope| {
        for _ in 0..3 {
            let pool = &pool;
            scope.spawn(move || {
                for _ in 0..100 {
                    let block = pool.allocate(1).unwrap();
                    pool.free(block, false).unwrap();
                }
            });
        }
    });

    assert_eq!(pool.occupied(), baseline);
    pool.free(base, false).unwrap();
    assert_eq!(pool.occupied(), 0);
}
