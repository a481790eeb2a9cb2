//! Block pool tests for sensorhub-mem

use proptest::prelude::*;
use sensorhub_core::HubError;
use sensorhub_mem::{BlockPool, PoolStats};

#[test]
fn test_pool_stats_creation() {
    let stats = PoolStats::new(10);
    assert_eq!(stats.total_blocks, 10);
    assert_eq!(stats.free_blocks, 10);
    assert_eq!(stats.used_blocks, 0);
    assert_eq!(stats.utilization(), 0);
}

#[test]
fn test_write_and_read_block() {
    let pool: BlockPool<128> = BlockPool::new();
    pool.init(10).unwrap();
    assert_eq!(pool.block_size(), 12);

    let block = pool.alloc().unwrap();
    pool.write(&block, &[1, 2, 3, 4, 5]).unwrap();

    let mut out = [0u8; 5];
    assert_eq!(pool.read(&block, &mut out).unwrap(), 5);
    assert_eq!(out, [1, 2, 3, 4, 5]);

    assert_eq!(
        pool.write(&block, &[0u8; 13]),
        Err(HubError::BufferTooSmall)
    );
    pool.free(block).unwrap();
}

#[test]
fn test_buffer_helpers() {
    let pool: BlockPool<64> = BlockPool::new();
    pool.init(16).unwrap();

    let buffer = pool.alloc_buffer(&[0xAA, 0xBB, 0xCC]).unwrap();
    assert_eq!(buffer.len(), 3);
    assert_eq!(pool.stats().used_blocks, 1);

    let mut out = [0u8; 16];
    assert_eq!(pool.read_buffer(&buffer, &mut out).unwrap(), 3);
    assert_eq!(&out[..3], &[0xAA, 0xBB, 0xCC]);

    let mut short = [0u8; 2];
    assert_eq!(
        pool.read_buffer(&buffer, &mut short),
        Err(HubError::BufferTooSmall)
    );

    pool.free_buffer(buffer).unwrap();
    assert!(pool.stats().is_idle());
}

#[test]
fn test_alloc_buffer_exhausted() {
    let pool: BlockPool<8> = BlockPool::new();
    pool.init(8).unwrap();
    let held = pool.alloc_buffer(&[1]).unwrap();
    assert_eq!(pool.alloc_buffer(&[2]), Err(HubError::MallocFailed));
    pool.free_buffer(held).unwrap();
}

#[test]
fn test_free_rejects_misaligned_block() {
    let eights: BlockPool<64> = BlockPool::new();
    eights.init(8).unwrap();
    let twelves: BlockPool<64> = BlockPool::new();
    twelves.init(12).unwrap();

    let _first = eights.alloc().unwrap();
    let second = eights.alloc().unwrap();
    assert_eq!(second.offset(), 8);

    // Offset 8 is not a 12-byte boundary.
    assert_eq!(twelves.free(second), Err(HubError::InvalidParameter));
    assert_eq!(twelves.stats().used_blocks, 0);
}

#[test]
fn test_free_rejects_out_of_range_block() {
    let large: BlockPool<256> = BlockPool::new();
    large.init(16).unwrap();
    let small: BlockPool<32> = BlockPool::new();
    small.init(16).unwrap();

    let mut last = None;
    for _ in 0..4 {
        last = large.alloc();
    }
    let block = last.unwrap();
    assert_eq!(block.offset(), 48);
    assert_eq!(small.free(block), Err(HubError::InvalidParameter));
}

#[derive(Debug, Clone)]
enum Op {
    Alloc,
    Free(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Alloc), (0usize..32).prop_map(Op::Free)]
}

proptest! {
    #[test]
    fn prop_used_never_exceeds_total(
        block_size in 1usize..40,
        ops in proptest::collection::vec(op_strategy(), 0..200),
    ) {
        let pool: BlockPool<512> = BlockPool::new();
        pool.init(block_size).unwrap();
        let total = pool.stats().total_blocks;
        let mut held = Vec::new();

        for op in ops {
            match op {
                Op::Alloc => match pool.alloc() {
                    Some(block) => held.push(block),
                    None => prop_assert_eq!(held.len(), total),
                },
                Op::Free(i) if !held.is_empty() => {
                    let block = held.swap_remove(i % held.len());
                    prop_assert!(pool.free(block).is_ok());
                }
                Op::Free(_) => {}
            }

            let stats = pool.stats();
            prop_assert!(stats.used_blocks <= stats.total_blocks);
            prop_assert_eq!(stats.used_blocks, held.len());
            prop_assert_eq!(stats.used_blocks + stats.free_blocks, total);
            prop_assert!(stats.min_free_blocks <= stats.free_blocks);
        }

        let mut offsets: Vec<usize> = held.iter().map(|b| b.offset()).collect();
        offsets.sort_unstable();
        offsets.dedup();
        prop_assert_eq!(offsets.len(), held.len());
    }
}
