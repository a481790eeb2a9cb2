//! Fixed-size block pool with an index-linked free list

use core::cell::RefCell;

use critical_section::Mutex;
use sensorhub_core::{HubError, HubResult};

use crate::PoolStats;

/// Marks the end of the free list
const END_OF_LIST: u32 = u32::MAX;

/// Bytes of a free block used to store the index of the next free block
const LINK_BYTES: usize = 4;

/// Round a requested block size up to the pool's 4-byte granularity
pub const fn round_block_size(size: usize) -> usize {
    (size + (LINK_BYTES - 1)) & !(LINK_BYTES - 1)
}

/// Handle to a block owned by the holder
///
/// Handles are neither `Clone` nor `Copy`; giving one back to
/// [`BlockPool::free`] consumes it, so the same allocation cannot be freed
/// twice through safe code.
#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    offset: usize,
}

impl Block {
    /// Byte offset of the block inside its pool's arena
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// A pool block carrying a packet of `len` bytes
#[derive(Debug, PartialEq, Eq)]
pub struct Buffer {
    block: Block,
    len: usize,
}

impl Buffer {
    pub fn new(block: Block, len: usize) -> Self {
        Self { block, len }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Number of valid bytes in the block
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Give up the length header and return the underlying block
    pub fn into_block(self) -> Block {
        self.block
    }
}

struct PoolInner<const BYTES: usize> {
    arena: [u8; BYTES],
    block_size: usize,
    free_head: u32,
    stats: PoolStats,
}

impl<const BYTES: usize> PoolInner<BYTES> {
    const fn new() -> Self {
        Self {
            arena: [0; BYTES],
            block_size: 0,
            free_head: END_OF_LIST,
            stats: PoolStats::new(0),
        }
    }

    fn format(&mut self, block_size: usize) {
        let total = BYTES / block_size;
        self.block_size = block_size;
        self.stats = PoolStats::new(total);
        for index in 0..total {
            let next = if index + 1 < total {
                (index + 1) as u32
            } else {
                END_OF_LIST
            };
            self.write_link(index as u32, next);
        }
        self.free_head = if total > 0 { 0 } else { END_OF_LIST };
    }

    fn read_link(&self, index: u32) -> u32 {
        let start = index as usize * self.block_size;
        let mut word = [0u8; LINK_BYTES];
        word.copy_from_slice(&self.arena[start..start + LINK_BYTES]);
        u32::from_le_bytes(word)
    }

    fn write_link(&mut self, index: u32, next: u32) {
        let start = index as usize * self.block_size;
        self.arena[start..start + LINK_BYTES].copy_from_slice(&next.to_le_bytes());
    }

    fn index_of(&self, block: &Block) -> HubResult<u32> {
        if self.block_size == 0 {
            return Err(HubError::InvalidParameter);
        }
        let limit = self.stats.total_blocks * self.block_size;
        if block.offset >= limit || block.offset % self.block_size != 0 {
            return Err(HubError::InvalidParameter);
        }
        Ok((block.offset / self.block_size) as u32)
    }

    fn bytes_mut(&mut self, block: &Block) -> HubResult<&mut [u8]> {
        self.index_of(block)?;
        let start = block.offset;
        Ok(&mut self.arena[start..start + self.block_size])
    }
}

/// Pool of equally sized blocks carved out of a `BYTES` byte arena
///
/// The pool header lives outside the arena, so a pool holds
/// `BYTES / round_block_size(block_size)` blocks.
pub struct BlockPool<const BYTES: usize> {
    inner: Mutex<RefCell<PoolInner<BYTES>>>,
}

impl<const BYTES: usize> BlockPool<BYTES> {
    /// Create an unformatted pool; call [`BlockPool::init`] before use
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(PoolInner::new())),
        }
    }

    /// Split the arena into blocks of `block_size` bytes (rounded up to 4)
    ///
    /// Fails with `InvalidParameter` when the size is zero, does not fit the
    /// arena, or blocks from a previous format are still handed out.
    pub fn init(&self, block_size: usize) -> HubResult<()> {
        let rounded = round_block_size(block_size);
        if block_size == 0 || rounded > BYTES {
            return Err(HubError::InvalidParameter);
        }

        critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            if pool.stats.used_blocks > 0 {
                return Err(HubError::InvalidParameter);
            }
            pool.format(rounded);
            Ok(())
        })
    }

    /// Take a block from the free list, `None` when exhausted
    pub fn alloc(&self) -> Option<Block> {
        critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            if pool.free_head == END_OF_LIST {
                return None;
            }
            let index = pool.free_head;
            pool.free_head = pool.read_link(index);
            pool.stats.record_alloc();
            Some(Block {
                offset: index as usize * pool.block_size,
            })
        })
    }

    /// Return a block to the free list
    ///
    /// A block whose offset is outside this pool or not on a block boundary
    /// is rejected with `InvalidParameter`.
    pub fn free(&self, block: Block) -> HubResult<()> {
        critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            let index = pool.index_of(&block)?;
            let head = pool.free_head;
            pool.write_link(index, head);
            pool.free_head = index;
            pool.stats.record_free();
            Ok(())
        })
    }

    /// Copy `bytes` to the start of an owned block
    pub fn write(&self, block: &Block, bytes: &[u8]) -> HubResult<()> {
        self.with_block(block, |data| {
            if bytes.len() > data.len() {
                return Err(HubError::BufferTooSmall);
            }
            data[..bytes.len()].copy_from_slice(bytes);
            Ok(())
        })?
    }

    /// Copy the start of an owned block into `out`, returning the bytes copied
    pub fn read(&self, block: &Block, out: &mut [u8]) -> HubResult<usize> {
        self.with_block(block, |data| {
            let n = out.len().min(data.len());
            out[..n].copy_from_slice(&data[..n]);
            n
        })
    }

    /// Run `f` over the bytes of an owned block inside the critical section
    pub fn with_block<R>(&self, block: &Block, f: impl FnOnce(&mut [u8]) -> R) -> HubResult<R> {
        critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            let data = pool.bytes_mut(block)?;
            Ok(f(data))
        })
    }

    /// Allocate a block and fill it with a packet
    pub fn alloc_buffer(&self, packet: &[u8]) -> HubResult<Buffer> {
        let block = self.alloc().ok_or(HubError::MallocFailed)?;
        if let Err(err) = self.write(&block, packet) {
            self.free(block)?;
            return Err(err);
        }
        Ok(Buffer::new(block, packet.len()))
    }

    /// Copy a buffer's packet into `out`
    pub fn read_buffer(&self, buffer: &Buffer, out: &mut [u8]) -> HubResult<usize> {
        if out.len() < buffer.len() {
            return Err(HubError::BufferTooSmall);
        }
        self.with_block(buffer.block(), |data| {
            out[..buffer.len()].copy_from_slice(&data[..buffer.len()]);
            buffer.len()
        })
    }

    /// Release a buffer's block
    pub fn free_buffer(&self, buffer: Buffer) -> HubResult<()> {
        self.free(buffer.into_block())
    }

    /// Rounded size of each block, 0 before init
    pub fn block_size(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).block_size)
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        critical_section::with(|cs| self.inner.borrow_ref(cs).stats)
    }
}

impl<const BYTES: usize> Default for BlockPool<BYTES> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_rounding() {
        assert_eq!(round_block_size(1), 4);
        assert_eq!(round_block_size(4), 4);
        assert_eq!(round_block_size(42), 44);
    }

    #[test]
    fn test_alloc_until_exhausted() {
        let pool: BlockPool<64> = BlockPool::new();
        pool.init(16).unwrap();
        assert_eq!(pool.stats().total_blocks, 4);

        let blocks: [Block; 4] = core::array::from_fn(|_| pool.alloc().unwrap());
        assert!(pool.alloc().is_none());
        assert!(pool.stats().is_exhausted());
        assert_eq!(pool.stats().min_free_blocks, 0);

        for block in blocks {
            pool.free(block).unwrap();
        }
        assert!(pool.stats().is_idle());
    }

    #[test]
    fn test_alloc_before_init() {
        let pool: BlockPool<64> = BlockPool::new();
        assert!(pool.alloc().is_none());
        assert_eq!(pool.stats().total_blocks, 0);
    }

    #[test]
    fn test_init_rejects_bad_sizes() {
        let pool: BlockPool<16> = BlockPool::new();
        assert_eq!(pool.init(0), Err(HubError::InvalidParameter));
        assert_eq!(pool.init(17), Err(HubError::InvalidParameter));
    }

    #[test]
    fn test_reinit_with_blocks_outstanding() {
        let pool: BlockPool<32> = BlockPool::new();
        pool.init(8).unwrap();
        let block = pool.alloc().unwrap();
        assert_eq!(pool.init(4), Err(HubError::InvalidParameter));
        pool.free(block).unwrap();
        pool.init(4).unwrap();
        assert_eq!(pool.stats().total_blocks, 8);
    }

    #[test]
    fn test_free_is_lifo() {
        let pool: BlockPool<32> = BlockPool::new();
        pool.init(8).unwrap();
        let first = pool.alloc().unwrap();
        let offset = first.offset();
        pool.free(first).unwrap();
        assert_eq!(pool.alloc().unwrap().offset(), offset);
    }
}
