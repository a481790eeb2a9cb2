#![no_std]
#![forbid(unsafe_code)]

//! # Sensor Hub Memory
//!
//! Fixed-block pools backing the host-interface packet queues. Blocks are
//! carved out of a static arena and handed out as move-only handles, so a
//! block is owned by exactly one holder at a time.

pub mod pool;

pub use pool::*;

/// Block pool statistics for debugging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of blocks in the pool
    pub total_blocks: usize,
    /// Number of blocks currently available
    pub free_blocks: usize,
    /// Number of blocks currently handed out
    pub used_blocks: usize,
    /// Lowest number of free blocks seen since init
    pub min_free_blocks: usize,
}

impl PoolStats {
    /// Statistics for a freshly formatted pool
    pub const fn new(total_blocks: usize) -> Self {
        Self {
            total_blocks,
            free_blocks: total_blocks,
            used_blocks: 0,
            min_free_blocks: total_blocks,
        }
    }

    pub(crate) fn record_alloc(&mut self) {
        self.used_blocks += 1;
        self.free_blocks -= 1;
        if self.free_blocks < self.min_free_blocks {
            self.min_free_blocks = self.free_blocks;
        }
    }

    pub(crate) fn record_free(&mut self) {
        if self.used_blocks > 0 {
            self.used_blocks -= 1;
            self.free_blocks += 1;
        }
    }

    /// No block left to allocate
    pub const fn is_exhausted(&self) -> bool {
        self.free_blocks == 0
    }

    /// Every block is back in the pool
    pub const fn is_idle(&self) -> bool {
        self.used_blocks == 0
    }

    /// Used blocks as a percentage (0-100)
    pub fn utilization(&self) -> u8 {
        if self.total_blocks == 0 {
            0
        } else {
            ((self.used_blocks * 100) / self.total_blocks) as u8
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PoolStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "PoolStats{{ total: {}, free: {}, used: {}, min_free: {} }}",
            self.total_blocks,
            self.free_blocks,
            self.used_blocks,
            self.min_free_blocks
        );
    }
}
