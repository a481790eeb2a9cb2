#![no_std]
#![forbid(unsafe_code)]

//! # Sensor Hub Queue
//!
//! Bounded FIFO of pool buffers. Crossing the empty, low, high and full
//! marks notifies a registered [`QueueListener`] after the critical section
//! has been left, so listeners may call back into the queue.

pub mod queue;

pub use queue::*;
