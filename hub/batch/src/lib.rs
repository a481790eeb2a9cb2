#![no_std]
#![forbid(unsafe_code)]

//! # Sensor Hub Batching
//!
//! The batch manager owns the wakeup, non-wakeup and control-response
//! queues with their packet pools. Sensors register a period and report
//! latency; queue high thresholds follow from the shortest latency, and
//! the [`HubSignals`] register tells the host which queue to drain next.
//!
//! [`BatchState`] tracks the protocol mode and decides which control
//! commands may run in it.

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod manager;
pub mod onchange;
pub mod signals;
pub mod state;

pub use config::{BatchConfig, BatchConfigBuilder};
pub use manager::*;
pub use onchange::{OnChangeCache, NUM_ONCHANGE_NONWAKEUP_SENSOR};
pub use signals::*;
pub use state::*;
