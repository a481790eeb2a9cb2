#![no_std]
#![forbid(unsafe_code)]

//! # Sensor Hub Configuration
//!
//! Handles control requests from the host: the request is parsed, checked
//! against the current [`BatchState`](sensorhub_batch::BatchState), applied
//! to the batch manager or a sensor descriptor, and answered through the
//! control response queue with a status code or the requested data.

#[cfg(feature = "std")]
extern crate std;

pub mod descriptor;
pub mod manager;

pub use descriptor::*;
pub use manager::*;
