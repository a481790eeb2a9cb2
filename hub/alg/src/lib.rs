#![no_std]
#![forbid(unsafe_code)]

//! # Sensor Hub Algorithms
//!
//! Step segmentation and step detection for pedometer-style sensors.
//!
//! - [`StepSegmenter`] consumes a filtered accelerometer norm with
//!   timestamps and reports step boundaries to a [`SegmentListener`].
//! - [`StepDetector`] filters raw accelerometer samples, drives a segmenter
//!   and keeps running step counts for a [`StepListener`].

#[cfg(feature = "std")]
extern crate std;

pub mod step_detector;
pub mod step_segmenter;

pub use step_detector::*;
pub use step_segmenter::*;
