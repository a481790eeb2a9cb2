#![no_std]
#![forbid(unsafe_code)]

//! # Sensor Hub Packets
//!
//! Codec for the host-interface wire format. Sensor data, test data,
//! flush-complete markers and control requests/responses are formatted from
//! and parsed into the typed packets of [`local`], driven by the descriptor
//! tables in [`tables`]. Packets optionally end in a big-endian CRC-16.

#[cfg(feature = "std")]
extern crate std;

pub mod crc;
pub mod format;
pub mod header;
pub mod local;
pub mod parse;
pub mod tables;

pub use crc::*;
pub use format::*;
pub use header::{
    crc_flag, packet_id, packet_version, PacketId, CRC_SIZE, CTRL_PKT_HEADER_SIZE,
    MAX_HIF_PACKET_SIZE, PKT_BASE_HEADER_SIZE,
};
pub use local::*;
pub use parse::*;
pub use tables::*;
