//! Fixed-point time and precision types

use fixed::types::{I40F24, I8F24};

/// Time in seconds, Q24 fraction in a 64-bit container
pub type NtTime = I40F24;

/// Sensor value with 24 fractional bits in a 32-bit container
pub type NtPrecise = I8F24;

/// Number of fractional bits shared by [`NtTime`] and [`NtPrecise`]
pub const Q24_SHIFT: u32 = 24;

/// One second in nanoseconds
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Convert a Q24 time to nanoseconds, saturating at zero for negative times
pub fn nt_time_to_nanos(t: NtTime) -> u64 {
    if t <= NtTime::ZERO {
        return 0;
    }
    let bits = t.to_bits() as u128;
    ((bits * NANOS_PER_SECOND as u128) >> Q24_SHIFT) as u64
}

/// Convert nanoseconds to Q24 time
pub fn nanos_to_nt_time(nanos: u64) -> NtTime {
    let bits = ((nanos as u128) << Q24_SHIFT) / NANOS_PER_SECOND as u128;
    NtTime::from_bits(bits as i64)
}
