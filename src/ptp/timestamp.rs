//! PTP timestamp arithmetic.
//!
//! On the wire a PTP timestamp is 48-bit seconds + 32-bit nanoseconds, and
//! a `correctionField` is a signed 64-bit nanosecond value with 16
//! fractional bits. Internally everything collapses into a single signed
//! subnanosecond count, carried in a [`crate::wide::Wide128`] so
//! offset/delay computation never loses precision to intermediate
//! overflow. Arithmetic on timestamps is modular on subnanoseconds.

use std::ops::{Add, Sub};

use crate::wide::Wide128;

/// Sub-nanoseconds per nanosecond: a subnanosecond is 1/65536 of a
/// nanosecond.
pub const SUBNS_PER_NS: i128 = 1 << 16;
const NS_PER_SEC: i128 = 1_000_000_000;
const SECONDS_MASK: u64 = 0x0000_ffff_ffff_ffff;

/// A signed subnanosecond instant (or, via [`Sub`], a duration between
/// two instants).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord)]
pub struct Time(Wide128);

impl Time {
    pub const ZERO: Time = Time(Wide128::ZERO);

    pub fn from_subns(value: i128) -> Self {
        Time(Wide128::from_i128(value))
    }

    pub fn to_subns(self) -> i128 {
        self.0.to_i128()
    }

    /// Decode a PTP wire timestamp: 48-bit seconds, 32-bit nanoseconds.
    /// `frac` is an optional sub-nanosecond fraction this crate carries
    /// internally but that the standard 10-byte wire timestamp does not.
    pub fn from_wire(seconds: u64, nanos: u32, frac: u16) -> Self {
        let subns = (seconds as i128) * NS_PER_SEC * SUBNS_PER_NS
            + (nanos as i128) * SUBNS_PER_NS
            + frac as i128;
        Self::from_subns(subns)
    }

    /// Encode back to the wire triple, masking seconds to 48 bits.
    pub fn to_wire(self) -> (u64, u32, u16) {
        let subns = self.to_subns();
        let total_ns = subns.div_euclid(SUBNS_PER_NS);
        let frac = subns.rem_euclid(SUBNS_PER_NS) as u16;
        let seconds = (total_ns.div_euclid(NS_PER_SEC) as u64) & SECONDS_MASK;
        let nanos = total_ns.rem_euclid(NS_PER_SEC) as u32;
        (seconds, nanos, frac)
    }

    /// Decode an 8-byte big-endian `correctionField`: a signed 64-bit
    /// nanosecond count with 16 fractional bits, i.e. already a
    /// subnanosecond count, just narrower than `Time`'s internal width.
    /// This crate widens it without loss on decode; legal PTP correction
    /// magnitudes fit comfortably inside the wider internal range.
    pub fn correction_from_bytes(bytes: [u8; 8]) -> i128 {
        i64::from_be_bytes(bytes) as i128
    }

    pub fn correction_to_bytes(subns: i128) -> [u8; 8] {
        (subns.clamp(i64::MIN as i128, i64::MAX as i128) as i64).to_be_bytes()
    }

    pub fn add_correction(self, correction_subns: i128) -> Self {
        Time(self.0 + Wide128::from_i128(correction_subns))
    }
}

impl Add<i128> for Time {
    type Output = Time;
    fn add(self, rhs: i128) -> Time {
        Time(self.0 + Wide128::from_i128(rhs))
    }
}

impl Sub for Time {
    type Output = i128;
    fn sub(self, rhs: Time) -> i128 {
        (self.0 - rhs.0).to_i128()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip_preserves_seconds_and_nanos() {
        let t = Time::from_wire(1_700_000_000, 123_456_789, 0);
        let (s, n, f) = t.to_wire();
        assert_eq!(s, 1_700_000_000);
        assert_eq!(n, 123_456_789);
        assert_eq!(f, 0);
    }

    #[test]
    fn subtraction_yields_subnanosecond_duration() {
        let t1 = Time::from_wire(100, 0, 0);
        let t2 = Time::from_wire(100, 500, 0);
        assert_eq!(t2 - t1, 500 * SUBNS_PER_NS);
    }

    #[test]
    fn correction_field_round_trips_through_i64() {
        let corr = -123_456i128;
        let bytes = Time::correction_to_bytes(corr);
        assert_eq!(Time::correction_from_bytes(bytes), corr);
    }

    #[test]
    fn two_way_exchange_offset_matches_formula() {
        // Worked example: a 700ns forward leg and a 900ns return leg.
        let t1 = Time::from_wire(0, 1_000_000, 0);
        let t2 = Time::from_wire(0, 1_000_700, 0);
        let t3 = Time::from_wire(0, 2_000_000, 0);
        let t4 = Time::from_wire(0, 2_000_900, 0);
        let offset = ((t2 - t1) - (t4 - t3)) / 2;
        let delay = ((t2 - t1) + (t4 - t3)) / 2;
        assert_eq!(offset, ((700 - 900) * SUBNS_PER_NS) / 2);
        assert_eq!(delay, ((700 + 900) * SUBNS_PER_NS) / 2);
    }
}
