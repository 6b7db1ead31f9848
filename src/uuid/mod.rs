//! UUIDv7: a 128-bit, time-ordered identifier.
//!
//! Layout: bytes 0..6 are a big-endian Unix-ms timestamp, byte 6's upper
//! nibble is the version (7), byte 8's upper two bits are the variant
//! (`0b10`), and the remaining 74 bits are random. Printed as the usual
//! `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` lowercase hyphenated form.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

use crate::common::error::{Error, Result};

/// A UUIDv7 value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UuidV7([u8; 16]);

fn write_be(dst: &mut [u8], value: u64, n: usize) {
    for (i, byte) in dst.iter_mut().take(n).enumerate() {
        *byte = (value >> (8 * (n - i - 1))) as u8;
    }
}

impl UuidV7 {
    /// Pack a timestamp and two random fields into a well-formed UUIDv7,
    /// setting the version and variant bits. Exposed so callers that
    /// already have a millisecond timestamp and entropy source (e.g. a
    /// reproducible test) can construct one directly.
    pub fn package(timestamp_ms: u64, rand_a: u64, rand_b: u64) -> Self {
        let mut bytes = [0u8; 16];
        write_be(&mut bytes[0..6], timestamp_ms, 6);
        write_be(&mut bytes[6..8], rand_a, 2);
        write_be(&mut bytes[8..16], rand_b, 8);

        bytes[6] = (bytes[6] & 0x0f) | (7 << 4);
        bytes[8] = (bytes[8] & 0x3f) | (2 << 6);

        UuidV7(bytes)
    }

    /// Generate a new UUIDv7 from the current wall-clock time.
    pub fn generate() -> Result<Self> {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Error::InvalidArgument("system clock before unix epoch".into()))?
            .as_millis() as u64;

        let mut rng = rand::thread_rng();
        let rand_a = rng.next_u64();
        let rand_b = rng.next_u64();

        Ok(Self::package(timestamp_ms, rand_a, rand_b))
    }

    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Build a `UuidV7` from raw bytes, without touching the version or
    /// variant bits. Used when reading a value back from a B-tree cell.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        UuidV7(bytes)
    }

    /// Parse the canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form.
    pub fn parse(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 16];
        let mut out = 0;

        for part in s.split('-') {
            let part = part.as_bytes();
            if part.len() % 2 != 0 {
                return Err(Error::InvalidArgument(format!("malformed uuid string: {s:?}")));
            }
            for pair in part.chunks(2) {
                if out >= 16 {
                    return Err(Error::InvalidArgument(format!("malformed uuid string: {s:?}")));
                }
                let hi = (pair[0] as char)
                    .to_digit(16)
                    .ok_or_else(|| Error::InvalidArgument(format!("malformed uuid string: {s:?}")))?;
                let lo = (pair[1] as char)
                    .to_digit(16)
                    .ok_or_else(|| Error::InvalidArgument(format!("malformed uuid string: {s:?}")))?;
                bytes[out] = (hi as u8) << 4 | lo as u8;
                out += 1;
            }
        }

        if out != 16 {
            return Err(Error::InvalidArgument(format!("malformed uuid string: {s:?}")));
        }

        Ok(UuidV7(bytes))
    }
}

impl fmt::Display for UuidV7 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A deterministic stand-in for [`UuidV7::generate`], so tests don't
    /// depend on wall-clock time or randomness. Mirrors the counter-keyed
    /// `uuid_v8_package` test helper this is grounded on, adjusted to
    /// still carry the v7 tag so downstream version checks hold.
    fn deterministic(counter: u32) -> UuidV7 {
        UuidV7::package(0, counter as u64, u64::MAX)
    }

    #[test]
    fn version_and_variant_bits() {
        let id = UuidV7::generate().unwrap();
        assert_eq!(id.as_bytes()[6] >> 4, 7);
        assert_eq!(id.as_bytes()[8] >> 6, 0b10);
    }

    #[test]
    fn print_parse_roundtrip() {
        let id = UuidV7::generate().unwrap();
        let printed = id.to_string();
        assert_eq!(printed.len(), 36);
        let parsed = UuidV7::parse(&printed).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn deterministic_values_are_ordered_by_counter() {
        let a = deterministic(1);
        let b = deterministic(2);
        assert!(a.as_bytes()[6..8] < b.as_bytes()[6..8]);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(UuidV7::parse("not-a-uuid").is_err());
        assert!(UuidV7::parse("").is_err());
        assert!(UuidV7::parse("00000000-0000-0000-0000-00000000000").is_err());
    }

    proptest::proptest! {
        #[test]
        fn package_roundtrips_through_print_parse(a: u64, b: u64, c: u64) {
            let id = UuidV7::package(a, b, c);
            let parsed = UuidV7::parse(&id.to_string()).unwrap();
            proptest::prop_assert_eq!(id, parsed);
        }
    }
}
