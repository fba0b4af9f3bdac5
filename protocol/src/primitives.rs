//! # Primitive Types
//!
//! Fixed-width identifiers shared by every other module. They are plain
//! byte arrays with hex `Display`/serde so that logs, JSON and TOML all show
//! the same representation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Token amounts in the smallest denomination.
///
/// `u128` comfortably holds 10^18-scaled supplies (a million tokens is
/// ~10^24, far below 2^128).
pub type Amount = u128;

/// Number of decimals in one whole token.
pub const TOKEN_DECIMALS: u32 = 18;

/// One whole token in the smallest unit.
pub const ONE_TOKEN: Amount = 10u128.pow(TOKEN_DECIMALS);

/// Converts whole tokens to the smallest unit.
pub const fn tokens(whole: u64) -> Amount {
    whole as Amount * ONE_TOKEN
}

/// Errors from parsing hex-encoded primitives.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("wrong length: expected {expected} bytes, got {got}")]
    WrongLength { expected: usize, got: usize },
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(ParseError::WrongLength {
            expected: N,
            got: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Width in bytes.
            pub const LEN: usize = $len;

            /// The all-zero value.
            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            /// Returns `true` if every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// Borrow the raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Lower-case hex without prefix.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// First four bytes as hex, for log lines.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_fixed::<$len>(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// 20-byte account identifier. No validation beyond length.
    Address,
    20
);

fixed_bytes!(
    /// 32-byte content digest, produced only by the block hasher.
    Hash,
    32
);

fixed_bytes!(
    /// 8-byte proof-of-work nonce.
    BlockNonce,
    8
);

impl Address {
    /// Address whose first byte is `tag` and the rest zero. Handy for
    /// well-known genesis accounts.
    pub const fn tagged(tag: u8) -> Self {
        let mut bytes = [0u8; 20];
        bytes[0] = tag;
        Self(bytes)
    }
}

impl BlockNonce {
    /// Big-endian integer view, used as the mining counter.
    pub fn to_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }
}

/// Serde helpers that write [`Amount`] as a decimal string.
///
/// TOML has no 128-bit integers, and JSON consumers in other languages
/// truncate anything above 2^53, so config and API payloads carry amounts
/// as strings.
pub mod amount_str {
    use super::Amount;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.replace('_', "")
            .parse::<Amount>()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_hex_roundtrip() {
        let addr = Address::tagged(7);
        let parsed: Address = addr.to_string().parse().unwrap();
        assert_eq!(addr, parsed);
        assert_eq!(addr.to_hex().len(), 40);
    }

    #[test]
    fn wrong_length_rejected() {
        let err = "0xabcd".parse::<Hash>().unwrap_err();
        assert_eq!(
            err,
            ParseError::WrongLength {
                expected: 32,
                got: 2
            }
        );
    }

    #[test]
    fn nonce_counter_view() {
        let nonce = BlockNonce::from_u64(0x0102_0304_0506_0708);
        assert_eq!(nonce.0, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(nonce.to_u64(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn token_scaling() {
        assert_eq!(tokens(1), ONE_TOKEN);
        assert_eq!(tokens(1_000_000), 1_000_000 * 10u128.pow(18));
    }

    #[test]
    fn addresses_order_bytewise() {
        assert!(Address::tagged(1) < Address::tagged(2));
        assert!(Address::zero().is_zero());
    }
}
