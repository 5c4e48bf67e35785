//! Account addresses.
//!
//! An address is the first eight bytes of SHA-256(public key), reversed and
//! read as an unsigned integer. It renders as the decimal number followed by
//! an `L` suffix, e.g. `16313739661670634666L`. Derivation lives in
//! `kestrel_crypto::derive_address`; this crate only carries the value.

use crate::error::TypesError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub u64);

impl Address {
    pub const SUFFIX: char = 'L';

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Big-endian bytes, as written into transaction byte encodings.
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Whether `s` looks like an address (`^[0-9]{1,21}[Ll]$`).
    ///
    /// Delegate usernames may not take this shape.
    pub fn looks_like_address(s: &str) -> bool {
        let Some(digits) = s.strip_suffix(['L', 'l']) else {
            return false;
        };
        !digits.is_empty() && digits.len() <= 21 && digits.bytes().all(|b| b.is_ascii_digit())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0, Self::SUFFIX)
    }
}

impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_suffix(Self::SUFFIX)
            .ok_or_else(|| TypesError::InvalidAddress(s.to_string()))?;
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| TypesError::InvalidAddress(s.to_string()))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse() {
        let addr = Address(16313739661670634666);
        assert_eq!(addr.to_string(), "16313739661670634666L");
        assert_eq!("16313739661670634666L".parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn parse_rejects_missing_suffix() {
        assert!("12345".parse::<Address>().is_err());
        assert!("L".parse::<Address>().is_err());
        assert!("12a45L".parse::<Address>().is_err());
    }

    #[test]
    fn address_shape_detection() {
        assert!(Address::looks_like_address("1234L"));
        assert!(Address::looks_like_address("1234l"));
        assert!(!Address::looks_like_address("genesis_1"));
        assert!(!Address::looks_like_address("L"));
        assert!(!Address::looks_like_address(&format!("{}L", "1".repeat(22))));
    }
}
