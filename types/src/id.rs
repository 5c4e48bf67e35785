//! Block and transaction identifiers.
//!
//! Both are derived the same way: the first eight bytes of SHA-256 over the
//! full byte encoding, reversed, read as a `u64`. They render in decimal.

use crate::error::TypesError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            pub fn as_u64(&self) -> u64 {
                self.0
            }

            /// Big-endian bytes, as embedded in block and asset encodings.
            pub fn to_be_bytes(&self) -> [u8; 8] {
                self.0.to_be_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<u64>()
                    .map(Self)
                    .map_err(|_| TypesError::InvalidId(s.to_string()))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0.to_string())
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

numeric_id!(
    /// Identifier of a block.
    BlockId
);

numeric_id!(
    /// Identifier of a transaction.
    TransactionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_render_in_decimal() {
        assert_eq!(BlockId(6524861224470851795).to_string(), "6524861224470851795");
        assert_eq!("42".parse::<TransactionId>().unwrap(), TransactionId(42));
        assert!("42L".parse::<TransactionId>().is_err());
    }

    #[test]
    fn ids_serialize_as_strings() {
        let json = serde_json::to_string(&BlockId(u64::MAX)).unwrap();
        assert_eq!(json, "\"18446744073709551615\"");
    }
}
