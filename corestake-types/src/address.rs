use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a Core chain address.
pub const ADDRESS_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("invalid hex address: {0}")]
    InvalidHex(String),
    #[error("address must be 20 bytes, got {0}")]
    InvalidLength(usize),
}

fn parse_address(s: &str) -> Result<[u8; ADDRESS_LEN], AddressParseError> {
    let raw = hex::decode(s.trim_start_matches("0x"))
        .map_err(|_| AddressParseError::InvalidHex(s.to_string()))?;
    let len = raw.len();
    raw.try_into()
        .map_err(|_| AddressParseError::InvalidLength(len))
}

// Human-readable formats (JSON) carry addresses as 0x-prefixed hex; binary
// formats (bincode snapshots) carry the raw bytes.
macro_rules! address_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; ADDRESS_LEN]);

        impl $name {
            pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
                Self(bytes)
            }

            /// Convenience constructor used by tests and genesis fixtures.
            pub const fn from_byte(b: u8) -> Self {
                Self([b; ADDRESS_LEN])
            }

            pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
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
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = AddressParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_address(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_string())
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    s.parse().map_err(D::Error::custom)
                } else {
                    <[u8; ADDRESS_LEN]>::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

address_type!(
    /// Opaque identity of a validator that can receive delegated CORE.
    ValidatorId
);

address_type!(
    /// Identity of a caller: share holder, operator or owner.
    AccountId
);

impl AccountId {
    /// Account controlled by an ed25519 key: the low 20 bytes of the
    /// key's blake3 hash.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let hash = blake3::hash(public_key);
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&hash.as_bytes()[32 - ADDRESS_LEN..]);
        Self(bytes)
    }
}
