use uuid::Uuid;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }

            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                Ok($name(Uuid::parse_str(s)?))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id_type!(OperatorId);

/// 32-byte identifier of a structured price feed, written as hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PriceId(pub [u8; 32]);

impl PriceId {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut bytes)?;
        Ok(PriceId(bytes))
    }
}

impl TryFrom<String> for PriceId {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PriceId::from_hex(&value)
    }
}

impl From<PriceId> for String {
    fn from(id: PriceId) -> String {
        id.to_string()
    }
}

impl fmt::Display for PriceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Which sub-feed to request from a provider that multiplexes many feeds
/// behind one endpoint. Both halves are opaque to the aggregator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    pub sender: String,
    pub key: String,
}

impl SourceKey {
    pub fn new(sender: impl Into<String>, key: impl Into<String>) -> Self {
        SourceKey {
            sender: sender.into(),
            key: key.into(),
        }
    }

    /// Hash of the (sender, key) pair; registry uniqueness is enforced on this.
    pub fn fingerprint(&self) -> SourceFingerprint {
        let mut hasher = Sha256::new();
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart
        hasher.update((self.sender.len() as u64).to_le_bytes());
        hasher.update(self.sender.as_bytes());
        hasher.update((self.key.len() as u64).to_le_bytes());
        hasher.update(self.key.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        SourceFingerprint(bytes)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sender, self.key)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceFingerprint(pub [u8; 32]);

impl fmt::Display for SourceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}
