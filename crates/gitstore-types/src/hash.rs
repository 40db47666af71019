use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

use crate::error::TypeError;
use crate::object::ObjectType;

/// Length of an object hash in bytes.
pub const HASH_LEN: usize = 20;

/// Content digest identifying a stored object.
///
/// An `ObjectHash` is the SHA-1 of the object's canonical encoding
/// (`"<type> <len>\0<payload>"`). It is the primary key of an object within
/// one tenant; the same hash may legitimately appear under many tenants.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHash([u8; HASH_LEN]);

impl ObjectHash {
    /// The zero hash. Represents "no object".
    pub const ZERO: Self = Self([0u8; HASH_LEN]);

    /// Compute the canonical hash of a payload of the given type.
    pub fn compute(kind: ObjectType, data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(data.len().to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(data);
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    /// Create an `ObjectHash` from raw digest bytes.
    pub const fn from_raw(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns `true` if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lowercase hex representation (40 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 7 characters).
    pub fn short_hex(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(7);
        s
    }

    /// Parse from a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(format!("{s}: {e}")))?;
        if bytes.len() != HASH_LEN {
            return Err(TypeError::InvalidLength {
                expected: HASH_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl Default for ObjectHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHash({})", self.short_hex())
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_LEN]> for ObjectHash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

// Hashes travel as hex strings so that stored JSON documents stay readable
// and match the key-value layout.
impl Serialize for ObjectHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
