use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::ObjectHash;

/// The kind of a stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Delta against an object at a relative pack offset.
    OfsDelta,
    /// Delta against an object named by hash.
    RefDelta,
    /// Wildcard accepted by lookups only; never stored.
    Any,
}

impl ObjectType {
    /// Order in which concrete types are probed when a lookup asks for `Any`.
    ///
    /// Backends must honour this order so wildcard lookups are reproducible.
    pub const PROBE_ORDER: [ObjectType; 6] = [
        ObjectType::Commit,
        ObjectType::Tree,
        ObjectType::Blob,
        ObjectType::Tag,
        ObjectType::OfsDelta,
        ObjectType::RefDelta,
    ];

    /// The wire/storage tag for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
            Self::OfsDelta => "ofs-delta",
            Self::RefDelta => "ref-delta",
            Self::Any => "any",
        }
    }

    /// Returns `true` for every type except the `Any` wildcard.
    pub fn is_concrete(&self) -> bool {
        !matches!(self, Self::Any)
    }

    /// Returns `true` for the two delta encodings.
    pub fn is_delta(&self) -> bool {
        matches!(self, Self::OfsDelta | Self::RefDelta)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(Self::Commit),
            "tree" => Ok(Self::Tree),
            "blob" => Ok(Self::Blob),
            "tag" => Ok(Self::Tag),
            "ofs-delta" => Ok(Self::OfsDelta),
            "ref-delta" => Ok(Self::RefDelta),
            "any" => Ok(Self::Any),
            other => Err(TypeError::UnknownObjectType(other.to_string())),
        }
    }
}

/// A typed, content-addressed payload.
///
/// `EncodedObject` is the unit of storage. The storage engine never
/// interprets `data`; it only keys it by `(tenant, hash, kind)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedObject {
    /// Content digest of this object.
    pub hash: ObjectHash,
    /// The type of this object.
    pub kind: ObjectType,
    /// The size of `data` in bytes.
    pub size: u64,
    /// Raw payload bytes.
    pub data: Vec<u8>,
}

impl EncodedObject {
    /// Create an object and compute its hash from kind and content.
    pub fn new(kind: ObjectType, data: Vec<u8>) -> Self {
        let hash = ObjectHash::compute(kind, &data);
        Self::with_hash(hash, kind, data)
    }

    /// Create an object with a caller-supplied hash.
    ///
    /// Used when the hash is already known (objects received from a remote,
    /// rows read back from a backend) and recomputing it would be wasted work.
    pub fn with_hash(hash: ObjectHash, kind: ObjectType, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self {
            hash,
            kind,
            size,
            data,
        }
    }

    /// An empty object with no type or payload yet.
    pub fn empty() -> Self {
        Self::with_hash(ObjectHash::ZERO, ObjectType::Blob, Vec::new())
    }

    /// Replace the payload, keeping `size` in sync and recomputing the hash.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.size = data.len() as u64;
        self.hash = ObjectHash::compute(self.kind, &data);
        self.data = data;
    }

    /// Returns `true` if `hash` matches the canonical digest of the payload.
    pub fn verify(&self) -> bool {
        ObjectHash::compute(self.kind, &self.data) == self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_roundtrip() {
        for kind in ObjectType::PROBE_ORDER.iter().chain([ObjectType::Any].iter()) {
            let parsed: ObjectType = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn unknown_type_tag_rejected() {
        assert_eq!(
            "bogus".parse::<ObjectType>(),
            Err(TypeError::UnknownObjectType("bogus".into()))
        );
    }

    #[test]
    fn probe_order_is_documented_order() {
        let tags: Vec<&str> = ObjectType::PROBE_ORDER.iter().map(|t| t.as_str()).collect();
        assert_eq!(
            tags,
            vec!["commit", "tree", "blob", "tag", "ofs-delta", "ref-delta"]
        );
        assert!(ObjectType::PROBE_ORDER.iter().all(ObjectType::is_concrete));
    }

    #[test]
    fn serde_matches_storage_tag() {
        let json = serde_json::to_string(&ObjectType::OfsDelta).unwrap();
        assert_eq!(json, "\"ofs-delta\"");
    }

    #[test]
    fn new_computes_hash_and_size() {
        let obj = EncodedObject::new(ObjectType::Blob, b"hello".to_vec());
        assert_eq!(obj.size, 5);
        assert_eq!(obj.hash.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        assert!(obj.verify());
    }

    #[test]
    fn with_hash_keeps_supplied_hash() {
        let h = ObjectHash::from_raw([7; 20]);
        let obj = EncodedObject::with_hash(h, ObjectType::Tag, b"abc".to_vec());
        assert_eq!(obj.hash, h);
        assert_eq!(obj.size, 3);
        assert!(!obj.verify());
    }

    #[test]
    fn set_data_updates_size_and_hash() {
        let mut obj = EncodedObject::empty();
        obj.kind = ObjectType::Commit;
        obj.set_data(b"tree 0000".to_vec());
        assert_eq!(obj.size, 9);
        assert!(obj.verify());
    }
}
