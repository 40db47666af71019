//! Persisted encodings shared by the backends.
//!
//! Key-value backends store a reference as a small JSON record; the
//! relational backend stores the same four fields as columns. Both go
//! through [`reference_from_parts`] so decoding rules (and corruption
//! reporting) are identical everywhere.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use gitstore_types::{ObjectHash, Reference, ReferenceKind, ReferenceName};

use crate::error::{StorageError, StorageResult};

/// Flat, persisted form of a [`Reference`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoredReference {
    pub name: String,
    #[serde(rename = "Type")]
    pub kind: String,
    /// Symbolic target; empty for hash references.
    #[serde(default)]
    pub target: String,
    /// Hex hash; only present for hash references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl From<&Reference> for StoredReference {
    fn from(reference: &Reference) -> Self {
        match reference {
            Reference::Hash { name, hash } => Self {
                name: name.to_string(),
                kind: ReferenceKind::Hash.as_str().to_string(),
                target: String::new(),
                hash: Some(hash.to_hex()),
            },
            Reference::Symbolic { name, target } => Self {
                name: name.to_string(),
                kind: ReferenceKind::Symbolic.as_str().to_string(),
                target: target.to_string(),
                hash: None,
            },
        }
    }
}

/// Rebuild a [`Reference`] from its stored fields.
///
/// `key` only labels the corruption error. Unknown type tags, malformed
/// names and malformed hashes are all reported as [`StorageError::Corruption`].
pub fn reference_from_parts(
    key: &str,
    name: &str,
    kind: &str,
    target: &str,
    hash: Option<&str>,
) -> StorageResult<Reference> {
    let corrupt = |reason: String| StorageError::corruption(key, reason);
    let name = ReferenceName::new(name).map_err(|e| corrupt(e.to_string()))?;
    match kind.parse::<ReferenceKind>().map_err(|e| corrupt(e.to_string()))? {
        ReferenceKind::Hash => {
            let hash = hash
                .filter(|h| !h.is_empty())
                .ok_or_else(|| corrupt("hash reference without hash".into()))?;
            let hash = ObjectHash::from_hex(hash).map_err(|e| corrupt(e.to_string()))?;
            Ok(Reference::hash(name, hash))
        }
        ReferenceKind::Symbolic => {
            let target = ReferenceName::new(target).map_err(|e| corrupt(e.to_string()))?;
            Ok(Reference::symbolic(name, target))
        }
    }
}

pub fn encode_reference(reference: &Reference) -> StorageResult<Vec<u8>> {
    encode_document(&StoredReference::from(reference))
}

pub fn decode_reference(key: &str, data: &[u8]) -> StorageResult<Reference> {
    let stored: StoredReference = decode_document(key, data)?;
    reference_from_parts(
        key,
        &stored.name,
        &stored.kind,
        &stored.target,
        stored.hash.as_deref(),
    )
}

/// Serialize a singleton document (index, config) to its stored bytes.
pub fn encode_document<T: Serialize + ?Sized>(value: &T) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| StorageError::InvalidArgument(format!("cannot serialize document: {e}")))
}

/// Deserialize stored bytes, reporting failures as corruption of `key`.
pub fn decode_document<T: DeserializeOwned>(key: &str, data: &[u8]) -> StorageResult<T> {
    serde_json::from_slice(data).map_err(|e| StorageError::corruption(key, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn main_ref(hash: ObjectHash) -> Reference {
        Reference::hash(ReferenceName::branch("main").unwrap(), hash)
    }

    #[test]
    fn hash_reference_json_shape() {
        let hash = ObjectHash::from_raw([0x11; 20]);
        let bytes = encode_reference(&main_ref(hash)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["Name"], "refs/heads/main");
        assert_eq!(value["Type"], "hash-reference");
        assert_eq!(value["Target"], "");
        assert_eq!(value["Hash"], hash.to_hex());
    }

    #[test]
    fn symbolic_reference_roundtrip() {
        let head = Reference::symbolic(ReferenceName::head(), ReferenceName::branch("main").unwrap());
        let bytes = encode_reference(&head).unwrap();
        assert!(!String::from_utf8(bytes.clone()).unwrap().contains("Hash"));
        assert_eq!(decode_reference("k", &bytes).unwrap(), head);
    }

    #[test]
    fn unknown_type_tag_is_corruption() {
        let data = br#"{"Name":"refs/heads/main","Type":"packed-reference","Target":""}"#;
        let err = decode_reference("t:ref:refs/heads/main", data).unwrap_err();
        match err {
            StorageError::Corruption { key, reason } => {
                assert_eq!(key, "t:ref:refs/heads/main");
                assert!(reason.contains("packed-reference"));
            }
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[test]
    fn hash_reference_without_hash_is_corruption() {
        let data = br#"{"Name":"refs/heads/main","Type":"hash-reference","Target":""}"#;
        assert!(matches!(
            decode_reference("k", data),
            Err(StorageError::Corruption { .. })
        ));
    }

    #[test]
    fn garbage_is_corruption() {
        assert!(matches!(
            decode_reference("k", b"not json"),
            Err(StorageError::Corruption { .. })
        ));
        assert!(matches!(
            decode_document::<gitstore_types::Index>("k", b"[1,2"),
            Err(StorageError::Corruption { .. })
        ));
    }

    proptest! {
        #[test]
        fn any_hash_reference_survives_encoding(
            branch in "[a-z][a-z0-9/_-]{0,20}[a-z0-9]",
            bytes in proptest::array::uniform20(any::<u8>()),
        ) {
            prop_assume!(!branch.contains("//"));
            let reference = Reference::hash(
                ReferenceName::branch(&branch).unwrap(),
                ObjectHash::from_raw(bytes),
            );
            let encoded = encode_reference(&reference).unwrap();
            prop_assert_eq!(decode_reference("k", &encoded).unwrap(), reference);
        }
    }
}
