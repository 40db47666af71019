//! Backend-agnostic behavioural suite.
//!
//! Every backend runs the same checks against its own [`Storer`]. The
//! caller supplies a factory that opens a storer for a tenant name; each
//! check uses its own tenants, so one backend instance can serve the whole
//! suite. Factories for shared, long-lived servers should make tenant
//! names unique per run.
//!
//! All checks panic on failure.

use std::collections::HashSet;

use gitstore_types::{
    EncodedObject, FileMode, Index, IndexEntry, ObjectHash, ObjectType, Reference, ReferenceName,
    RemoteConfig, RepoConfig,
};

use crate::error::StorageError;
use crate::iter::DEFAULT_BATCH_SIZE;
use crate::traits::Storer;

fn blob(data: &str) -> EncodedObject {
    EncodedObject::new(ObjectType::Blob, data.as_bytes().to_vec())
}

fn branch(name: &str) -> ReferenceName {
    ReferenceName::branch(name).expect("valid branch name")
}

fn hash_of(byte: u8) -> ObjectHash {
    ObjectHash::from_raw([byte; 20])
}

/// Run every check that all backends must pass.
pub async fn run_all<F>(factory: F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    object_roundtrip(&factory).await;
    object_upsert_is_idempotent(&factory).await;
    any_type_resolution(&factory).await;
    type_correction_replaces(&factory).await;
    missing_objects(&factory).await;
    tenant_isolation(&factory).await;
    object_iteration_is_complete(&factory).await;
    object_hashes_cover_every_type(&factory).await;
    reference_roundtrip(&factory).await;
    check_and_set(&factory).await;
    concurrent_check_and_set(&factory).await;
    reference_iteration_is_complete(&factory).await;
    default_empty_reads(&factory).await;
    shallow_union(&factory).await;
    documents_roundtrip(&factory).await;
    unsupported_markers(&factory).await;
    repository_scenario(&factory).await;
}

pub async fn object_roundtrip<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/roundtrip");
    for (kind, data) in [
        (ObjectType::Commit, &b"tree 4b825dc6\n\nmsg"[..]),
        (ObjectType::Tree, &b"100644 a\0xxxxxxxxxxxxxxxxxxxx"[..]),
        (ObjectType::Blob, &b""[..]),
        (ObjectType::Tag, &b"object abc\ntype commit"[..]),
        (ObjectType::OfsDelta, &[0u8, 1, 2, 255][..]),
        (ObjectType::RefDelta, &[9u8; 300][..]),
    ] {
        let object = EncodedObject::new(kind, data.to_vec());
        let hash = storage.set_encoded_object(&object).await.unwrap();
        assert_eq!(hash, object.hash);
        let read = storage.encoded_object(kind, &hash).await.unwrap();
        assert_eq!(read.kind, kind);
        assert_eq!(read.data, data);
        assert_eq!(read.size, data.len() as u64);
        assert_eq!(storage.encoded_object_size(&hash).await.unwrap(), data.len() as u64);
        assert!(storage.has_encoded_object(&hash).await.unwrap());
    }
}

pub async fn object_upsert_is_idempotent<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/upsert");
    let object = blob("first version");
    storage.set_encoded_object(&object).await.unwrap();
    storage.set_encoded_object(&object).await.unwrap();
    let once = storage.encoded_object(ObjectType::Blob, &object.hash).await.unwrap();
    assert_eq!(once, object);

    // Same hash, corrected payload: size and data follow the last write.
    let corrected = EncodedObject::with_hash(object.hash, ObjectType::Blob, b"fixed".to_vec());
    storage.set_encoded_object(&corrected).await.unwrap();
    let read = storage.encoded_object(ObjectType::Blob, &object.hash).await.unwrap();
    assert_eq!(read.data, b"fixed");
    assert_eq!(read.size, 5);
    assert_eq!(storage.encoded_object_size(&object.hash).await.unwrap(), 5);
}

pub async fn any_type_resolution<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/any");
    let mut stored = Vec::new();
    for kind in ObjectType::PROBE_ORDER {
        let object = EncodedObject::new(kind, format!("payload of {kind}").into_bytes());
        storage.set_encoded_object(&object).await.unwrap();
        stored.push(object);
    }
    for object in &stored {
        let found = storage.encoded_object(ObjectType::Any, &object.hash).await.unwrap();
        assert_eq!(found.kind, object.kind);
        assert_eq!(found.data, object.data);
    }
}

/// Rewriting a hash under another type replaces the earlier entry.
pub async fn type_correction_replaces<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/type-correction");
    let hash = hash_of(0x77);
    storage
        .set_encoded_object(&EncodedObject::with_hash(hash, ObjectType::Tree, b"old-tree".to_vec()))
        .await
        .unwrap();
    storage
        .set_encoded_object(&EncodedObject::with_hash(hash, ObjectType::Blob, b"fixed".to_vec()))
        .await
        .unwrap();

    let any = storage.encoded_object(ObjectType::Any, &hash).await.unwrap();
    assert_eq!(any.kind, ObjectType::Blob);
    assert_eq!(any.data, b"fixed");
    assert_eq!(storage.encoded_object_size(&hash).await.unwrap(), 5);
    assert!(matches!(
        storage.encoded_object(ObjectType::Tree, &hash).await,
        Err(StorageError::ObjectNotFound(_))
    ));
    let hashes = storage
        .iter_object_hashes()
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(hashes, vec![hash]);
    assert!(storage
        .iter_encoded_objects(ObjectType::Tree)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap()
        .is_empty());
}

pub async fn missing_objects<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/missing");
    let absent = hash_of(0xee);
    assert!(!storage.has_encoded_object(&absent).await.unwrap());
    for kind in [ObjectType::Blob, ObjectType::Any] {
        match storage.encoded_object(kind, &absent).await {
            Err(StorageError::ObjectNotFound(h)) => assert_eq!(h, absent),
            other => panic!("expected ObjectNotFound, got {other:?}"),
        }
    }
    assert!(matches!(
        storage.encoded_object_size(&absent).await,
        Err(StorageError::ObjectNotFound(_))
    ));
    assert!(matches!(
        storage
            .set_encoded_object(&EncodedObject::with_hash(absent, ObjectType::Any, vec![]))
            .await,
        Err(StorageError::InvalidArgument(_))
    ));
}

pub async fn tenant_isolation<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let first = factory("conformance/isolation/one");
    let second = factory("conformance/isolation/two");
    let lookalike = factory("conformance/isolation/one:object");
    let shared = hash_of(0x42);

    first
        .set_encoded_object(&EncodedObject::with_hash(shared, ObjectType::Blob, b"one".to_vec()))
        .await
        .unwrap();
    second
        .set_encoded_object(&EncodedObject::with_hash(shared, ObjectType::Blob, b"two".to_vec()))
        .await
        .unwrap();

    let one = first.encoded_object(ObjectType::Any, &shared).await.unwrap();
    let two = second.encoded_object(ObjectType::Any, &shared).await.unwrap();
    assert_eq!(one.data, b"one");
    assert_eq!(two.data, b"two");
    assert!(!lookalike.has_encoded_object(&shared).await.unwrap());

    first
        .set_reference(&Reference::hash(branch("main"), shared))
        .await
        .unwrap();
    assert!(matches!(
        second.reference(&branch("main")).await,
        Err(StorageError::ReferenceNotFound(_))
    ));
    assert_eq!(second.count_loose_refs().await.unwrap(), 0);
}

pub async fn object_iteration_is_complete<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/iterate-objects");
    let total = DEFAULT_BATCH_SIZE * 2 + 37;
    let mut expected = HashSet::new();
    for i in 0..total {
        let object = blob(&format!("blob number {i}"));
        expected.insert(storage.set_encoded_object(&object).await.unwrap());
    }
    // Other types must not leak into a typed iteration.
    storage
        .set_encoded_object(&EncodedObject::new(ObjectType::Tree, b"tree".to_vec()))
        .await
        .unwrap();

    let mut seen = HashSet::new();
    let mut iter = storage.iter_encoded_objects(ObjectType::Blob).await.unwrap();
    while let Some(object) = iter.next().await.unwrap() {
        assert_eq!(object.kind, ObjectType::Blob);
        assert!(object.verify(), "payload must match its hash");
        assert!(seen.insert(object.hash), "duplicate {}", object.hash);
    }
    assert_eq!(seen, expected);

    let trees = storage
        .iter_encoded_objects(ObjectType::Tree)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(trees.len(), 1);
    assert!(storage
        .iter_encoded_objects(ObjectType::Tag)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap()
        .is_empty());
}

pub async fn object_hashes_cover_every_type<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/hashes");
    let mut expected = HashSet::new();
    for (i, kind) in ObjectType::PROBE_ORDER.into_iter().enumerate() {
        let object = EncodedObject::new(kind, vec![i as u8; i + 1]);
        expected.insert(storage.set_encoded_object(&object).await.unwrap());
    }
    let mut seen = HashSet::new();
    storage
        .iter_object_hashes()
        .await
        .unwrap()
        .for_each(|hash| {
            seen.insert(hash);
            Ok(std::ops::ControlFlow::Continue(()))
        })
        .await
        .unwrap();
    assert_eq!(seen, expected);
}

pub async fn reference_roundtrip<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/refs");
    let main = Reference::hash(branch("main"), hash_of(1));
    let head = Reference::symbolic(ReferenceName::head(), branch("main"));
    let tag = Reference::hash(ReferenceName::tag("v1.0").unwrap(), hash_of(2));
    for reference in [&main, &head, &tag] {
        storage.set_reference(reference).await.unwrap();
    }
    assert_eq!(storage.reference(main.name()).await.unwrap(), main);
    assert_eq!(storage.reference(&ReferenceName::head()).await.unwrap(), head);
    assert_eq!(storage.reference(tag.name()).await.unwrap(), tag);

    // Unconditional set overwrites.
    let moved = Reference::hash(branch("main"), hash_of(3));
    storage.set_reference(&moved).await.unwrap();
    assert_eq!(storage.reference(main.name()).await.unwrap(), moved);

    match storage.reference(&branch("nope")).await {
        Err(StorageError::ReferenceNotFound(name)) => assert_eq!(name, "refs/heads/nope"),
        other => panic!("expected ReferenceNotFound, got {other:?}"),
    }
    assert_eq!(storage.count_loose_refs().await.unwrap(), 3);
}

pub async fn check_and_set<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/cas");
    let h0 = Reference::hash(branch("feature"), hash_of(0x10));
    let h1 = Reference::hash(branch("feature"), hash_of(0x11));
    let h2 = Reference::hash(branch("feature"), hash_of(0x12));

    // Absent reference with an expectation.
    assert!(matches!(
        storage.check_and_set_reference(&h1, Some(&h0)).await,
        Err(StorageError::ReferenceNotFound(_))
    ));
    // Creation.
    storage.check_and_set_reference(&h0, None).await.unwrap();
    assert_eq!(storage.reference(h0.name()).await.unwrap(), h0);
    // Advance.
    storage.check_and_set_reference(&h1, Some(&h0)).await.unwrap();
    assert_eq!(storage.reference(h1.name()).await.unwrap(), h1);
    // Stale expectation.
    match storage.check_and_set_reference(&h2, Some(&h0)).await {
        Err(StorageError::ReferenceHasChanged(name)) => assert_eq!(name, "refs/heads/feature"),
        other => panic!("expected ReferenceHasChanged, got {other:?}"),
    }
    assert_eq!(storage.reference(h1.name()).await.unwrap(), h1);
    // Forced write ignores the current value.
    storage.check_and_set_reference(&h2, None).await.unwrap();
    assert_eq!(storage.reference(h2.name()).await.unwrap(), h2);

    // Symbolic references resolve to the zero hash.
    let head = Reference::symbolic(ReferenceName::head(), branch("feature"));
    let detached = Reference::hash(ReferenceName::head(), hash_of(0x13));
    storage.set_reference(&head).await.unwrap();
    storage.check_and_set_reference(&detached, Some(&head)).await.unwrap();
    assert_eq!(storage.reference(&ReferenceName::head()).await.unwrap(), detached);
}

pub async fn concurrent_check_and_set<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/cas-race");
    let base = Reference::hash(branch("race"), hash_of(0x20));
    storage.set_reference(&base).await.unwrap();

    let contenders: Vec<Reference> = (0..4u8)
        .map(|i| Reference::hash(branch("race"), hash_of(0x30 + i)))
        .collect();
    let (a, b, c, d) = tokio::join!(
        storage.check_and_set_reference(&contenders[0], Some(&base)),
        storage.check_and_set_reference(&contenders[1], Some(&base)),
        storage.check_and_set_reference(&contenders[2], Some(&base)),
        storage.check_and_set_reference(&contenders[3], Some(&base)),
    );
    let results = [a, b, c, d];

    let winners: Vec<usize> = results
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.is_ok().then_some(i))
        .collect();
    assert_eq!(winners.len(), 1, "exactly one writer may win: {results:?}");
    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(e, StorageError::ReferenceHasChanged(_)),
                "losers must see ReferenceHasChanged, got {e:?}"
            );
        }
    }
    let stored = storage.reference(base.name()).await.unwrap();
    assert_eq!(stored, contenders[winners[0]]);
}

pub async fn reference_iteration_is_complete<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/iterate-refs");
    let total = DEFAULT_BATCH_SIZE + 51;
    let mut expected = HashSet::new();
    for i in 0..total {
        let name = branch(&format!("topic/{i:04}"));
        expected.insert(name.to_string());
        storage
            .set_reference(&Reference::hash(name, hash_of((i % 250) as u8 + 1)))
            .await
            .unwrap();
    }
    let mut seen = HashSet::new();
    let mut iter = storage.iter_references().await.unwrap();
    while let Some(reference) = iter.next().await.unwrap() {
        assert!(seen.insert(reference.name().to_string()));
    }
    assert_eq!(seen, expected);
    assert_eq!(storage.count_loose_refs().await.unwrap(), total);

    // Early stop is not an error.
    let mut visited = 0;
    storage
        .iter_references()
        .await
        .unwrap()
        .for_each(|_| {
            visited += 1;
            Ok(if visited == 3 {
                std::ops::ControlFlow::Break(())
            } else {
                std::ops::ControlFlow::Continue(())
            })
        })
        .await
        .unwrap();
    assert_eq!(visited, 3);
}

pub async fn default_empty_reads<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/never-written");
    assert_eq!(storage.config().await.unwrap(), RepoConfig::default());
    let index = storage.index().await.unwrap();
    assert_eq!(index, Index::default());
    assert_eq!(index.version, 2);
    assert!(storage.shallow().await.unwrap().is_empty());
    assert_eq!(storage.count_loose_refs().await.unwrap(), 0);
    assert!(storage
        .iter_references()
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap()
        .is_empty());
}

pub async fn shallow_union<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/shallow");
    let (a, b, c) = (hash_of(0xa1), hash_of(0xb2), hash_of(0xc3));
    storage.set_shallow(&[a, b]).await.unwrap();
    storage.set_shallow(&[b, c]).await.unwrap();
    storage.set_shallow(&[a]).await.unwrap();
    let mut got = storage.shallow().await.unwrap();
    got.sort();
    assert_eq!(got, vec![a, b, c]);
}

pub async fn documents_roundtrip<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/documents");

    let mut index = Index::default();
    index.upsert(IndexEntry::new("README.md", hash_of(1), FileMode::Regular, 120));
    index.upsert(IndexEntry::new("bin/run", hash_of(2), FileMode::Executable, 64));
    storage.set_index(&index).await.unwrap();
    assert_eq!(storage.index().await.unwrap(), index);

    let mut config = RepoConfig::default();
    config.core.is_bare = true;
    config.add_remote(RemoteConfig::new("origin", "https://example.com/repo.git"));
    storage.set_config(&config).await.unwrap();
    assert_eq!(storage.config().await.unwrap(), config);

    // Second write replaces the first.
    let mut replaced = RepoConfig::default();
    replaced.add_remote(RemoteConfig::new("upstream", "https://example.com/up.git"));
    storage.set_config(&replaced).await.unwrap();
    assert_eq!(storage.config().await.unwrap(), replaced);
}

pub async fn unsupported_markers<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("conformance/markers");
    assert!(matches!(
        storage.add_alternate("https://example.com/alt.git").await,
        Err(StorageError::Unsupported(_))
    ));
    assert!(matches!(
        storage.remove_reference(&branch("main")).await,
        Err(StorageError::Unsupported(_))
    ));
    assert!(matches!(
        storage.loose_object_time(&hash_of(1)).await,
        Err(StorageError::Unsupported(_))
    ));
    storage.pack_refs().await.unwrap();
    assert!(storage.object_packs().await.unwrap().is_empty());
}

/// Object write, read, and a branch advanced twice with one stale retry.
pub async fn repository_scenario<F>(factory: &F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let storage = factory("repo-a");
    let hello = blob("hello");
    let abc = storage.set_encoded_object(&hello).await.unwrap();
    let read = storage.encoded_object(ObjectType::Blob, &abc).await.unwrap();
    assert_eq!(read.data, b"hello");
    assert_eq!(read.size, 5);

    let def = hash_of(0xde);
    let xyz = hash_of(0xef);
    let at_abc = Reference::hash(branch("main"), abc);
    storage.set_reference(&at_abc).await.unwrap();
    storage
        .check_and_set_reference(&Reference::hash(branch("main"), def), Some(&at_abc))
        .await
        .unwrap();
    assert!(matches!(
        storage
            .check_and_set_reference(&Reference::hash(branch("main"), xyz), Some(&at_abc))
            .await,
        Err(StorageError::ReferenceHasChanged(_))
    ));
    assert_eq!(
        storage.reference(&branch("main")).await.unwrap().target_hash(),
        def
    );
}

/// Submodule scopes are isolated from their parent and from siblings.
///
/// Only for backends that implement [`crate::ModuleStorer`].
pub async fn module_isolation<F>(factory: F)
where
    F: Fn(&str) -> Box<dyn Storer>,
{
    let root = factory("conformance/modules");
    let left = root.module("left").await.unwrap();
    let right = root.module("right").await.unwrap();
    let nested = left.module("inner").await.unwrap();

    let root_id = root.namespace().tenant_id();
    assert_eq!(left.namespace().tenant_id(), format!("{root_id}:module:left"));
    assert_eq!(
        nested.namespace().tenant_id(),
        format!("{root_id}:module:left:module:inner")
    );

    let object = blob("only in left");
    left.set_encoded_object(&object).await.unwrap();
    assert!(left.has_encoded_object(&object.hash).await.unwrap());
    assert!(!root.has_encoded_object(&object.hash).await.unwrap());
    assert!(!right.has_encoded_object(&object.hash).await.unwrap());
    assert!(!nested.has_encoded_object(&object.hash).await.unwrap());

    let main = Reference::hash(branch("main"), object.hash);
    nested.set_reference(&main).await.unwrap();
    assert_eq!(nested.reference(main.name()).await.unwrap(), main);
    assert!(left.reference(main.name()).await.is_err());
    assert_eq!(root.count_loose_refs().await.unwrap(), 0);

    // Re-opening a module reaches the same data.
    let again = root.module("left").await.unwrap();
    assert!(again.has_encoded_object(&object.hash).await.unwrap());
}
