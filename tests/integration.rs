//! End-to-end scenarios over [`Vfs`] backed by the in-memory store, exercising the documented
//! testable properties rather than any single component in isolation.

use std::sync::Arc;

use cryptree::crypto::ChaChaCryptor;
use cryptree::prelude::*;
use cryptree::store::{MemoryStorage, NodeEventKind};

async fn fresh_vfs() -> Vfs {
    let storage = Arc::new(MemoryStorage::new(StorageType::Local));
    let cryptor: Arc<dyn Cryptor> = Arc::new(ChaChaCryptor::default());
    Vfs::new_root(storage, cryptor, AccessKey::generate())
        .await
        .unwrap()
}

// S1 — create, read back, list.
#[async_std::test]
async fn s1_create_read_text() {
    let vfs = fresh_vfs().await;
    vfs.write_text("/a/b.txt", "hello", WriteFlags::create())
        .await
        .unwrap();

    let (entries, _) = vfs.list_folder("/a").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name.as_str(), "b.txt");

    let (text, version) = vfs.read_text("/a/b.txt").await.unwrap();
    assert_eq!(text, "hello");
    assert!(matches!(version, Version::Known(n) if n >= 1));
}

// S2 — exclusive create against an existing name fails, and leaves the original untouched.
#[async_std::test]
async fn s2_exclusive_collision() {
    let vfs = fresh_vfs().await;
    vfs.write_text("/a/b.txt", "hello", WriteFlags::create())
        .await
        .unwrap();

    let err = vfs
        .write_text("/a/b.txt", "x", WriteFlags::create_exclusive())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::AlreadyExists);
    assert_eq!(err.path(), Some("/a/b.txt"));

    let (text, _) = vfs.read_text("/a/b.txt").await.unwrap();
    assert_eq!(text, "hello");
}

// S3 — a non-empty folder resists plain delete, but a recursive delete frees it and its contents.
#[async_std::test]
async fn s3_non_empty_folder_delete() {
    let vfs = fresh_vfs().await;
    vfs.make_folder("/d", false).await.unwrap();
    vfs.write_text("/d/f", "1", WriteFlags::create())
        .await
        .unwrap();

    let err = vfs.delete_folder("/d", false).await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::NotEmpty);
    assert!(vfs.check_presence("/d").await.unwrap());

    vfs.delete_folder("/d", true).await.unwrap();
    assert!(!vfs.check_presence("/d").await.unwrap());
}

// S4 — a cross-folder move preserves content and leaves the source path empty.
#[async_std::test]
async fn s4_cross_folder_move() {
    let vfs = fresh_vfs().await;
    vfs.make_folder("/x", false).await.unwrap();
    vfs.make_folder("/y", false).await.unwrap();
    vfs.write_text("/x/f", "v1", WriteFlags::create())
        .await
        .unwrap();

    vfs.move_node("/x/f", "/y/g").await.unwrap();

    let (text, _) = vfs.read_text("/y/g").await.unwrap();
    assert_eq!(text, "v1");
    assert!(!vfs.check_presence("/x/f").await.unwrap());

    let err = vfs.read_text("/x/f").await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::NotFound);
}

// S5 — a watch_tree subscription sees a cross-folder move as one correlated rename, not a
// disjoint delete-then-create, regardless of which side of the store's event stream lands first.
#[async_std::test]
async fn s5_watch_tree_reports_move_as_single_path_change() {
    let vfs = fresh_vfs().await;
    vfs.make_folder("/x", false).await.unwrap();
    vfs.make_folder("/y", false).await.unwrap();
    vfs.write_text("/x/f", "v1", WriteFlags::create())
        .await
        .unwrap();

    let watch = vfs.watch_tree("/").await.unwrap();
    vfs.move_node("/x/f", "/y/g").await.unwrap();

    let mut seen_paths = Vec::new();
    for _ in 0..2 {
        match async_std::future::timeout(std::time::Duration::from_secs(2), watch.next_event())
            .await
        {
            Ok(Some(event)) => seen_paths.push(event.path),
            _ => break,
        }
    }

    assert!(seen_paths.contains(&"x/f".to_string()));
    assert!(seen_paths.contains(&"y/g".to_string()));
    watch.detach();
}

// S6 — a streaming write against a stale expected version fails rather than silently clobbering.
#[async_std::test]
async fn s6_version_mismatch_on_streaming_write() {
    let vfs = fresh_vfs().await;
    let v = vfs
        .write_text("/a", "v1", WriteFlags::create())
        .await
        .unwrap();

    let stale = match v {
        Version::Known(n) if n > 1 => Version::Known(n - 1),
        Version::Known(_) => Version::Unknown,
        Version::Unknown => panic!("write must report a known version"),
    };

    let err = vfs
        .get_byte_sink(
            "/a",
            WriteFlags {
                create: false,
                exclusive: false,
                truncate: false,
            },
            Some(stale),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::VersionMismatch);
}

// Property: write_bytes(P, B); read_bytes(P) == (B, v>=1), for a path whose parent doesn't exist
// yet either.
#[async_std::test]
async fn property_path_round_trip() {
    let vfs = fresh_vfs().await;
    let payload = b"arbitrary bytes \x00\x01\xff".to_vec();

    let version = vfs
        .write_bytes("/deep/er/path.bin", &payload, WriteFlags::create())
        .await
        .unwrap();
    assert!(matches!(version, Version::Known(n) if n >= 1));

    let (read_back, read_version) = vfs.read_bytes("/deep/er/path.bin", 0, None).await.unwrap();
    assert_eq!(read_back, payload);
    assert_eq!(read_version, version);
}

// Property: every successful write on the same path strictly increases its version.
#[async_std::test]
async fn property_version_monotonicity() {
    let vfs = fresh_vfs().await;
    let mut last = None;
    for i in 0..5u32 {
        let v = vfs
            .write_text("/counter", &i.to_string(), WriteFlags::create())
            .await
            .unwrap();
        if let Some(Version::Known(prev)) = last {
            match v {
                Version::Known(cur) => assert!(cur > prev),
                Version::Unknown => panic!("write must report a known version"),
            }
        }
        last = Some(v);
    }
}

// Property: renaming a node in place preserves its identity (content, objId-level stat kind).
#[async_std::test]
async fn property_rename_identity() {
    let vfs = fresh_vfs().await;
    vfs.write_text("/a.txt", "same content", WriteFlags::create())
        .await
        .unwrap();
    let before = vfs.stat("/a.txt").await.unwrap();

    vfs.move_node("/a.txt", "/b.txt").await.unwrap();

    let after = vfs.stat("/b.txt").await.unwrap();
    assert_eq!(before.kind, after.kind);
    assert_eq!(before.version.value(), after.version.value());

    let (text, _) = vfs.read_text("/b.txt").await.unwrap();
    assert_eq!(text, "same content");
    assert!(!vfs.check_presence("/a.txt").await.unwrap());
}

// Property: a cross-folder move's destination-side entry-addition carries the same moveLabel as
// the source-side entry-removal, so a watcher on the destination folder sees a correlated
// addition rather than an unrelated fresh-file event (the router's convergence itself is covered
// at the unit level in event_router::tests).
#[async_std::test]
async fn property_move_label_correlation_is_observable_via_watch() {
    let vfs = fresh_vfs().await;
    vfs.make_folder("/x", false).await.unwrap();
    vfs.make_folder("/y", false).await.unwrap();
    vfs.write_text("/x/f", "v1", WriteFlags::create())
        .await
        .unwrap();

    let watch = vfs.watch_folder("/y").await.unwrap();
    vfs.move_node("/x/f", "/y/g").await.unwrap();

    let event = async_std::future::timeout(std::time::Duration::from_secs(2), watch.next_event())
        .await
        .expect("an event should arrive")
        .expect("channel should not close");
    match event.kind {
        NodeEventKind::EntryAddition { name, move_label, .. } => {
            assert_eq!(name, "g");
            assert!(move_label.is_some());
        }
        other => panic!("expected an entry-addition event, got {other:?}"),
    }
    watch.detach();
}

// Property: a readonly sub-root can decrypt its entire subtree using only the keys reachable from
// its own folder payload, and cannot mutate through it.
#[async_std::test]
async fn property_subtree_key_containment() {
    let vfs = fresh_vfs().await;
    vfs.make_folder("/shared", false).await.unwrap();
    vfs.write_text("/shared/a.txt", "hello", WriteFlags::create())
        .await
        .unwrap();
    vfs.make_folder("/shared/inner", false).await.unwrap();
    vfs.write_text("/shared/inner/b.txt", "world", WriteFlags::create())
        .await
        .unwrap();

    let sub = vfs.readonly_sub_root("/shared").await.unwrap();
    let (a, _) = sub.read_text("a.txt").await.unwrap();
    let (b, _) = sub.read_text("inner/b.txt").await.unwrap();
    assert_eq!(a, "hello");
    assert_eq!(b, "world");

    let err = sub
        .write_text("a.txt", "nope", WriteFlags::create())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::PermissionDenied);

    let err = sub.delete_file("a.txt").await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::PermissionDenied);
}

// Property: closing a Vfs is idempotent, and every operation afterward fails storage-closed with
// the path the caller asked about, not some internal path.
#[async_std::test]
async fn property_close_idempotence() {
    let vfs = fresh_vfs().await;
    vfs.write_text("/a", "v1", WriteFlags::create()).await.unwrap();
    vfs.close();
    vfs.close();

    let err = vfs.read_text("/a").await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::StorageClosed);
    assert_eq!(err.path(), Some("/a"));

    let err = vfs.make_folder("/b", false).await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::StorageClosed);
}

// Copy vs. move: copy_file allocates a fresh identity, leaving the source intact.
#[async_std::test]
async fn copy_file_preserves_source_and_allocates_new_identity() {
    let vfs = fresh_vfs().await;
    vfs.write_text("/src.txt", "v1", WriteFlags::create())
        .await
        .unwrap();

    vfs.copy_file("/src.txt", "/dst.txt", WriteFlags::create())
        .await
        .unwrap();

    let (src_text, _) = vfs.read_text("/src.txt").await.unwrap();
    let (dst_text, _) = vfs.read_text("/dst.txt").await.unwrap();
    assert_eq!(src_text, "v1");
    assert_eq!(dst_text, "v1");

    // Mutating the copy must not affect the original.
    vfs.write_text("/dst.txt", "v2", WriteFlags::create())
        .await
        .unwrap();
    let (src_text, _) = vfs.read_text("/src.txt").await.unwrap();
    assert_eq!(src_text, "v1");
}

// save_file imports content across two independent Vfs instances (distinct storage + cryptor).
#[async_std::test]
async fn save_file_imports_across_independent_vfs_instances() {
    let vfs_a = fresh_vfs().await;
    let vfs_b = fresh_vfs().await;

    vfs_a
        .write_text("/note.txt", "from a", WriteFlags::create())
        .await
        .unwrap();

    vfs_b
        .save_file("/imported.txt", &vfs_a, "/note.txt", WriteFlags::create())
        .await
        .unwrap();

    let (text, _) = vfs_b.read_text("/imported.txt").await.unwrap();
    assert_eq!(text, "from a");
}

// copy_folder with merge_and_overwrite=false refuses to clobber an existing destination entry.
#[async_std::test]
async fn copy_folder_respects_merge_and_overwrite_flag() {
    let vfs = fresh_vfs().await;
    vfs.make_folder("/src", false).await.unwrap();
    vfs.write_text("/src/f.txt", "new", WriteFlags::create())
        .await
        .unwrap();
    vfs.make_folder("/dst", false).await.unwrap();
    vfs.write_text("/dst/f.txt", "old", WriteFlags::create())
        .await
        .unwrap();

    let err = vfs.copy_folder("/src", "/dst", false).await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::AlreadyExists);

    vfs.copy_folder("/src", "/dst", true).await.unwrap();
    let (text, _) = vfs.read_text("/dst/f.txt").await.unwrap();
    assert_eq!(text, "new");
}

// Round-tripping structured JSON values through write_json/read_json.
#[async_std::test]
async fn json_round_trip() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Note {
        title: String,
        tags: Vec<String>,
    }

    let vfs = fresh_vfs().await;
    let note = Note {
        title: "hello".to_string(),
        tags: vec!["a".to_string(), "b".to_string()],
    };
    vfs.write_json("/note.json", &note, WriteFlags::create())
        .await
        .unwrap();

    let (read_back, _): (Note, _) = vfs.read_json("/note.json").await.unwrap();
    assert_eq!(read_back, note);
}
