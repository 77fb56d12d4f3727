//! Tests for client file operations on top of the storage tracker

#[cfg(test)]
mod file_store_tests {
    use super::super::{FileStore, Listing, StorageTracker};
    use crate::config::{StorageConfig, WatcherConfig};
    use crate::error::HomeCloudError;
    use axum::body::Bytes;
    use futures_util::{stream, StreamExt};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_test_store(hard_limit_bytes: u64) -> (TempDir, FileStore) {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageConfig {
            root: temp_dir.path().join("uploads"),
            hard_limit_bytes,
            ..StorageConfig::default()
        };
        let tracker = StorageTracker::detached(&storage, &WatcherConfig::default())
            .await
            .unwrap();
        (temp_dir, FileStore::new(Arc::new(tracker)))
    }

    fn body(chunks: &[&'static [u8]]) -> impl futures_util::Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        stream::iter(chunks.iter().map(|c| Ok(Bytes::from_static(c))).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_upload_creates_directories_and_renames_on_collision() {
        let (_temp_dir, store) = create_test_store(u64::MAX).await;

        let first = store.upload("docs/2024", "report.txt", 5, body(&[b"hello"])).await.unwrap();
        assert_eq!(first.path, "docs/2024/report.txt");
        assert_eq!(first.size, 5);

        let second = store.upload("docs/2024", "report.txt", 5, body(&[b"wor", b"ld"])).await.unwrap();
        assert_eq!(second.path, "docs/2024/report(1).txt");

        let root = store.tracker().root().to_path_buf();
        assert_eq!(std::fs::read(root.join("docs/2024/report.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read(root.join("docs/2024/report(1).txt")).unwrap(), b"world");
    }

    #[tokio::test]
    async fn test_upload_rejected_over_hard_limit() {
        let (_temp_dir, store) = create_test_store(10).await;

        let err = store.upload("", "big.bin", 11, body(&[b"x"])).await.unwrap_err();
        assert!(matches!(err, HomeCloudError::QuotaExceeded(_)));
        assert!(!store.tracker().root().join("big.bin").exists());
    }

    #[tokio::test]
    async fn test_upload_aborted_when_stream_exceeds_limit() {
        let (_temp_dir, store) = create_test_store(8).await;

        // Hint says 0 bytes, the body carries 12.
        let err = store
            .upload("", "liar.bin", 0, body(&[b"1234", b"5678", b"9abc"]))
            .await
            .unwrap_err();
        assert!(matches!(err, HomeCloudError::QuotaExceeded(_)));
        assert!(!store.tracker().root().join("liar.bin").exists());
    }

    #[tokio::test]
    async fn test_upload_rejects_escaping_targets() {
        let (_temp_dir, store) = create_test_store(u64::MAX).await;

        let err = store.upload("../outside", "a.txt", 1, body(&[b"a"])).await.unwrap_err();
        assert!(matches!(err, HomeCloudError::PathEscape(_)));

        let err = store.upload("", "../a.txt", 1, body(&[b"a"])).await.unwrap_err();
        assert!(matches!(err, HomeCloudError::PathEscape(_)));

        let err = store.upload("", "..", 1, body(&[b"a"])).await.unwrap_err();
        assert!(matches!(err, HomeCloudError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_mkdir_collision_suffix() {
        let (_temp_dir, store) = create_test_store(u64::MAX).await;

        assert_eq!(store.mkdir("photos/summer.2024").await.unwrap(), "photos/summer.2024");
        assert_eq!(store.mkdir("photos/summer.2024").await.unwrap(), "photos/summer.2024(1)");
        assert!(matches!(store.mkdir("").await, Err(HomeCloudError::InvalidRequest(_))));
        assert!(matches!(store.mkdir("..").await, Err(HomeCloudError::PathEscape(_))));
    }

    #[tokio::test]
    async fn test_move_into_occupied_slot() {
        let (_temp_dir, store) = create_test_store(u64::MAX).await;
        let root = store.tracker().root().to_path_buf();
        std::fs::create_dir_all(root.join("inbox")).unwrap();
        std::fs::create_dir_all(root.join("archive")).unwrap();
        std::fs::write(root.join("inbox/note.md"), b"new").unwrap();
        std::fs::write(root.join("archive/note.md"), b"old").unwrap();

        let moved = store.move_entry("inbox/note.md", "archive/note.md").await.unwrap();
        assert_eq!(moved, "archive/note(1).md");
        assert_eq!(std::fs::read(root.join("archive/note.md")).unwrap(), b"old");
        assert_eq!(std::fs::read(root.join("archive/note(1).md")).unwrap(), b"new");
        assert!(!root.join("inbox/note.md").exists());
    }

    #[tokio::test]
    async fn test_rename_creates_parent_and_keeps_directory_names_whole() {
        let (_temp_dir, store) = create_test_store(u64::MAX).await;
        let root = store.tracker().root().to_path_buf();
        std::fs::create_dir_all(root.join("v1.0")).unwrap();
        std::fs::create_dir_all(root.join("releases/v1.0")).unwrap();

        let renamed = store.rename("v1.0", "releases/v1.0").await.unwrap();
        assert_eq!(renamed, "releases/v1.0(1)");

        let renamed = store.rename("releases/v1.0", "new/place/v1.0").await.unwrap();
        assert_eq!(renamed, "new/place/v1.0");
    }

    #[tokio::test]
    async fn test_move_rejects_bad_sources_and_targets() {
        let (_temp_dir, store) = create_test_store(u64::MAX).await;
        let root = store.tracker().root().to_path_buf();
        std::fs::create_dir_all(root.join("a/b")).unwrap();

        assert!(matches!(store.move_entry("missing", "x").await, Err(HomeCloudError::NotFound(_))));
        assert!(matches!(store.move_entry("a", "a/b/c").await, Err(HomeCloudError::InvalidRequest(_))));
        assert!(matches!(store.move_entry("", "x").await, Err(HomeCloudError::InvalidRequest(_))));
        assert!(matches!(store.move_entry("a", "../x").await, Err(HomeCloudError::PathEscape(_))));
        assert!(matches!(store.rename("../etc", "x").await, Err(HomeCloudError::PathEscape(_))));
    }

    #[tokio::test]
    async fn test_delete_files_and_folders() {
        let (_temp_dir, store) = create_test_store(u64::MAX).await;
        let root = store.tracker().root().to_path_buf();
        std::fs::create_dir_all(root.join("dir/sub")).unwrap();
        std::fs::write(root.join("dir/sub/f"), b"x").unwrap();
        std::fs::write(root.join("file"), b"x").unwrap();

        store.delete("file").await.unwrap();
        store.delete("dir").await.unwrap();
        assert!(!root.join("file").exists());
        assert!(!root.join("dir").exists());

        assert!(matches!(store.delete("file").await, Err(HomeCloudError::NotFound(_))));
        assert!(matches!(store.delete("").await, Err(HomeCloudError::InvalidRequest(_))));
        assert!(matches!(store.delete(".").await, Err(HomeCloudError::InvalidRequest(_))));
        assert!(matches!(store.delete("../x").await, Err(HomeCloudError::PathEscape(_))));
        assert!(root.exists());
    }

    #[tokio::test]
    async fn test_list_orders_directories_first() {
        let (_temp_dir, store) = create_test_store(u64::MAX).await;
        let root = store.tracker().root().to_path_buf();
        std::fs::create_dir_all(root.join("music/zeta")).unwrap();
        std::fs::write(root.join("music/alpha.mp3"), vec![0u8; 12]).unwrap();

        let entries = match store.list("music").await.unwrap() {
            Listing::Directory(entries) => entries,
            Listing::File(_) => panic!("expected a directory listing"),
        };

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "zeta");
        assert!(entries[0].is_dir);
        assert_eq!(entries[0].path, "music/zeta");
        assert_eq!(entries[1].name, "alpha.mp3");
        assert_eq!(entries[1].size, 12);
        assert_eq!(entries[1].path, "music/alpha.mp3");

        match store.list("music/alpha.mp3").await.unwrap() {
            Listing::File(path) => assert_eq!(path, root.join("music/alpha.mp3")),
            Listing::Directory(_) => panic!("expected a file"),
        }

        assert!(matches!(store.list("nope").await, Err(HomeCloudError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_open_rejects_directories() {
        let (_temp_dir, store) = create_test_store(u64::MAX).await;
        let root = store.tracker().root().to_path_buf();
        std::fs::create_dir_all(root.join("folder")).unwrap();
        std::fs::write(root.join("folder/clip.mp4"), vec![0u8; 3]).unwrap();

        let opened = store.open("/folder/clip.mp4").await.unwrap();
        assert_eq!(opened.name, "clip.mp4");
        assert_eq!(opened.size, 3);

        assert!(matches!(store.open("folder").await, Err(HomeCloudError::InvalidRequest(_))));
        assert!(matches!(store.open("folder/none").await, Err(HomeCloudError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_detached_tracker_seeds_and_recomputes_usage() {
        let (_temp_dir, store) = create_test_store(u64::MAX).await;
        let tracker = store.tracker().clone();
        assert_eq!(tracker.current_usage_bytes(), 0);

        store.upload("", "a.bin", 100, body(&[&[7u8; 100]])).await.unwrap();
        store.upload("deep/er", "b.bin", 250, body(&[&[7u8; 250]])).await.unwrap();
        store.upload("deep", "c.bin", 0, body(&[])).await.unwrap();

        assert_eq!(tracker.recompute_now().await.unwrap(), 350);
        assert_eq!(tracker.current_usage_bytes(), 350);
        assert!(tracker.admit_upload(u64::MAX - 350));
        assert!(!tracker.admit_upload(u64::MAX - 349));
    }

    #[tokio::test]
    async fn test_upload_near_limit_not_charged_twice_for_own_bytes() {
        let (_temp_dir, store) = create_test_store(10).await;
        let usage = store.tracker().usage().clone();

        // Each chunk is also picked up by usage while the file is still being written,
        // as the watcher does when it stats a file that is growing.
        let chunks = stream::iter(vec![&b"1234"[..], &b"5678"[..]]).map(move |chunk| {
            usage.add(chunk.len() as u64);
            Ok::<_, std::io::Error>(Bytes::from_static(chunk))
        });

        let outcome = store.upload("", "near.bin", 8, chunks).await.unwrap();
        assert_eq!(outcome.size, 8);
        assert!(store.tracker().root().join("near.bin").exists());
    }

    #[tokio::test]
    async fn test_relocate_onto_itself_is_a_no_op() {
        let (_temp_dir, store) = create_test_store(u64::MAX).await;
        let root = store.tracker().root().to_path_buf();
        std::fs::create_dir_all(root.join("dir")).unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();

        assert_eq!(store.rename("a.txt", "a.txt").await.unwrap(), "a.txt");
        assert_eq!(store.move_entry("dir", "/dir/").await.unwrap(), "dir");
        assert!(root.join("a.txt").exists());
        assert!(!root.join("a(1).txt").exists());
        assert!(!root.join("dir(1)").exists());

        assert!(matches!(store.rename("gone.txt", "gone.txt").await, Err(HomeCloudError::NotFound(_))));
    }
}
