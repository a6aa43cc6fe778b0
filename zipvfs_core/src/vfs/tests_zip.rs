#[cfg(test)]
mod tests {
    use crate::vfs::{LocalFileStore, NullStore, ZipFileSystem, ZipStore};
    use std::fs;
    use std::io::{Cursor, Read, Write};
    use std::path::Path;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tempfile::TempDir;
    use url::Url;
    use zipvfs_common::{
        CancelToken, ErrorKind, FileInfo, FileStore, PutInfoOptions, StoreConfig, VfsError,
    };

    const TEXT: &[u8] = b"Hello World!";

    fn create_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).expect("Failed to create file");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options)
                    .expect("Failed to add directory");
            } else {
                zip.start_file(*name, options).expect("Failed to start file");
                zip.write_all(content).expect("Failed to write");
            }
        }
        zip.finish().expect("Failed to finish ZIP");
    }

    /// A valid archive whose only entry claims compression method 97
    fn create_zip_with_unsupported_method(path: &Path) {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file("Text.txt", options).expect("Failed to start file");
        zip.write_all(TEXT).expect("Failed to write");
        let mut bytes = zip.finish().expect("Failed to finish ZIP").into_inner();

        let method = 97u16.to_le_bytes();
        bytes[8..10].copy_from_slice(&method);
        let central = bytes
            .windows(4)
            .position(|window| window == b"PK\x01\x02")
            .expect("Central directory not found");
        bytes[central + 10..central + 12].copy_from_slice(&method);
        fs::write(path, bytes).expect("Failed to write archive");
    }

    fn root(fs: &ZipFileSystem, zip_path: &Path) -> ZipStore {
        let url = Url::from_file_path(zip_path).expect("Absolute path");
        fs.archive_root(&url).expect("file URL is an archive location")
    }

    fn read_string(store: &dyn FileStore) -> String {
        let mut content = String::new();
        store
            .open_input_stream()
            .expect("Failed to open entry")
            .read_to_string(&mut content)
            .expect("Failed to read entry");
        content
    }

    fn names(store: &dyn FileStore) -> Vec<String> {
        store
            .child_names(&CancelToken::new())
            .expect("Failed to list children")
    }

    fn sample_archive(temp: &TempDir) -> std::path::PathBuf {
        let zip_path = temp.path().join("Archive.zip");
        create_zip(
            &zip_path,
            &[
                ("Text.txt", TEXT),
                ("Folder/", b""),
                ("Folder/Text.txt", TEXT),
            ],
        );
        zip_path
    }

    // ============================================================================
    // Reading
    // ============================================================================

    #[test]
    fn test_directory_synthesis_from_flat_entries() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp.path().join("flat.zip");
        create_zip(&zip_path, &[("a/b/c.txt", b"c")]);

        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        assert_eq!(names(&root), vec!["a"]);
        let a = root.child("a");
        assert_eq!(names(a.as_ref()), vec!["b"]);

        let info = a.fetch_info().expect("Failed to fetch info");
        assert!(info.exists);
        assert!(info.is_dir);
        assert!(info.modified.is_none());

        let c = a.child("b/c.txt");
        assert_eq!(read_string(c.as_ref()), "c");
    }

    #[test]
    fn test_fetch_info_of_missing_entry_is_not_an_error() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();

        let info = root(&fs, &zip_path)
            .child("Nope.txt")
            .fetch_info()
            .expect("Missing entries are reported, not raised");
        assert!(!info.exists);
        assert_eq!(info.name, "Nope.txt");
    }

    #[test]
    fn test_missing_archive_reads_as_absent() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let fs = ZipFileSystem::default();
        let root = root(&fs, &temp.path().join("missing.zip"));

        assert!(!root.fetch_info().expect("Failed to fetch info").exists);
        assert!(names(&root).is_empty());
        assert!(root.child("x").open_input_stream().is_err());
    }

    #[test]
    fn test_open_input_stream_errors() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        let err = root.child("Folder").open_input_stream().err().expect("Directory");
        assert_eq!(err.kind(), ErrorKind::IsDirectory);

        let err = root.child("Missing.txt").open_input_stream().err().expect("Missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_file_info_for_file_entry() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();

        let info = root(&fs, &zip_path)
            .child("Folder/Text.txt")
            .fetch_info()
            .expect("Failed to fetch info");
        assert!(info.exists);
        assert!(!info.is_dir);
        assert_eq!(info.size, TEXT.len() as u64);
        assert!(info.modified.is_some());
    }

    #[test]
    fn test_unsupported_compression_method_fails_closed() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp.path().join("BadArchive.zip");
        create_zip_with_unsupported_method(&zip_path);
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        let err = root.child_names(&CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedCompressionMethod);
        let err = root.fetch_info().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedCompressionMethod);

        // Editing is refused too, and the archive stays as it was
        let before = fs::read(&zip_path).expect("Failed to read archive");
        let err = root.child("New.txt").write_bytes(b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedCompressionMethod);
        assert_eq!(fs::read(&zip_path).expect("Failed to read archive"), before);
    }

    #[test]
    fn test_cancelled_listing() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = root(&fs, &zip_path).child_infos(&cancel);
        assert!(matches!(result, Err(VfsError::Cancelled)));
    }

    // ============================================================================
    // Writing
    // ============================================================================

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        let new_file = root.child("NewFile.txt");
        let mut writer = new_file.open_output_stream().expect("Failed to open writer");
        writer.write_all(b"Foo").expect("Failed to write");
        writer.commit().expect("Failed to commit");

        assert_eq!(read_string(new_file.as_ref()), "Foo");
        // Existing entries survive the rebuild
        assert_eq!(read_string(root.child("Folder/Text.txt").as_ref()), "Hello World!");
    }

    #[test]
    fn test_uncommitted_writer_is_not_visible() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        let target = root.child("Text.txt");
        let mut writer = target.open_output_stream().expect("Failed to open writer");
        writer.write_all(b"partial").expect("Failed to write");
        assert_eq!(read_string(target.as_ref()), "Hello World!");
        drop(writer);
        assert_eq!(read_string(target.as_ref()), "Hello World!");
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        root.child("x/y/z.txt").write_bytes(b"deep").expect("Failed to write");
        assert!(root.child("x/y").fetch_info().expect("info").is_dir);
        assert_eq!(names(root.child("x").as_ref()), vec!["y"]);
    }

    #[test]
    fn test_large_write_spills_to_disk() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::new(StoreConfig {
            spill_threshold: 1024,
            ..StoreConfig::default()
        });
        let root = root(&fs, &zip_path);

        let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        root.child("big.bin").write_bytes(&payload).expect("Failed to write");
        assert_eq!(root.child("big.bin").read_bytes().expect("Failed to read"), payload);
    }

    #[test]
    fn test_write_to_root_is_rejected() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();

        let err = root(&fs, &zip_path).open_output_stream().err().expect("Root");
        assert_eq!(err.kind(), ErrorKind::IsDirectory);
    }

    #[test]
    fn test_writing_creates_missing_archive() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp.path().join("fresh.zip");
        let fs = ZipFileSystem::default();

        root(&fs, &zip_path)
            .child("hello.txt")
            .write_bytes(b"hi")
            .expect("Failed to write");
        assert!(zip_path.exists());
        let archive = zip::ZipArchive::new(fs::File::open(&zip_path).expect("open"))
            .expect("Result is a valid archive");
        assert_eq!(archive.len(), 1);
    }

    // ============================================================================
    // mkdir / delete
    // ============================================================================

    #[test]
    fn test_mkdir_is_idempotent() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        let dir = root.child("Empty");
        dir.mkdir().expect("Failed to create directory");
        let bytes = fs::read(&zip_path).expect("Failed to read archive");
        dir.mkdir().expect("Second mkdir succeeds");
        assert_eq!(fs::read(&zip_path).expect("Failed to read archive"), bytes);

        let info = dir.fetch_info().expect("Failed to fetch info");
        assert!(info.exists && info.is_dir);
        assert!(names(&root).contains(&"Empty".to_string()));

        let archive = zip::ZipArchive::new(fs::File::open(&zip_path).expect("open")).expect("valid");
        let markers = archive.file_names().filter(|name| *name == "Empty/").count();
        assert_eq!(markers, 1);
    }

    #[test]
    fn test_mkdir_over_file_fails() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();

        let err = root(&fs, &zip_path).child("Text.txt").mkdir().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotADirectory);
    }

    #[test]
    fn test_delete_removes_descendants() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        root.child("Folder").delete().expect("Failed to delete");
        assert!(!root.child("Folder").fetch_info().expect("info").exists);
        assert!(!root.child("Folder/Text.txt").fetch_info().expect("info").exists);
        assert!(root.child("Text.txt").fetch_info().expect("info").exists);
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();

        let before = fs::read(&zip_path).expect("Failed to read archive");
        root(&fs, &zip_path).child("Ghost").delete().expect("No-op delete");
        assert_eq!(fs::read(&zip_path).expect("Failed to read archive"), before);
    }

    #[test]
    fn test_delete_root_removes_archive_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();

        root(&fs, &zip_path).delete().expect("Failed to delete archive");
        assert!(!zip_path.exists());
    }

    // ============================================================================
    // move
    // ============================================================================

    #[test]
    fn test_move_within_archive_is_rename() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp.path().join("Archive.zip");
        create_zip(&zip_path, &[("a/Text.txt", TEXT)]);
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        let source = root.child("a/Text.txt");
        let destination = root.child("b/Text.txt");
        source.move_to(destination.as_ref()).expect("Failed to move");

        assert!(!source.fetch_info().expect("info").exists);
        assert_eq!(read_string(destination.as_ref()), "Hello World!");
        assert_eq!(fs.registry().held_count(), 0);
    }

    #[test]
    fn test_move_directory_within_archive() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        root.child("Folder")
            .move_to(root.child("Renamed").as_ref())
            .expect("Failed to move");
        assert_eq!(names(&root), vec!["Renamed", "Text.txt"]);
        assert_eq!(read_string(root.child("Renamed/Text.txt").as_ref()), "Hello World!");
    }

    #[test]
    fn test_move_entry_to_disk() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        let target = LocalFileStore::from_path(&temp.path().join("out.txt")).expect("path");
        root.child("Text.txt").move_to(&target).expect("Failed to move");

        assert_eq!(fs::read(temp.path().join("out.txt")).expect("read"), TEXT);
        assert!(!root.child("Text.txt").fetch_info().expect("info").exists);
    }

    #[test]
    fn test_move_disk_file_into_archive() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let source_path = temp.path().join("NewFile.txt");
        fs::write(&source_path, b"Foo").expect("Failed to write");
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        let source = LocalFileStore::from_path(&source_path).expect("path");
        source
            .move_to(root.child("NewFile.txt").as_ref())
            .expect("Failed to move");

        assert!(!source_path.exists());
        assert_eq!(read_string(root.child("NewFile.txt").as_ref()), "Foo");
    }

    #[test]
    fn test_move_between_archives() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let first = sample_archive(&temp);
        let second = temp.path().join("Second.zip");
        create_zip(&second, &[("keep.txt", b"k")]);
        let fs = ZipFileSystem::default();

        root(&fs, &first)
            .child("Folder")
            .move_to(root(&fs, &second).child("Imported").as_ref())
            .expect("Failed to move");

        assert!(!root(&fs, &first).child("Folder").fetch_info().expect("info").exists);
        assert_eq!(
            read_string(root(&fs, &second).child("Imported/Text.txt").as_ref()),
            "Hello World!"
        );
    }

    #[test]
    fn test_failed_move_leaves_source_and_destination() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let bad = temp.path().join("Bad.zip");
        create_zip_with_unsupported_method(&bad);
        let fs = ZipFileSystem::default();

        let bad_bytes = fs::read(&bad).expect("read");
        let result = root(&fs, &zip_path)
            .child("Text.txt")
            .move_to(root(&fs, &bad).child("Text2.txt").as_ref());
        assert!(result.is_err());
        assert!(root(&fs, &zip_path).child("Text.txt").fetch_info().expect("info").exists);
        assert_eq!(fs::read(&bad).expect("read"), bad_bytes);
    }

    #[test]
    fn test_move_onto_own_ancestor_is_rejected() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp.path().join("Archive.zip");
        create_zip(&zip_path, &[("a/b.txt", b"b"), ("a/keep.txt", b"keep")]);
        let before = fs::read(&zip_path).expect("read");
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        let err = root
            .child("a/b.txt")
            .move_to(root.child("a").as_ref())
            .expect_err("Moving onto an ancestor must fail");
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        assert_eq!(fs::read(&zip_path).expect("read"), before);
        assert_eq!(read_string(root.child("a/b.txt").as_ref()), "b");
        assert_eq!(read_string(root.child("a/keep.txt").as_ref()), "keep");
        assert_eq!(fs.registry().held_count(), 0);
    }

    #[test]
    fn test_move_onto_existing_directory_is_rejected() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let before = fs::read(&zip_path).expect("read");
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        let err = root
            .child("Text.txt")
            .move_to(root.child("Folder").as_ref())
            .expect_err("Replacing a directory must fail");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&zip_path).expect("read"), before);
        assert_eq!(names(root.child("Folder").as_ref()), vec!["Text.txt"]);
    }

    #[test]
    fn test_move_directory_into_own_subtree_is_rejected() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let before = fs::read(&zip_path).expect("read");
        let fs = ZipFileSystem::default();
        let root = root(&fs, &zip_path);

        let result = root
            .child("Folder")
            .move_to(root.child("Folder/Sub").as_ref());
        assert!(matches!(result, Err(VfsError::Unsupported(_))));
        assert_eq!(fs::read(&zip_path).expect("read"), before);
    }

    #[test]
    fn test_move_archive_root_renames_archive_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let renamed = temp.path().join("Renamed.zip");
        let fs = ZipFileSystem::default();

        root(&fs, &zip_path)
            .move_to(&LocalFileStore::from_path(&renamed).expect("path"))
            .expect("Failed to move archive");

        assert!(!zip_path.exists());
        assert_eq!(names(&root(&fs, &renamed)), vec!["Folder", "Text.txt"]);
    }

    // ============================================================================
    // putInfo / identity
    // ============================================================================

    #[test]
    fn test_put_info_persists_last_modified() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();
        let entry = root(&fs, &zip_path).child("Folder/Text.txt");

        // 2020-01-02 03:04:06 UTC
        let when = UNIX_EPOCH + Duration::from_secs(1_577_934_246);
        let mut info = FileInfo::file("Text.txt", 0, Some(when));
        entry
            .put_info(&info, PutInfoOptions::last_modified())
            .expect("Failed to set last modified");

        let fetched = entry.fetch_info().expect("info");
        assert_eq!(fetched.modified, Some(when));
        assert_eq!(read_string(entry.as_ref()), "Hello World!");

        info.read_only = true;
        let err = entry.put_info(&info, PutInfoOptions::attributes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(!entry.capabilities().set_attributes);
    }

    #[test]
    fn test_put_info_on_synthesized_directory() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp.path().join("flat.zip");
        create_zip(&zip_path, &[("a/b.txt", b"b")]);
        let fs = ZipFileSystem::default();
        let dir = root(&fs, &zip_path).child("a");

        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_577_934_246);
        dir.put_info(&FileInfo::directory("a", Some(when)), PutInfoOptions::last_modified())
            .expect("Failed to set last modified");
        assert_eq!(dir.fetch_info().expect("info").modified, Some(when));
    }

    #[test]
    fn test_child_and_parent_are_pure() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let fs = ZipFileSystem::default();
        let root = root(&fs, &temp.path().join("never-created.zip"));

        let child = root.child("a").child("b.txt");
        assert_eq!(child.name(), "b.txt");
        let parent = child.parent().expect("parent");
        assert_eq!(parent.to_uri(), root.child("a").to_uri());
        assert!(root.parent().is_none());
        assert_eq!(root.name(), "never-created.zip");
        assert!(!temp.path().join("never-created.zip").exists());
    }

    #[test]
    fn test_uri_round_trips_through_resolver() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();
        let entry = root(&fs, &zip_path).child("Folder/Text.txt");

        let resolved = fs.resolve(&entry.to_uri());
        let resolved = resolved
            .as_any()
            .downcast_ref::<ZipStore>()
            .expect("zip URI resolves to a zip store");
        assert_eq!(resolved.inner_path(), "Folder/Text.txt");
        assert_eq!(resolved.to_uri(), entry.to_uri());
        assert_eq!(read_string(resolved), "Hello World!");
    }

    #[test]
    fn test_bang_style_uri_resolves() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let zip_path = sample_archive(&temp);
        let fs = ZipFileSystem::default();

        let archive_url = Url::from_file_path(&zip_path).expect("Absolute path");
        let store = fs.resolve_str(&format!("zip:{}!/Folder/Text.txt", archive_url));
        assert_eq!(read_string(store.as_ref()), "Hello World!");
    }

    #[test]
    fn test_foreign_uris_resolve_to_null_store() {
        let fs = ZipFileSystem::default();
        for uri in ["http://example.com/a.zip", "zip:/no-query.txt", "::::"] {
            let store = fs.resolve_str(uri);
            assert!(store.as_any().downcast_ref::<NullStore>().is_some(), "{}", uri);
            assert!(!store.fetch_info().expect("info").exists);
            assert!(store.child_names(&CancelToken::new()).expect("names").is_empty());
        }
    }
}
