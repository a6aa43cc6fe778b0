#[cfg(test)]
mod tests {
    use crate::vfs::LocalFileStore;
    use std::fs;
    use std::io::Write;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;
    use zipvfs_common::{CancelToken, ErrorKind, FileInfo, FileStore, PutInfoOptions};

    fn store(temp: &TempDir) -> LocalFileStore {
        LocalFileStore::from_path(temp.path()).expect("Failed to create store")
    }

    #[test]
    fn test_child_infos_sorted() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp.path().join("b.txt"), "b").expect("Failed to write");
        fs::write(temp.path().join("a.txt"), "aa").expect("Failed to write");
        fs::create_dir(temp.path().join("c")).expect("Failed to create dir");

        let infos = store(&temp)
            .child_infos(&CancelToken::new())
            .expect("Failed to list");
        let names: Vec<_> = infos.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c"]);
        assert_eq!(infos[0].size, 2);
        assert!(infos[2].is_dir);
    }

    #[test]
    fn test_missing_path_is_described() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let missing = store(&temp).child("nope/deeper.txt");

        let info = missing.fetch_info().expect("Missing paths are not errors");
        assert!(!info.exists);
        assert_eq!(info.name, "deeper.txt");
        assert!(missing
            .child_names(&CancelToken::new())
            .expect("Failed to list")
            .is_empty());

        let err = missing.open_input_stream().err().expect("Missing file");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_child_and_parent_round_trip() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = store(&temp);
        let child = root.child("a b/c.txt");

        assert_eq!(child.name(), "c.txt");
        let parent = child.parent().expect("parent");
        assert_eq!(parent.name(), "a b");
        assert_eq!(
            parent.parent().expect("grandparent").to_uri(),
            root.to_uri()
        );
    }

    #[test]
    fn test_output_stream_commit_and_discard() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let file = store(&temp).child("sub/out.txt");

        let mut writer = file.open_output_stream().expect("Failed to open writer");
        writer.write_all(b"discarded").expect("Failed to write");
        drop(writer);
        assert!(!temp.path().join("sub/out.txt").exists());

        file.write_bytes(b"kept").expect("Failed to write");
        assert_eq!(fs::read(temp.path().join("sub/out.txt")).expect("read"), b"kept");
        assert_eq!(file.read_bytes().expect("Failed to read"), b"kept");
    }

    #[test]
    fn test_mkdir_and_delete() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dir = store(&temp).child("x/y");

        dir.mkdir().expect("Failed to mkdir");
        dir.mkdir().expect("mkdir is idempotent");
        dir.child("f.txt").write_bytes(b"f").expect("Failed to write");

        let err = dir.child("f.txt").mkdir().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotADirectory);

        store(&temp).child("x").delete().expect("Failed to delete");
        assert!(!temp.path().join("x").exists());
        store(&temp).child("x").delete().expect("Deleting twice is a no-op");
    }

    #[test]
    fn test_move_renames_on_disk() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp.path().join("from.txt"), "content").expect("Failed to write");
        let root = store(&temp);

        root.child("from.txt")
            .move_to(root.child("dir/to.txt").as_ref())
            .expect("Failed to move");
        assert!(!temp.path().join("from.txt").exists());
        assert_eq!(
            fs::read_to_string(temp.path().join("dir/to.txt")).expect("read"),
            "content"
        );

        let err = root
            .child("from.txt")
            .move_to(root.child("again.txt").as_ref())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_put_info_sets_mtime_and_readonly() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let file = store(&temp).child("f.txt");
        file.write_bytes(b"f").expect("Failed to write");

        let when = UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        let mut info = FileInfo::file("f.txt", 1, Some(when));
        file.put_info(&info, PutInfoOptions::last_modified())
            .expect("Failed to set mtime");
        assert_eq!(file.fetch_info().expect("info").modified, Some(when));

        info.read_only = true;
        file.put_info(&info, PutInfoOptions::attributes())
            .expect("Failed to set attributes");
        assert!(file.fetch_info().expect("info").read_only);

        info.read_only = false;
        file.put_info(&info, PutInfoOptions::attributes())
            .expect("Failed to clear attributes");
    }
}
