use pgext_fs::io;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_write_atomic_creates_file_and_parents() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("out/nested/manifest.json");

    io::write_atomic(&path, b"{}").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
}

#[test]
fn test_write_atomic_overwrites_existing() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("manifest.json");
    fs::write(&path, "original").unwrap();

    io::write_atomic(&path, b"updated").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "updated");
}

#[test]
fn test_write_atomic_leaves_no_temp_files() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("manifest.json");

    io::write_text(&path, "content").unwrap();

    let names: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["manifest.json".to_string()]);
}

#[test]
fn test_read_text_nonexistent_file() {
    let result = io::read_text(std::path::Path::new("/nonexistent/file.txt"));
    assert!(matches!(result, Err(pgext_fs::Error::Io { .. })));
}

#[test]
fn test_is_missing_or_empty() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("vector");

    assert!(io::is_missing_or_empty(&dir).unwrap());

    fs::create_dir(&dir).unwrap();
    assert!(io::is_missing_or_empty(&dir).unwrap());

    fs::write(dir.join("vector.so"), "").unwrap();
    assert!(!io::is_missing_or_empty(&dir).unwrap());
}

#[test]
fn test_remove_dir_if_exists_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("stale");
    fs::create_dir_all(dir.join("lib")).unwrap();

    io::remove_dir_if_exists(&dir).unwrap();
    assert!(!dir.exists());
    io::remove_dir_if_exists(&dir).unwrap();
}
