use pibackup::identity::{resolve_identity, DEFAULT_IDENTITY, UNIQUE_ID_FILE};
use std::fs;

#[test]
fn test_stored_identity_is_sanitized() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join(UNIQUE_ID_FILE), "../My Drive\nsecond line\n").unwrap();
    assert_eq!(resolve_identity(tmp.path()), "My_Drive");
}

#[test]
fn test_generated_identity_is_stored_and_reused() {
    let tmp = tempfile::tempdir().unwrap();
    let first = resolve_identity(tmp.path());
    assert_eq!(first.len(), 6);
    assert!(first
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

    let stored = fs::read_to_string(tmp.path().join(UNIQUE_ID_FILE)).unwrap();
    assert_eq!(stored.trim(), first);
    assert_eq!(resolve_identity(tmp.path()), first);
}

#[test]
fn test_blank_identity_is_replaced() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join(UNIQUE_ID_FILE), "  ...  \n").unwrap();
    let identity = resolve_identity(tmp.path());
    assert_eq!(identity.len(), 6);
    assert_ne!(identity, DEFAULT_IDENTITY);
}

#[test]
fn test_unwritable_volume_falls_back_to_default() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("gone");
    assert_eq!(resolve_identity(&missing), DEFAULT_IDENTITY);
}

#[test]
fn test_non_utf8_identity_falls_back_to_default() {
    let tmp = tempfile::tempdir().unwrap();
    let id_path = tmp.path().join(UNIQUE_ID_FILE);
    fs::write(&id_path, b"\xff\xfeDrive\n").unwrap();

    assert_eq!(resolve_identity(tmp.path()), DEFAULT_IDENTITY);
    assert_eq!(fs::read(&id_path).unwrap(), b"\xff\xfeDrive\n");
}
