use super::helpers::*;
use crate::{Db, DbError, DbOptions};
use engine::Options as EngineOptions;
use std::fs;
use tempfile::tempdir;

// --------------------- Basic operations ---------------------

#[test]
fn put_get_roundtrip_and_readonly_reopen() {
    let dir = tempdir().unwrap();
    {
        let db = open_rw(dir.path()).unwrap();
        db.put(b"a", b"1").unwrap();
        assert_eq!(db.get(b"a").unwrap(), b"1");
        db.close().unwrap();
    }

    let db = open_ro(dir.path()).unwrap();
    assert_eq!(db.get(b"a").unwrap(), b"1");
}

#[test]
fn get_missing_key_is_not_found() {
    let dir = tempdir().unwrap();
    let db = open_rw(dir.path()).unwrap();
    assert!(matches!(db.get(b"absent"), Err(DbError::KeyNotFound)));
}

#[test]
fn delete_hides_key() {
    let dir = tempdir().unwrap();
    let db = open_rw(dir.path()).unwrap();

    db.put(b"k", b"v").unwrap();
    db.delete(b"k").unwrap();
    assert!(matches!(db.get(b"k"), Err(DbError::KeyNotFound)));
}

#[test]
fn overwrite_returns_latest_value() {
    let dir = tempdir().unwrap();
    let db = open_rw(dir.path()).unwrap();

    db.put(b"k", b"v1").unwrap();
    db.put(b"k", b"v2").unwrap();
    assert_eq!(db.get(b"k").unwrap(), b"v2");
}

#[test]
fn keys_lists_live_keys() {
    let dir = tempdir().unwrap();
    let db = open_rw(dir.path()).unwrap();

    db.put(b"a", b"1").unwrap();
    db.put(b"b", b"2").unwrap();
    db.delete(b"a").unwrap();

    let mut keys = db.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec![b"b".to_vec()]);
}

// --------------------- Merge through the facade ---------------------

#[test]
fn merge_preserves_reads() {
    let dir = tempdir().unwrap();
    let db = open_rw(dir.path()).unwrap();

    db.put(b"keep", b"v").unwrap();
    db.put(b"drop", b"v").unwrap();
    db.delete(b"drop").unwrap();

    db.merge().unwrap();

    assert_eq!(db.get(b"keep").unwrap(), b"v");
    assert!(matches!(db.get(b"drop"), Err(DbError::KeyNotFound)));
}

#[test]
fn merge_on_close_compacts_the_directory() {
    let dir = tempdir().unwrap();
    {
        let db = Db::open(
            dir.path(),
            EngineOptions {
                read_write: true,
                sync_on_put: false,
                max_file_size: 128,
            },
            DbOptions {
                merge_on_close: true,
                ..DbOptions::default()
            },
        )
        .unwrap();

        for i in 0..20u32 {
            db.put(format!("key{:02}", i).as_bytes(), &[b'v'; 32])
                .unwrap();
        }
        db.close().unwrap();
    }

    let data_files = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "data").unwrap_or(false))
        .count();
    assert_eq!(data_files, 1);

    let db = open_ro(dir.path()).unwrap();
    for i in 0..20u32 {
        assert_eq!(
            db.get(format!("key{:02}", i).as_bytes()).unwrap(),
            vec![b'v'; 32]
        );
    }
}

// --------------------- Filter interplay ---------------------

#[test]
fn filter_is_seeded_from_existing_keys() {
    let dir = tempdir().unwrap();
    {
        let db = open_rw(dir.path()).unwrap();
        db.put(b"persisted", b"v").unwrap();
        db.close().unwrap();
    }

    // a fresh handle must find the key even though its filter started empty
    let db = open_ro(dir.path()).unwrap();
    assert_eq!(db.get(b"persisted").unwrap(), b"v");
}

#[test]
fn deleted_keys_stay_hidden_after_reopen() {
    let dir = tempdir().unwrap();
    {
        let db = open_rw(dir.path()).unwrap();
        db.put(b"k", b"v").unwrap();
        db.delete(b"k").unwrap();
        db.close().unwrap();
    }

    let db = open_ro(dir.path()).unwrap();
    assert!(matches!(db.get(b"k"), Err(DbError::KeyNotFound)));
}
