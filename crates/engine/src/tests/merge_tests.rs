use super::helpers::*;
use crate::{Engine, EngineError, Options};
use tempfile::tempdir;

#[test]
fn merge_collapses_to_single_segment() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(
        dir.path(),
        Options {
            read_write: true,
            sync_on_put: false,
            max_file_size: 128,
        },
    )
    .unwrap();

    for i in 0..20u32 {
        engine
            .put(format!("key{:02}", i).as_bytes(), &[b'v'; 32])
            .unwrap();
    }
    assert!(count_data_files(dir.path()) >= 3);

    engine.merge().unwrap();

    assert_eq!(count_data_files(dir.path()), 1);
    for i in 0..20u32 {
        assert_eq!(
            engine.get(format!("key{:02}", i).as_bytes()).unwrap(),
            vec![b'v'; 32]
        );
    }
}

#[test]
fn merge_drops_overwritten_and_deleted_records() {
    let dir = tempdir().unwrap();
    let engine = open_rw(dir.path()).unwrap();

    engine.put(b"k", b"v1").unwrap();
    engine.put(b"k", b"v2").unwrap();
    engine.delete(b"k").unwrap();
    assert!(matches!(engine.get(b"k"), Err(EngineError::KeyNotFound)));

    engine.merge().unwrap();

    assert_eq!(count_data_files(dir.path()), 1);
    assert!(matches!(engine.get(b"k"), Err(EngineError::KeyNotFound)));
    assert_eq!(engine.key_count().unwrap(), 0);
}

#[test]
fn merge_keeps_live_values_intact() {
    let dir = tempdir().unwrap();
    let engine = open_rw(dir.path()).unwrap();

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.put(b"a", b"1-new").unwrap();
    engine.delete(b"b").unwrap();
    engine.put(b"c", b"3").unwrap();

    engine.merge().unwrap();

    assert_eq!(engine.get(b"a").unwrap(), b"1-new");
    assert!(matches!(engine.get(b"b"), Err(EngineError::KeyNotFound)));
    assert_eq!(engine.get(b"c").unwrap(), b"3");

    // everything now lives in the merged segment
    assert_eq!(engine.segment_count().unwrap(), 1);
}

#[test]
fn merged_segment_accepts_new_writes() {
    let dir = tempdir().unwrap();
    let engine = open_rw(dir.path()).unwrap();

    engine.put(b"old", b"1").unwrap();
    engine.merge().unwrap();
    engine.put(b"new", b"2").unwrap();

    assert_eq!(engine.get(b"old").unwrap(), b"1");
    assert_eq!(engine.get(b"new").unwrap(), b"2");
}

#[test]
fn merge_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let engine = open_rw(dir.path()).unwrap();
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        engine.delete(b"b").unwrap();
        engine.merge().unwrap();
        engine.close().unwrap();
    }

    let engine = open_ro(dir.path()).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), b"1");
    assert!(matches!(engine.get(b"b"), Err(EngineError::KeyNotFound)));
}

#[test]
fn merge_of_empty_engine_is_fine() {
    let dir = tempdir().unwrap();
    let engine = open_rw(dir.path()).unwrap();

    engine.merge().unwrap();
    assert_eq!(count_data_files(dir.path()), 1);

    engine.put(b"k", b"v").unwrap();
    assert_eq!(engine.get(b"k").unwrap(), b"v");
}

#[test]
fn repeated_merges_converge() {
    let dir = tempdir().unwrap();
    let engine = open_rw(dir.path()).unwrap();

    engine.put(b"k", b"v").unwrap();
    engine.merge().unwrap();
    engine.merge().unwrap();

    assert_eq!(count_data_files(dir.path()), 1);
    assert_eq!(engine.get(b"k").unwrap(), b"v");
}

#[test]
fn no_sentinel_left_after_merge() {
    let dir = tempdir().unwrap();
    let engine = open_rw(dir.path()).unwrap();
    engine.put(b"k", b"v").unwrap();
    engine.merge().unwrap();

    assert!(!dir.path().join("MERGE").exists());
    assert!(!dir.path().join("MERGE.tmp").exists());
}
