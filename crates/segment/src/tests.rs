use super::*;
use byteorder::{BigEndian, ByteOrder};
use tempfile::tempdir;

// -------------------- Codec round-trips --------------------

#[test]
fn put_roundtrip() {
    let rec = Record::put(b"key".to_vec(), b"value".to_vec(), 1234, 0);
    let buf = rec.encode();
    assert_eq!(buf.len(), rec.encoded_len());
    assert_eq!(Record::decode(&buf).unwrap(), rec);
}

#[test]
fn delete_roundtrip() {
    let rec = Record::delete(b"gone".to_vec(), 99, 7);
    let decoded = Record::decode(&rec.encode()).unwrap();
    assert_eq!(decoded, rec);
    assert!(decoded.is_tombstone());
}

#[test]
fn txn_marker_roundtrip() {
    for rec in [Record::txn_begin(42), Record::txn_end(42)] {
        let buf = rec.encode();
        assert_eq!(buf.len(), HEADER_SIZE); // markers carry no payload
        assert_eq!(Record::decode(&buf).unwrap(), rec);
    }
}

#[test]
fn empty_key_and_value_roundtrip() {
    let rec = Record::put(Vec::new(), Vec::new(), 0, 0);
    assert_eq!(Record::decode(&rec.encode()).unwrap(), rec);
}

#[test]
fn binary_key_and_value_roundtrip() {
    let key = vec![0x00u8, 0xFF, 0x80];
    let value = vec![0xDEu8, 0xAD, 0xBE, 0xEF];
    let rec = Record::put(key.clone(), value.clone(), -5, -5);
    let decoded = Record::decode(&rec.encode()).unwrap();
    assert_eq!(decoded.key(), &key[..]);
    assert_eq!(decoded, rec);
}

#[test]
fn negative_timestamps_survive() {
    let rec = Record::put(b"k".to_vec(), b"v".to_vec(), i64::MIN, i64::MAX);
    assert_eq!(Record::decode(&rec.encode()).unwrap(), rec);
}

// -------------------- Corruption detection --------------------

#[test]
fn any_single_bit_flip_is_detected() {
    let rec = Record::put(b"key".to_vec(), b"value".to_vec(), 77, 3);
    let clean = rec.encode();

    for byte_idx in 0..clean.len() {
        for bit in 0..8 {
            let mut tampered = clean.clone();
            tampered[byte_idx] ^= 1 << bit;
            let result = Record::decode(&tampered);
            assert!(
                matches!(result, Err(SegmentError::InvalidChecksum)),
                "flip at byte {} bit {} was not caught",
                byte_idx,
                bit
            );
        }
    }
}

#[test]
fn short_buffer_is_invalid_entry() {
    let buf = Record::put(b"k".to_vec(), b"v".to_vec(), 1, 0).encode();
    for len in 0..HEADER_SIZE.min(buf.len()) {
        assert!(matches!(
            Record::decode(&buf[..len]),
            Err(SegmentError::InvalidEntry)
        ));
    }
}

#[test]
fn trailing_garbage_is_invalid_entry() {
    // Lengths inconsistent with the buffer must be rejected even when the
    // CRC is recomputed to match.
    let mut buf = Record::put(b"k".to_vec(), b"v".to_vec(), 1, 0).encode();
    buf.push(0xAB);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[4..]);
    BigEndian::write_u32(&mut buf[0..4], hasher.finalize());

    assert!(matches!(
        Record::decode(&buf),
        Err(SegmentError::InvalidEntry)
    ));
}

#[test]
fn unknown_type_tag_is_invalid_entry() {
    let mut buf = Record::txn_begin(1).encode();
    buf[4] = 9;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[4..]);
    BigEndian::write_u32(&mut buf[0..4], hasher.finalize());

    assert!(matches!(
        Record::decode(&buf),
        Err(SegmentError::InvalidEntry)
    ));
}

#[test]
fn span_len_reads_header_lengths() {
    let rec = Record::put(b"abc".to_vec(), b"defg".to_vec(), 1, 0);
    let buf = rec.encode();
    assert_eq!(Record::span_len(&buf[..HEADER_SIZE]).unwrap(), buf.len());
    assert!(matches!(
        Record::span_len(&buf[..HEADER_SIZE - 1]),
        Err(SegmentError::InvalidEntry)
    ));
}

// -------------------- Segment files --------------------

#[test]
fn append_then_read_at() {
    let dir = tempdir().unwrap();
    let seg = SegmentFile::open(dir.path(), 1, true).unwrap();

    let a = Record::put(b"a".to_vec(), b"1".to_vec(), 10, 0);
    let b = Record::put(b"b".to_vec(), b"2".to_vec(), 11, 0);

    let (off_a, len_a) = seg.append(&a).unwrap();
    let (off_b, len_b) = seg.append(&b).unwrap();

    assert_eq!(off_a, 0);
    assert_eq!(off_b, len_a); // records are packed back to back
    assert_eq!(seg.len().unwrap(), len_a + len_b);

    assert_eq!(seg.read_at(off_a, len_a).unwrap(), a);
    assert_eq!(seg.read_at(off_b, len_b).unwrap(), b);
}

#[test]
fn read_span_walks_without_sizes() {
    let dir = tempdir().unwrap();
    let seg = SegmentFile::open(dir.path(), 3, true).unwrap();

    let records = vec![
        Record::put(b"one".to_vec(), b"1".to_vec(), 1, 0),
        Record::delete(b"one".to_vec(), 2, 0),
        Record::put(b"two".to_vec(), b"22".to_vec(), 3, 0),
    ];
    for rec in &records {
        seg.append(rec).unwrap();
    }

    let mut offset = 0;
    let mut walked = Vec::new();
    while offset < seg.len().unwrap() {
        let (rec, span) = seg.read_span(offset).unwrap();
        walked.push(rec);
        offset += span;
    }
    assert_eq!(walked, records);
}

#[test]
fn reopen_resumes_at_tail() {
    let dir = tempdir().unwrap();
    let rec = Record::put(b"k".to_vec(), b"v".to_vec(), 1, 0);

    let first_len;
    {
        let seg = SegmentFile::open(dir.path(), 5, true).unwrap();
        let (_, len) = seg.append(&rec).unwrap();
        first_len = len;
        seg.sync().unwrap();
    }

    let seg = SegmentFile::open(dir.path(), 5, true).unwrap();
    assert_eq!(seg.len().unwrap(), first_len);
    let (offset, _) = seg.append(&rec).unwrap();
    assert_eq!(offset, first_len);
}

#[test]
fn filename_is_zero_padded() {
    assert_eq!(data_file_name(17), "000000017.data");
    assert_eq!(data_file_name(123456789), "123456789.data");
}

#[test]
fn open_missing_readonly_fails() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        SegmentFile::open(dir.path(), 99, false),
        Err(SegmentError::Io(_))
    ));
}

#[test]
fn close_is_idempotent() {
    let dir = tempdir().unwrap();
    let seg = SegmentFile::open(dir.path(), 1, true).unwrap();
    seg.append(&Record::put(b"k".to_vec(), b"v".to_vec(), 1, 0))
        .unwrap();
    seg.close().unwrap();
    seg.close().unwrap();
}

#[test]
fn read_with_wrong_size_fails_validation() {
    let dir = tempdir().unwrap();
    let seg = SegmentFile::open(dir.path(), 1, true).unwrap();
    let rec = Record::put(b"k".to_vec(), b"v".to_vec(), 1, 0);
    let (offset, len) = seg.append(&rec).unwrap();
    seg.append(&rec).unwrap();

    // A span covering more than one record cannot decode cleanly.
    let result = seg.read_at(offset, len + 1);
    assert!(matches!(
        result,
        Err(SegmentError::InvalidChecksum) | Err(SegmentError::InvalidEntry)
    ));
}

#[test]
fn replacement_publishes_atomically() {
    let dir = tempdir().unwrap();
    let rec = Record::put(b"k".to_vec(), b"v".to_vec(), 1, 0);

    let tmp = SegmentFile::create_replacement(dir.path(), 7).unwrap();
    let (offset, len) = tmp.append(&rec).unwrap();
    assert!(dir.path().join("000000007.data.tmp").exists());
    assert!(!dir.path().join("000000007.data").exists());

    tmp.publish().unwrap();
    assert!(!dir.path().join("000000007.data.tmp").exists());

    let seg = SegmentFile::open(dir.path(), 7, false).unwrap();
    assert_eq!(seg.read_at(offset, len).unwrap(), rec);
}

#[test]
fn replacement_truncates_leftovers() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("000000007.data.tmp"), b"stale bytes").unwrap();

    let tmp = SegmentFile::create_replacement(dir.path(), 7).unwrap();
    assert_eq!(tmp.len().unwrap(), 0);
}
