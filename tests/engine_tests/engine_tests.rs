//! Tests for Engine
//!
//! These tests verify:
//! - Insert / read round trips across close and reopen
//! - Block packing (records never split across blocks)
//! - Resume after reopen and repack of the tail block
//! - Checksum enforcement on the read path
//! - Rejected inserts leave persisted state alone
//! - Open modes (read-only, memory mapped) and misuse errors

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tuplestore::codec::BlockCodec;
use tuplestore::config::StoreConfig;
use tuplestore::engine::Engine;
use tuplestore::storage::{
    inspect, write_block_at, write_header, BlockHeader, BlockStatus, FileHeader,
    BLOCK_HEADER_SIZE, BLOCK_SIZE, FILE_HEADER_SIZE, MAX_RECORD_SIZE, RECORD_HEADER_SIZE,
};
use tuplestore::StoreError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.dat");
    (temp_dir, path)
}

fn open_writer(path: &Path) -> Engine {
    Engine::open_path(path, false, false).unwrap()
}

fn open_reader(path: &Path) -> Engine {
    Engine::open_path(path, true, false).unwrap()
}

/// Deterministic record `i` of `len` bytes
fn make_record(i: usize, len: usize) -> Vec<u8> {
    (0..len).map(|j| ((i * 31 + j * 7) % 251) as u8).collect()
}

fn insert_all(path: &Path, records: &[Vec<u8>]) {
    let mut engine = open_writer(path);
    for record in records {
        engine.insert(record).unwrap();
    }
    engine.close().unwrap();
}

fn read_all(path: &Path) -> Vec<Vec<u8>> {
    let mut engine = open_reader(path);
    let mut out = Vec::new();
    while let Some(record) = engine.read_next().unwrap() {
        out.push(record.to_vec());
    }
    out
}

// =============================================================================
// Open / Bootstrap Tests
// =============================================================================

#[test]
fn test_open_creates_file_with_default_header() {
    let (_temp, path) = setup_temp_path();
    assert!(!path.exists());

    let engine = open_writer(&path);
    engine.close().unwrap();

    assert_eq!(fs::read(&path).unwrap(), FILE_HEADER_SIZE.to_le_bytes());
    assert!(read_all(&path).is_empty());
}

#[test]
fn test_open_readonly_missing_file_fails() {
    let (_temp, path) = setup_temp_path();

    let result = Engine::open_path(&path, true, false);

    assert!(matches!(result, Err(StoreError::Open { .. })));
    assert!(!path.exists());
}

#[test]
fn test_open_readonly_empty_file_reads_nothing() {
    let (_temp, path) = setup_temp_path();
    fs::write(&path, b"").unwrap();

    let mut engine = open_reader(&path);

    assert!(engine.read_next().unwrap().is_none());
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn test_mmap_requires_readonly() {
    let (_temp, path) = setup_temp_path();

    let result = Engine::open_path(&path, false, true);

    assert!(matches!(result, Err(StoreError::Config(_))));
    assert!(!path.exists());
}

#[test]
fn test_initial_state() {
    let (_temp, path) = setup_temp_path();

    let engine = open_writer(&path);

    assert_eq!(engine.block_status(), BlockStatus::Invalid);
    assert_eq!(engine.header().last_block_offset, FILE_HEADER_SIZE);
    assert!(!engine.is_readonly());
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_insert_read_round_trip() {
    let (_temp, path) = setup_temp_path();
    let records: Vec<Vec<u8>> = (0..100).map(|i| make_record(i, 1 + i * 13)).collect();

    insert_all(&path, &records);

    assert_eq!(read_all(&path), records);
}

#[test]
fn test_round_trip_through_mmap() {
    let (_temp, path) = setup_temp_path();
    let records: Vec<Vec<u8>> = (0..40).map(|i| make_record(i, 50_000)).collect();
    insert_all(&path, &records);

    let mut engine = Engine::open_path(&path, true, true).unwrap();
    let read: Vec<Vec<u8>> = engine.records().map(|r| r.unwrap().to_vec()).collect();

    assert_eq!(read, records);
}

#[test]
fn test_first_insert_allocates_new_block() {
    let (_temp, path) = setup_temp_path();
    let mut engine = open_writer(&path);

    engine.insert(b"first").unwrap();

    assert_eq!(engine.block_status(), BlockStatus::New);
    assert_eq!(engine.block_offset(), FILE_HEADER_SIZE);
    assert_eq!(engine.cursor(), RECORD_HEADER_SIZE + 5);
}

#[test]
fn test_read_past_end_keeps_returning_none() {
    let (_temp, path) = setup_temp_path();
    insert_all(&path, &[b"only".to_vec()]);

    let mut engine = open_reader(&path);

    assert_eq!(&engine.read_next().unwrap().unwrap()[..], b"only");
    assert!(engine.read_next().unwrap().is_none());
    assert!(engine.read_next().unwrap().is_none());
}

/// A file whose only block holds no records (first slot is the sentinel)
fn write_zero_record_block(path: &Path) {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .unwrap();
    write_header(&mut file, &FileHeader::default()).unwrap();

    let mut codec = BlockCodec::new(1).unwrap();
    let compressed = codec.compress(&vec![0u8; BLOCK_SIZE]).unwrap();
    let header = BlockHeader::for_payload(compressed).unwrap();
    write_block_at(&mut file, FILE_HEADER_SIZE, &header, compressed).unwrap();
}

#[test]
fn test_zero_record_block_reads_as_end() {
    let (_temp, path) = setup_temp_path();
    write_zero_record_block(&path);

    let mut engine = open_reader(&path);

    assert!(engine.read_next().unwrap().is_none());
    assert!(engine.read_next().unwrap().is_none());
    assert!(!engine.is_poisoned());
}

#[test]
fn test_zero_record_block_resumes_at_start() {
    let (_temp, path) = setup_temp_path();
    write_zero_record_block(&path);

    let mut engine = open_writer(&path);
    engine.insert(b"first").unwrap();
    assert_eq!(engine.block_status(), BlockStatus::Modified);
    assert_eq!(engine.cursor(), RECORD_HEADER_SIZE + 5);
    engine.close().unwrap();

    assert_eq!(read_all(&path), vec![b"first".to_vec()]);
}

// =============================================================================
// Block Packing Tests
// =============================================================================

#[test]
fn test_records_never_split_across_blocks() {
    let (_temp, path) = setup_temp_path();
    // 10 records of this size fit a block; the 11th starts a new one
    let records: Vec<Vec<u8>> = (0..25).map(|i| make_record(i, 100_000)).collect();

    insert_all(&path, &records);

    let summary = inspect(&path).unwrap();
    let per_block: Vec<u64> = summary.blocks.iter().map(|b| b.record_count).collect();
    assert_eq!(per_block, vec![10, 10, 5]);
    assert_eq!(summary.header.last_block_offset, summary.blocks[2].offset);
    assert_eq!(read_all(&path), records);
}

#[test]
fn test_max_size_record_fills_block() {
    let (_temp, path) = setup_temp_path();
    let big = make_record(1, MAX_RECORD_SIZE);
    insert_all(&path, &[big.clone(), b"next".to_vec()]);

    let summary = inspect(&path).unwrap();

    assert_eq!(summary.blocks.len(), 2);
    assert_eq!(summary.blocks[0].used_bytes, BLOCK_SIZE);
    assert_eq!(read_all(&path), vec![big, b"next".to_vec()]);
}

#[test]
fn test_full_tail_block_resumes_into_new_block() {
    let (_temp, path) = setup_temp_path();
    let big = make_record(2, MAX_RECORD_SIZE);
    insert_all(&path, &[big.clone()]);

    insert_all(&path, &[b"after".to_vec()]);

    let summary = inspect(&path).unwrap();
    assert_eq!(summary.blocks.len(), 2);
    assert_eq!(read_all(&path), vec![big, b"after".to_vec()]);
}

// =============================================================================
// Resume / Repack Tests
// =============================================================================

#[test]
fn test_resume_after_reopen() {
    let (_temp, path) = setup_temp_path();
    let first: Vec<Vec<u8>> = (0..30).map(|i| make_record(i, 200)).collect();
    let second: Vec<Vec<u8>> = (30..75).map(|i| make_record(i, 300)).collect();

    insert_all(&path, &first);
    insert_all(&path, &second);

    let expected: Vec<Vec<u8>> = first.into_iter().chain(second).collect();
    assert_eq!(read_all(&path), expected);
}

#[test]
fn test_reopen_repacks_tail_in_place() {
    let (_temp, path) = setup_temp_path();
    insert_all(&path, &[b"alpha".to_vec()]);
    let before = inspect(&path).unwrap();

    let mut engine = open_writer(&path);
    engine.insert(b"beta").unwrap();
    assert_eq!(engine.block_status(), BlockStatus::Modified);
    assert_eq!(engine.cursor(), 2 * RECORD_HEADER_SIZE + 5 + 4);
    engine.close().unwrap();

    let after = inspect(&path).unwrap();
    assert_eq!(after.blocks.len(), 1);
    assert_eq!(after.blocks[0].offset, before.blocks[0].offset);
    assert_eq!(after.blocks[0].record_count, 2);
    assert_eq!(
        after.file_size,
        FILE_HEADER_SIZE + BLOCK_HEADER_SIZE + u64::from(after.blocks[0].compressed_size)
    );
}

#[test]
fn test_resume_across_many_sessions() {
    let (_temp, path) = setup_temp_path();
    let mut expected = Vec::new();

    for session in 0..5 {
        let batch: Vec<Vec<u8>> = (0..20)
            .map(|i| make_record(session * 100 + i, 30_000))
            .collect();
        insert_all(&path, &batch);
        expected.extend(batch);
    }

    assert_eq!(read_all(&path), expected);
    assert_eq!(inspect(&path).unwrap().record_count, 100);
}

#[test]
fn test_explicit_flush_then_continue() {
    let (_temp, path) = setup_temp_path();
    let mut engine = open_writer(&path);

    engine.insert(b"one").unwrap();
    engine.flush().unwrap();
    assert_eq!(engine.block_status(), BlockStatus::Loaded);
    assert_eq!(read_all(&path), vec![b"one".to_vec()]);

    engine.insert(b"two").unwrap();
    assert_eq!(engine.block_status(), BlockStatus::Modified);
    engine.close().unwrap();

    assert_eq!(read_all(&path), vec![b"one".to_vec(), b"two".to_vec()]);
}

#[test]
fn test_flush_of_clean_block_is_noop() {
    let (_temp, path) = setup_temp_path();
    insert_all(&path, &[b"steady".to_vec()]);
    let before = fs::read(&path).unwrap();

    let mut engine = open_writer(&path);
    engine.flush().unwrap();
    engine.close().unwrap();

    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_drop_flushes_pending_block() {
    let (_temp, path) = setup_temp_path();
    {
        let mut engine = open_writer(&path);
        engine.insert(b"kept").unwrap();
    }

    assert_eq!(read_all(&path), vec![b"kept".to_vec()]);
}

// =============================================================================
// Checksum Enforcement Tests
// =============================================================================

#[test]
fn test_corrupt_payload_fails_read() {
    let (_temp, path) = setup_temp_path();
    let records: Vec<Vec<u8>> = (0..10).map(|i| make_record(i, 1_000)).collect();
    insert_all(&path, &records);

    let mut bytes = fs::read(&path).unwrap();
    let target = (FILE_HEADER_SIZE + BLOCK_HEADER_SIZE) as usize + 17;
    bytes[target] ^= 0x80;
    fs::write(&path, &bytes).unwrap();

    let mut engine = open_reader(&path);
    let err = engine.read_next().unwrap_err();

    assert!(err.is_corruption());
    assert!(err.is_fatal());
}

#[test]
fn test_corrupt_second_block_fails_when_reached() {
    let (_temp, path) = setup_temp_path();
    let records: Vec<Vec<u8>> = (0..15).map(|i| make_record(i, 100_000)).collect();
    insert_all(&path, &records);
    let second = inspect(&path).unwrap().blocks[1].offset;

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x04;
    fs::write(&path, &bytes).unwrap();
    assert!(second < last as u64);

    let mut engine = open_reader(&path);
    for expected in records.iter().take(10) {
        assert_eq!(&engine.read_next().unwrap().unwrap()[..], &expected[..]);
    }
    let err = engine.read_next().unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_corrupt_tail_fails_resume() {
    let (_temp, path) = setup_temp_path();
    insert_all(&path, &[b"victim".to_vec()]);

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let mut engine = open_writer(&path);
    let err = engine.insert(b"more").unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_corruption_poisons_read_session() {
    let (_temp, path) = setup_temp_path();
    insert_all(&path, &[b"a".to_vec(), b"b".to_vec()]);

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x10;
    fs::write(&path, &bytes).unwrap();

    let mut engine = open_reader(&path);
    assert!(engine.read_next().unwrap_err().is_corruption());
    assert!(engine.is_poisoned());

    let err = engine.read_next().unwrap_err();
    assert!(matches!(err, StoreError::Poisoned(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_corruption_poisons_write_session() {
    let (_temp, path) = setup_temp_path();
    insert_all(&path, &[b"victim".to_vec()]);

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&path, &bytes).unwrap();
    let before = fs::read(&path).unwrap();

    let mut engine = open_writer(&path);
    assert!(engine.insert(b"more").unwrap_err().is_corruption());
    assert!(matches!(engine.insert(b"more"), Err(StoreError::Poisoned(_))));
    engine.close().unwrap();

    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_rejected_insert_does_not_poison() {
    let (_temp, path) = setup_temp_path();
    let mut engine = open_writer(&path);

    assert!(engine.insert(b"").is_err());
    assert!(engine.insert(&vec![0u8; MAX_RECORD_SIZE + 1]).is_err());

    assert!(!engine.is_poisoned());
    engine.insert(b"fine").unwrap();
    engine.close().unwrap();
}

// =============================================================================
// Rejected Insert Tests
// =============================================================================

#[test]
fn test_oversized_record_rejected() {
    let (_temp, path) = setup_temp_path();
    insert_all(&path, &[b"existing".to_vec()]);
    let before = fs::read(&path).unwrap();

    let mut engine = open_writer(&path);
    let err = engine
        .insert(&vec![0u8; BLOCK_SIZE - RECORD_HEADER_SIZE + 1])
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::RecordTooLarge { size, max } if size == MAX_RECORD_SIZE + 1 && max == MAX_RECORD_SIZE
    ));
    assert!(!err.is_fatal());
    engine.close().unwrap();

    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_store_usable_after_oversized_record() {
    let (_temp, path) = setup_temp_path();
    let mut engine = open_writer(&path);

    engine.insert(b"before").unwrap();
    assert!(engine.insert(&vec![1u8; MAX_RECORD_SIZE + 10]).is_err());
    engine.insert(b"after").unwrap();
    engine.close().unwrap();

    assert_eq!(read_all(&path), vec![b"before".to_vec(), b"after".to_vec()]);
}

#[test]
fn test_empty_record_rejected() {
    let (_temp, path) = setup_temp_path();
    let mut engine = open_writer(&path);

    let err = engine.insert(b"").unwrap_err();

    assert!(matches!(err, StoreError::EmptyRecord));
    assert!(!err.is_fatal());
}

#[test]
fn test_insert_on_readonly_engine() {
    let (_temp, path) = setup_temp_path();
    insert_all(&path, &[b"x".to_vec()]);

    let mut engine = open_reader(&path);

    assert!(matches!(engine.insert(b"y"), Err(StoreError::ReadOnly)));
}

// =============================================================================
// Mixed Access Tests
// =============================================================================

#[test]
fn test_read_after_insert_rejected() {
    let (_temp, path) = setup_temp_path();
    let mut engine = open_writer(&path);
    engine.insert(b"pending").unwrap();

    let result = engine.read_next();

    assert!(matches!(result, Err(StoreError::MixedAccess(_))));
    engine.close().unwrap();
    assert_eq!(read_all(&path), vec![b"pending".to_vec()]);
}

#[test]
fn test_insert_after_read_rejected() {
    let (_temp, path) = setup_temp_path();
    insert_all(&path, &[b"a".to_vec()]);
    let mut engine = open_writer(&path);

    assert!(engine.read_next().unwrap().is_some());
    assert!(matches!(engine.insert(b"b"), Err(StoreError::MixedAccess(_))));
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_acceleration_does_not_change_contents() {
    let (_temp, path) = setup_temp_path();
    let records: Vec<Vec<u8>> = (0..20).map(|i| make_record(i, 10_000)).collect();

    let config = StoreConfig::builder().path(&path).acceleration(32).build();
    let mut engine = Engine::open(config).unwrap();
    for record in &records {
        engine.insert(record).unwrap();
    }
    engine.close().unwrap();

    assert_eq!(read_all(&path), records);
}
