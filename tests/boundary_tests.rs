// Boundary Tests for dupkv
// Edge cases in keys, values and batch shapes

use dupkv::{DuplicateCheckMode, KeyCheck, Options, WriteBatch, WriteOptions, DB};
use tempfile::TempDir;

#[test]
fn test_empty_database_operations() {
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), Options::default()).unwrap();

    assert_eq!(db.get(b"nonexistent").unwrap(), None);
    db.delete(b"nonexistent").unwrap();
    db.write(WriteBatch::new()).unwrap();

    let stats = db.dedup_stats();
    assert_eq!(stats.lookups_performed, 0);
    // The delete is a batch of its own; the empty batch is never committed.
    assert_eq!(stats.batches_committed, 1);
}

#[test]
fn test_empty_key_and_value() {
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), Options::default()).unwrap();

    assert!(db.put_if_absent(b"", b"").unwrap());
    assert_eq!(db.get(b"").unwrap(), Some(Vec::new()));
    assert!(!db.put_if_absent(b"", b"x").unwrap());
}

#[test]
fn test_large_value_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let value = vec![0x5Au8; 200 * 1024];

    {
        let db = DB::open(dir.path(), Options::default()).unwrap();
        db.put(b"big", &value).unwrap();
        db.close().unwrap();
    }

    let db = DB::open(dir.path(), Options::default()).unwrap();
    assert_eq!(db.get(b"big").unwrap(), Some(value));
    assert!(!db.put_if_absent(b"big", b"small").unwrap());
}

#[test]
fn test_binary_data_keys() {
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), Options::default()).unwrap();

    let keys: Vec<Vec<u8>> = vec![
        vec![0x00],
        vec![0x00, 0x00],
        vec![0xFF; 16],
        vec![0x00, 0xFF, 0x00],
        (0..=255).collect(),
    ];
    for key in &keys {
        assert!(db.put_if_absent(key, key).unwrap());
    }
    for key in &keys {
        assert_eq!(db.get(key).unwrap().as_ref(), Some(key));
        assert!(!db.put_if_absent(key, b"again").unwrap());
    }
}

#[test]
fn test_prefix_keys_are_distinct() {
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), Options::default()).unwrap();

    db.put(b"key", b"1").unwrap();
    assert!(db.put_if_absent(b"key1", b"2").unwrap());
    assert!(db.put_if_absent(b"ke", b"3").unwrap());
    assert_eq!(db.get(b"key").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_alternating_put_delete() {
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), Options::default()).unwrap();

    for i in 0..50 {
        assert!(db.put_if_absent(b"toggle", format!("{}", i).as_bytes()).unwrap());
        db.delete(b"toggle").unwrap();
    }
    assert_eq!(db.get(b"toggle").unwrap(), None);
}

#[test]
fn test_put_delete_put_in_one_batch() {
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), Options::default()).unwrap();
    db.put(b"k", b"old").unwrap();

    let mut batch = WriteBatch::new();
    batch.put(b"k", b"a");
    batch.delete(b"k");
    batch.put(b"k", b"b");
    let report = db.write_opt(batch, &WriteOptions::only_if_absent()).unwrap();

    assert_eq!(
        report.checks,
        vec![KeyCheck::FoundInStore, KeyCheck::Unchecked, KeyCheck::DeletedInBatch]
    );
    assert_eq!(report.rejected, 1);
    assert_eq!(db.get(b"k").unwrap(), Some(b"b".to_vec()));
}

#[test]
fn test_tiny_filter() {
    let dir = TempDir::new().unwrap();
    let options = Options::default()
        .duplicate_check_mode(DuplicateCheckMode::FilterAssisted)
        .filter_expected_keys(1)
        .filter_bits_per_key(1)
        .filter_num_hashes(1)
        .filter_saturation_factor(10_000);
    let db = DB::open(dir.path(), options).unwrap();

    for i in 0..500 {
        db.put(format!("key{}", i).as_bytes(), b"v").unwrap();
    }
    // A 64-bit filter fills up fast but must stay exact.
    for i in 0..500 {
        assert!(!db.put_if_absent(format!("key{}", i).as_bytes(), b"dup").unwrap());
    }
    assert_eq!(db.dedup_stats().filter_num_bits, 64);
}
