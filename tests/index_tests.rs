// Extendable Hash Index Tests for ehash
// These tests exercise lookup, insertion, deletion and the split protocol

use ehash::index::{open_index, Index, IndexKind};
use ehash::{
    Database, Error, ExtendableHashIndex, FieldType, HashFunction, IndexOptions, Options, RecordId,
    Value,
};
use std::collections::HashMap;
use tempfile::TempDir;

fn init_logger() {
    env_logger::builder().is_test(true).try_init().ok();
}

fn open_db(dir: &TempDir) -> Database {
    init_logger();
    Database::open(dir.path(), Options::default().block_size(512).sync_on_commit(false)).unwrap()
}

fn identity(capacity: u32) -> IndexOptions {
    IndexOptions::default()
        .bucket_capacity(capacity)
        .hash_function(HashFunction::Identity)
}

fn lookup(index: &mut ExtendableHashIndex, key: &Value) -> Vec<RecordId> {
    let mut found = Vec::new();
    index.position(key).unwrap();
    while index.advance().unwrap() {
        found.push(index.current_locator().unwrap());
    }
    found
}

/// Capacity 2, keys 0, 2 and 4: the third insert doubles the directory and splits bucket 0
#[test]
fn test_split_scenario() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let mut index = db.open_index(&tx, "scenario", identity(2)).unwrap();
    assert_eq!(index.global_depth(), 1);

    let k1 = (Value::Int(0), RecordId::new(10, 1));
    let k2 = (Value::Int(2), RecordId::new(10, 2));
    let k3 = (Value::Int(4), RecordId::new(10, 3));
    index.insert(&k1.0, k1.1).unwrap();
    index.insert(&k2.0, k2.1).unwrap();
    assert_eq!(index.global_depth(), 1);

    index.insert(&k3.0, k3.1).unwrap();
    assert_eq!(index.global_depth(), 2);
    assert_eq!(index.bucket_count(), 3);

    // Repartitioned by hash mod 4
    assert_eq!(index.bucket_of(&k1.0).unwrap(), 0);
    assert_eq!(index.bucket_of(&k2.0).unwrap(), 2);
    assert_eq!(index.bucket_of(&k3.0).unwrap(), 0);

    for (key, rid) in [&k1, &k2, &k3] {
        assert_eq!(lookup(&mut index, key), vec![*rid], "lookup of {}", key);
    }
    index.verify_integrity().unwrap();
}

/// Inserting (k, r) then positioning on k finds r
#[test]
fn test_round_trip() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let mut index = db.open_index(&tx, "rt", IndexOptions::default().bucket_capacity(4)).unwrap();
    for i in 0..200 {
        let rid = RecordId::new(i as u32 / 10, i as u32 % 10);
        index.insert(&Value::Int(i), rid).unwrap();
        assert!(lookup(&mut index, &Value::Int(i)).contains(&rid));
    }
    for i in 0..200 {
        assert_eq!(lookup(&mut index, &Value::Int(i)).len(), 1);
    }
    assert!(lookup(&mut index, &Value::Int(1000)).is_empty());

    let stats = index.stats().unwrap();
    assert_eq!(stats.entry_count, 200);
    assert_eq!(stats.directory_size, 1u64 << stats.global_depth);
    index.verify_integrity().unwrap();
}

/// Duplicate keys with distinct locators are all returned
#[test]
fn test_duplicate_keys() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let mut index = db.open_index(&tx, "dups", identity(4)).unwrap();
    let rids: Vec<RecordId> = (0..3).map(|i| RecordId::new(0, i)).collect();
    for rid in &rids {
        index.insert(&Value::Int(6), *rid).unwrap();
    }
    index.insert(&Value::Int(7), RecordId::new(9, 9)).unwrap();

    let mut found = lookup(&mut index, &Value::Int(6));
    found.sort();
    assert_eq!(found, rids);
}

/// Deleting the same entry twice: the second call finds nothing and changes nothing
#[test]
fn test_idempotent_delete() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let mut index = db.open_index(&tx, "del", identity(2)).unwrap();
    for key in 0..8 {
        index.insert(&Value::Int(key), RecordId::new(1, key as u32)).unwrap();
    }
    let before = index.stats().unwrap();

    assert!(index.delete(&Value::Int(5), RecordId::new(1, 5)).unwrap());
    let after_first = index.stats().unwrap();
    assert_eq!(after_first.entry_count, before.entry_count - 1);

    assert!(!index.delete(&Value::Int(5), RecordId::new(1, 5)).unwrap());
    assert_eq!(index.stats().unwrap(), after_first);

    // Right key, wrong locator
    assert!(!index.delete(&Value::Int(4), RecordId::new(1, 5)).unwrap());
    assert_eq!(lookup(&mut index, &Value::Int(4)), vec![RecordId::new(1, 4)]);
    index.verify_integrity().unwrap();
}

/// The entries of a splitting bucket end up in it or its sibling, none lost
#[test]
fn test_no_lost_entries_across_split() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let mut index = db.open_index(&tx, "split", identity(4)).unwrap();
    let keys = [0, 2, 4, 6];
    for key in keys {
        index.insert(&Value::Int(key), RecordId::new(2, key as u32)).unwrap();
    }
    assert_eq!(index.bucket_count(), 2);

    index.insert(&Value::Int(8), RecordId::new(2, 8)).unwrap();
    assert_eq!(index.bucket_count(), 3);

    for key in keys {
        let bucket = index.bucket_of(&Value::Int(key)).unwrap();
        assert!(bucket == 0 || bucket == 2);
        assert_eq!(lookup(&mut index, &Value::Int(key)), vec![RecordId::new(2, key as u32)]);
    }
    assert_eq!(index.stats().unwrap().entry_count, 5);
    index.verify_integrity().unwrap();
}

/// Keys outside the splitting bucket keep their bucket when the directory doubles
#[test]
fn test_doubling_preserves_reachability() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let mut index = db.open_index(&tx, "dbl", identity(3)).unwrap();
    let odd = [1, 3, 5];
    for key in odd {
        index.insert(&Value::Int(key), RecordId::new(0, key as u32)).unwrap();
    }
    for key in [0, 2, 4] {
        index.insert(&Value::Int(key), RecordId::new(0, key as u32)).unwrap();
    }

    let before: HashMap<i32, u32> = odd
        .iter()
        .map(|&k| (k, index.bucket_of(&Value::Int(k)).unwrap()))
        .collect();
    let depth = index.global_depth();

    // Overflows bucket 0 at full depth
    index.insert(&Value::Int(8), RecordId::new(0, 8)).unwrap();
    assert_eq!(index.global_depth(), depth + 1);

    for key in odd {
        assert_eq!(index.bucket_of(&Value::Int(key)).unwrap(), before[&key]);
        assert_eq!(lookup(&mut index, &Value::Int(key)), vec![RecordId::new(0, key as u32)]);
    }
    index.verify_integrity().unwrap();
}

/// Deleting every entry of a bucket keeps the bucket and the directory size
#[test]
fn test_empty_bucket_remains() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let mut index = db.open_index(&tx, "empty", identity(2)).unwrap();
    for key in [0, 2, 4] {
        index.insert(&Value::Int(key), RecordId::new(0, key as u32)).unwrap();
    }
    let before = index.stats().unwrap();

    // Bucket 2 only holds key 2
    assert!(index.delete(&Value::Int(2), RecordId::new(0, 2)).unwrap());

    let after = index.stats().unwrap();
    assert_eq!(after.bucket_count, before.bucket_count);
    assert_eq!(after.global_depth, before.global_depth);
    assert_eq!(after.entry_count, 2);
    assert_eq!(index.bucket_of(&Value::Int(2)).unwrap(), 2);
    assert!(lookup(&mut index, &Value::Int(2)).is_empty());
    index.verify_integrity().unwrap();

    // The empty bucket is reused
    index.insert(&Value::Int(6), RecordId::new(0, 6)).unwrap();
    assert_eq!(index.bucket_of(&Value::Int(6)).unwrap(), 2);
    assert_eq!(index.stats().unwrap().bucket_count, before.bucket_count);
}

/// More identical keys than a bucket holds cannot be split apart
#[test]
fn test_identical_keys_are_rejected() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let mut index = db.open_index(&tx, "same", IndexOptions::default().bucket_capacity(3)).unwrap();
    for slot in 0..3 {
        index.insert(&Value::Int(77), RecordId::new(0, slot)).unwrap();
    }
    let before = index.stats().unwrap();

    let err = index.insert(&Value::Int(77), RecordId::new(0, 3)).unwrap_err();
    assert!(matches!(err, Error::DegenerateKeyDistribution { .. }), "got {}", err);
    assert_eq!(index.stats().unwrap(), before);

    // Other keys are unaffected
    index.insert(&Value::Int(78), RecordId::new(1, 0)).unwrap();
    index.verify_integrity().unwrap();
}

/// Varchar keys hash through their canonical encoding
#[test]
fn test_string_keys() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let options = IndexOptions::default()
        .bucket_capacity(5)
        .key_type(FieldType::Varchar(16));
    let mut index = db.open_index(&tx, "names", options).unwrap();
    let names: Vec<String> = (0..120).map(|i| format!("student-{}", i)).collect();
    for (i, name) in names.iter().enumerate() {
        index.insert(&Value::from(name.as_str()), RecordId::new(i as u32, 0)).unwrap();
    }

    for (i, name) in names.iter().enumerate() {
        assert_eq!(
            lookup(&mut index, &Value::from(name.as_str())),
            vec![RecordId::new(i as u32, 0)]
        );
    }
    assert!(lookup(&mut index, &Value::from("nobody")).is_empty());
    assert!(index
        .insert(&Value::from("a name that is far too long"), RecordId::new(0, 0))
        .is_err());
    assert!(index.insert(&Value::Int(1), RecordId::new(0, 0)).is_err());
    index.verify_integrity().unwrap();
}

/// Only extendable indexes can be opened through the generic contract
#[test]
fn test_open_index_by_kind() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let mut index = open_index("ex".parse().unwrap(), &tx, "generic", identity(2)).unwrap();
    index.insert(&Value::Int(3), RecordId::new(4, 5)).unwrap();
    index.position(&Value::Int(3)).unwrap();
    assert!(index.advance().unwrap());
    assert_eq!(index.current_locator().unwrap(), RecordId::new(4, 5));
    assert!(index.delete(&Value::Int(3), RecordId::new(4, 5)).unwrap());
    index.close();
    index.close();

    for kind in [IndexKind::StaticHash, IndexKind::BTree] {
        let result = open_index(kind, &tx, "other", identity(2));
        assert!(matches!(result, Err(Error::NotImplemented(_))));
    }
}

/// Two indexes in one database never share buckets or depths
#[test]
fn test_indexes_are_independent() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let mut a = db.open_index(&tx, "a", identity(1)).unwrap();
    let mut b = db.open_index(&tx, "b", identity(1)).unwrap();
    for key in 0..16 {
        a.insert(&Value::Int(key), RecordId::new(0, key as u32)).unwrap();
    }
    b.insert(&Value::Int(0), RecordId::new(1, 0)).unwrap();

    assert_eq!(a.global_depth(), 4);
    assert_eq!(b.global_depth(), 1);
    assert_eq!(b.bucket_count(), 2);
    assert_eq!(lookup(&mut b, &Value::Int(0)), vec![RecordId::new(1, 0)]);
    a.verify_integrity().unwrap();
    b.verify_integrity().unwrap();
}

/// Cost estimate divides index blocks by live buckets
#[test]
fn test_estimated_search_cost() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let tx = db.begin();

    let mut index = db.open_index(&tx, "cost", identity(1)).unwrap();
    assert_eq!(index.estimated_search_cost(64, 10), 32);
    for key in 0..8 {
        index.insert(&Value::Int(key), RecordId::new(0, key as u32)).unwrap();
    }
    assert_eq!(index.bucket_count(), 8);
    assert_eq!(index.estimated_search_cost(64, 10), 8);
    assert_eq!(ExtendableHashIndex::search_cost(5, 8), 1);
}
