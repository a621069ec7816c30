// Property Tests for ehash
// These tests run random insert and delete sequences against an index and
// compare it with an in-memory model after every run

use ehash::{Database, Error, ExtendableHashIndex, HashFunction, Index, IndexOptions, Options, RecordId, Value};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tempfile::TempDir;

const CAPACITY: u32 = 3;
const KEY_SPACE: i32 = 48;

#[derive(Debug, Clone)]
enum Op {
    Insert(i32, u32),
    Delete(i32, u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..KEY_SPACE, 0u32..4).prop_map(|(k, b)| Op::Insert(k, b)),
        1 => (0..KEY_SPACE, 0u32..4).prop_map(|(k, b)| Op::Delete(k, b)),
    ]
}

/// Multiset of entries, keyed by search key
#[derive(Default)]
struct Model {
    entries: HashMap<i32, Vec<RecordId>>,
}

impl Model {
    fn copies(&self, key: i32) -> usize {
        self.entries.get(&key).map_or(0, Vec::len)
    }

    fn insert(&mut self, key: i32, rid: RecordId) {
        self.entries.entry(key).or_default().push(rid);
    }

    fn delete(&mut self, key: i32, rid: RecordId) -> bool {
        let Some(rids) = self.entries.get_mut(&key) else {
            return false;
        };
        match rids.iter().position(|r| *r == rid) {
            Some(pos) => {
                rids.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    fn sorted(&self, key: i32) -> Vec<RecordId> {
        let mut rids = self.entries.get(&key).cloned().unwrap_or_default();
        rids.sort();
        rids
    }
}

fn lookup(index: &mut ExtendableHashIndex, key: i32) -> Vec<RecordId> {
    index.position(&Value::Int(key)).unwrap();
    let mut found = Vec::new();
    while index.advance().unwrap() {
        found.push(index.current_locator().unwrap());
    }
    found.sort();
    found
}

fn check_against_model(index: &mut ExtendableHashIndex, model: &Model) {
    index.verify_integrity().unwrap();
    assert_eq!(index.stats().unwrap().entry_count, model.len());
    for key in 0..KEY_SPACE {
        assert_eq!(lookup(index, key), model.sorted(key), "key {}", key);
    }
}

fn apply(index: &mut ExtendableHashIndex, model: &mut Model, op: &Op) {
    match *op {
        Op::Insert(key, block) => {
            let rid = RecordId::new(block, key as u32);
            let result = index.insert(&Value::Int(key), rid);
            if model.copies(key) >= CAPACITY as usize {
                // A full bucket of one key cannot be split
                assert!(matches!(result, Err(Error::DegenerateKeyDistribution { .. })));
            } else {
                result.unwrap();
                model.insert(key, rid);
            }
        }
        Op::Delete(key, block) => {
            let rid = RecordId::new(block, key as u32);
            let removed = index.delete(&Value::Int(key), rid).unwrap();
            assert_eq!(removed, model.delete(key, rid));
        }
    }
}

fn run(hash_function: HashFunction, ops: &[Op]) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path(), Options::default().block_size(512).sync_on_commit(false)).unwrap();
    let opts = IndexOptions::default()
        .bucket_capacity(CAPACITY)
        .hash_function(hash_function);

    let mut model = Model::default();
    let tx = db.begin();
    let mut index = db.open_index(&tx, "prop", opts.clone()).unwrap();
    for op in ops {
        apply(&mut index, &mut model, op);
    }
    check_against_model(&mut index, &model);
    index.close();
    tx.commit().unwrap();

    // The committed state matches as well
    let tx = db.begin();
    let mut index = db.open_index(&tx, "prop", opts).unwrap();
    check_against_model(&mut index, &model);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Random operation sequences keep every structural invariant with crc32 hashing
    #[test]
    fn prop_random_ops_crc32(ops in prop::collection::vec(op(), 1..120)) {
        run(HashFunction::Crc32, &ops);
    }

    /// Random operation sequences keep every structural invariant with identity hashing
    #[test]
    fn prop_random_ops_identity(ops in prop::collection::vec(op(), 1..120)) {
        run(HashFunction::Identity, &ops);
    }

    /// Global depth never exceeds what the distinct keys require
    #[test]
    fn prop_depth_is_bounded(keys in prop::collection::hash_set(0..1024i32, 1..200)) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path(), Options::default().block_size(512).sync_on_commit(false)).unwrap();
        let tx = db.begin();
        let opts = IndexOptions::default().bucket_capacity(2).hash_function(HashFunction::Identity);
        let mut index = db.open_index(&tx, "prop", opts).unwrap();
        for &key in &keys {
            index.insert(&Value::Int(key), RecordId::new(0, 0)).unwrap();
        }
        let stats = index.stats().unwrap();
        prop_assert!(stats.global_depth <= 10);
        prop_assert_eq!(stats.directory_size, 1u64 << stats.global_depth);
        prop_assert!(stats.bucket_count as u64 <= stats.directory_size);
        prop_assert_eq!(stats.entry_count, keys.len());
    }
}

/// A long seeded workload with string keys stays consistent
#[test]
fn test_random_string_workload() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path(), Options::default().block_size(1024).sync_on_commit(false)).unwrap();
    let opts = IndexOptions::default()
        .bucket_capacity(5)
        .key_type(ehash::FieldType::Varchar(12));

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut live: Vec<(String, RecordId)> = Vec::new();

    for round in 0..5 {
        let tx = db.begin();
        let mut index = db.open_index(&tx, "words", opts.clone()).unwrap();
        for i in 0..200 {
            if !live.is_empty() && rng.random_bool(0.3) {
                let (key, rid) = live.swap_remove(rng.random_range(0..live.len()));
                assert!(index.delete(&Value::Str(key), rid).unwrap());
            } else {
                let key = format!("w{}", rng.random_range(0..100_000u32));
                let rid = RecordId::new(round, i);
                index.insert(&Value::Str(key.clone()), rid).unwrap();
                live.push((key, rid));
            }
        }
        index.verify_integrity().unwrap();
        index.close();
        tx.commit().unwrap();
    }

    let tx = db.begin();
    let mut index = db.open_index(&tx, "words", opts).unwrap();
    assert_eq!(index.stats().unwrap().entry_count, live.len());
    for (key, rid) in &live {
        index.position(&Value::Str(key.clone())).unwrap();
        let mut found = false;
        while index.advance().unwrap() {
            found |= index.current_locator().unwrap() == *rid;
        }
        assert!(found, "lost {} at {}", key, rid);
    }
}
