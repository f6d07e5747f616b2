//! Integration tests for the collection store: concurrency and persistence.

use std::collections::HashSet;
use std::sync::Arc;

use collector::codec::{self, Record};
use collector::error::Error;
use collector::model::{Person, Visit};
use collector::storage::CollectionStore;
use proptest::prelude::*;
use tempfile::TempDir;

fn person(alias: &str, visits: &[(i32, i32, i32)]) -> Person {
    let visits = visits
        .iter()
        .map(|&(y, m, d)| Visit::new(y, m, d).unwrap())
        .collect();
    Person::with_visits(alias, visits).unwrap()
}

fn triples(store: &CollectionStore<Person>) -> Vec<(u64, Person, bool)> {
    store.scan(|entries| {
        entries
            .map(|(i, e)| (i, e.item().clone(), e.is_removed()))
            .collect()
    })
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_adds_get_unique_gap_free_indices() {
    let store = Arc::new(CollectionStore::new("unused.data"));
    let threads: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                (0..250)
                    .map(|n| store.add(person(&format!("p{t}-{n}"), &[])))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in threads {
        let indices = handle.join().unwrap();
        // Each thread observes its own adds in increasing order.
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
        seen.extend(indices);
    }

    assert_eq!(seen.len(), 2000);
    assert_eq!(seen, (1..=2000).collect::<HashSet<u64>>());
    assert_eq!(store.size(), 2000);
}

#[test]
fn concurrent_modify_loses_no_visits() {
    let store = Arc::new(CollectionStore::new("unused.data"));
    let idx = store.add(person("Alice", &[]));

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for day in 1..=25 {
                    let visit = Visit::new(2020, 1, day).unwrap();
                    assert!(store.modify(idx, |p| p.add_visit(visit)));
                }
            })
        })
        .collect();
    for handle in threads {
        handle.join().unwrap();
    }

    assert_eq!(store.get(idx).unwrap().visits().len(), 100);
}

#[test]
fn remove_is_idempotent() {
    let store = CollectionStore::new("unused.data");
    store.add(person("Alice", &[]));
    store.add(person("Bob", &[]));

    assert!(store.remove(1));
    let once = triples(&store);
    assert!(store.remove(1));
    assert_eq!(triples(&store), once);
    assert!(!store.remove(3));
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn save_then_load_reproduces_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lab.data");

    let store = CollectionStore::new(&path);
    store.add(person("Alice", &[(2020, 5, 17)]));
    store.add(person("Bob", &[]));
    store.add(person("Carol", &[(2019, 1, 1), (2021, 12, 31)]));
    store.remove(2);
    store.update(3, person("Caroline", &[(2022, 2, 2)]));
    store.save().unwrap();

    let fresh = CollectionStore::new("elsewhere.data");
    fresh.load(&path).unwrap();
    assert_eq!(triples(&fresh), triples(&store));
    assert_eq!(fresh.file_name(), path);
}

#[test]
fn file_layout_is_count_then_flagged_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lab.data");

    let store = CollectionStore::new(&path);
    store.add(person("Al", &[]));
    store.remove(1);
    store.save().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let mut expected = 1u64.to_le_bytes().to_vec();
    expected.push(1);
    expected.extend_from_slice(&[2, 0, b'A', b'l']);
    expected.extend_from_slice(&0u64.to_le_bytes());
    assert_eq!(bytes, expected);
}

#[test]
fn load_replaces_existing_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lab.data");

    let saved = CollectionStore::new(&path);
    saved.add(person("Alice", &[]));
    saved.save().unwrap();

    let store = CollectionStore::new("unused.data");
    store.add(person("X", &[]));
    store.add(person("Y", &[]));
    store.load(&path).unwrap();

    assert_eq!(store.size(), 1);
    assert_eq!(store.get(1).unwrap().alias(), "Alice");
    // Indexing continues after the loaded entries.
    assert_eq!(store.add(person("Bob", &[])), 2);
}

#[test]
fn missing_file_is_an_io_error_and_keeps_the_binding() {
    let dir = TempDir::new().unwrap();
    let bound = dir.path().join("lab.data");
    let missing = dir.path().join("typo.data");

    let store: CollectionStore<Person> = CollectionStore::new(&bound);
    store.add(person("Alice", &[]));
    let err = store.load(&missing).unwrap_err();
    assert!(
        matches!(&err, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound),
        "got {err:?}"
    );
    assert_eq!(store.file_name(), bound);

    store.save().unwrap();
    assert!(bound.exists());
    assert!(!missing.exists());
}

#[test]
fn load_or_empty_starts_empty_when_file_is_missing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fresh.data");

    let store: CollectionStore<Person> = CollectionStore::new("unused.data");
    assert!(!store.load_or_empty(&path).unwrap());
    assert_eq!(store.size(), 0);
    assert_eq!(store.file_name(), path);

    store.add(person("Alice", &[]));
    store.save().unwrap();
    assert!(path.exists());
}

#[test]
fn load_or_empty_reads_an_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lab.data");
    let saved = CollectionStore::new(&path);
    saved.add(person("Alice", &[(2020, 5, 17)]));
    saved.save().unwrap();

    let store: CollectionStore<Person> = CollectionStore::new("unused.data");
    assert!(store.load_or_empty(&path).unwrap());
    assert_eq!(triples(&store), triples(&saved));
}

#[test]
fn load_or_empty_still_fails_on_a_corrupt_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lab.data");
    let mut bytes = Vec::new();
    codec::write_u64(&mut bytes, 1).unwrap();
    codec::write_u8(&mut bytes, 7).unwrap();
    std::fs::write(&path, &bytes).unwrap();

    let store: CollectionStore<Person> = CollectionStore::new("unused.data");
    assert!(matches!(store.load_or_empty(&path), Err(Error::Decode(_))));
}

#[test]
fn trailing_junk_after_entries_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lab.data");
    let saved = CollectionStore::new(&path);
    saved.add(person("Alice", &[]));
    saved.save().unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes.extend(std::iter::repeat_n(0xab, 27));
    std::fs::write(&path, &bytes).unwrap();

    let store = CollectionStore::new("unused.data");
    store.add(person("Keep", &[]));
    assert!(matches!(store.load(&path), Err(Error::Decode(_))));
    assert_eq!(store.get(1).unwrap().alias(), "Keep");
    assert_eq!(store.file_name(), std::path::PathBuf::from("unused.data"));
}

#[test]
fn corrupt_file_is_rejected_and_state_kept() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.data");

    let mut bytes = Vec::new();
    codec::write_u64(&mut bytes, 1).unwrap();
    codec::write_u8(&mut bytes, 0).unwrap();
    codec::write_u16(&mut bytes, 200).unwrap(); // alias longer than allowed
    bytes.extend(std::iter::repeat_n(b'x', 200));
    std::fs::write(&path, &bytes).unwrap();

    let store = CollectionStore::new("unused.data");
    store.add(person("Keep", &[]));
    let err = store.load(&path).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "got {err:?}");
    assert_eq!(store.size(), 1);
    assert_eq!(store.get(1).unwrap().alias(), "Keep");
}

#[test]
fn truncated_file_is_a_decode_fault() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("short.data");

    let mut bytes = Vec::new();
    codec::write_u64(&mut bytes, 2).unwrap();
    codec::write_u8(&mut bytes, 0).unwrap();
    person("Alice", &[]).write_to(&mut bytes).unwrap();
    std::fs::write(&path, &bytes).unwrap();

    let store: CollectionStore<Person> = CollectionStore::new("unused.data");
    assert!(matches!(store.load(&path), Err(Error::Decode(_))));
}

#[test]
fn save_to_unwritable_path_fails() {
    let dir = TempDir::new().unwrap();
    let store: CollectionStore<Person> =
        CollectionStore::new(dir.path().join("no-such-dir").join("lab.data"));
    assert!(matches!(store.save(), Err(Error::Io(_))));
}

// ---------------------------------------------------------------------------
// Laws
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Add(String, Vec<(i32, i32, i32)>),
    Remove(u64),
    Update(u64, String),
}

fn op() -> impl Strategy<Value = Op> {
    let alias = "[A-Za-z]{1,12}";
    let visit = (1900i32..2100, 1i32..=12, 1i32..=28);
    prop_oneof![
        (alias, prop::collection::vec(visit, 0..4)).prop_map(|(a, v)| Op::Add(a, v)),
        (1u64..20).prop_map(Op::Remove),
        (1u64..20, alias).prop_map(|(i, a)| Op::Update(i, a)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn round_trip_preserves_every_triple(ops in prop::collection::vec(op(), 0..40)) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prop.data");
        let store = CollectionStore::new(&path);

        let mut last = 0;
        for op in ops {
            match op {
                Op::Add(alias, visits) => {
                    let idx = store.add(person(&alias, &visits));
                    prop_assert_eq!(idx, last + 1);
                    last = idx;
                }
                Op::Remove(i) => {
                    prop_assert_eq!(store.remove(i), i <= last);
                }
                Op::Update(i, alias) => {
                    prop_assert_eq!(store.update(i, person(&alias, &[])), i <= last);
                }
            }
        }
        store.save().unwrap();

        let fresh = CollectionStore::new("unused.data");
        fresh.load(&path).unwrap();
        prop_assert_eq!(triples(&fresh), triples(&store));
    }
}
