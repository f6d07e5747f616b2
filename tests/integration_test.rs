//! End-to-end: command lines -> dispatcher -> worker pool -> store -> output.

use std::sync::Arc;

use collector::config::Limits;
use collector::dispatch::Dispatcher;
use collector::engine::WorkerPool;
use collector::model::Person;
use collector::output::BufferOutput;
use collector::storage::CollectionStore;
use tempfile::TempDir;

struct Harness {
    store: Arc<CollectionStore<Person>>,
    output: Arc<BufferOutput>,
    dispatcher: Dispatcher,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(CollectionStore::new("unused.data"))
    }

    fn with_store(store: CollectionStore<Person>) -> Self {
        let store = Arc::new(store);
        let output = Arc::new(BufferOutput::new());
        let dispatcher = Dispatcher::new(Arc::clone(&store), output.clone(), Limits::default());
        Self {
            store,
            output,
            dispatcher,
        }
    }

    /// Run each batch on its own pool so later batches see earlier effects.
    fn run(&self, threads: usize, batches: &[&str]) -> Vec<String> {
        for batch in batches {
            let mut pool = WorkerPool::new(Some(threads));
            pool.start().unwrap();
            self.dispatcher.feed(batch.as_bytes(), &pool).unwrap();
            pool.stop();
        }
        self.output.take()
    }
}

#[test]
fn add_two_then_count() {
    let h = Harness::new();
    let out = h.run(0, &["add Alice\nadd Bob\ncount\n"]);

    assert_eq!(out, vec!["2"]);
    assert_eq!(h.store.get(1).unwrap().alias(), "Alice");
    assert_eq!(h.store.get(2).unwrap().alias(), "Bob");
}

#[test]
fn view_shows_visit_under_its_person() {
    let h = Harness::new();
    let out = h.run(2, &["add Alice", "add_visit 1 2020 5 17", "view"]);

    assert_eq!(out, vec!["[1] Alice", "\t17.5.2020", "Items in collection: 1"]);
}

#[test]
fn removed_entry_is_hidden_from_view() {
    let h = Harness::new();
    let out = h.run(2, &["add Alice", "remove 1", "view"]);

    assert_eq!(out, vec!["Items in collection: 0"]);
    assert!(!out.iter().any(|line| line.starts_with("[1]")));
}

#[test]
fn report_ranks_busier_person_first() {
    let h = Harness::new();
    let out = h.run(
        4,
        &[
            "add A\nadd B",
            "av 1 2020 1 1\nav 2 2020 1 1\nav 2 2020 1 2\nav 2 2020 1 3",
            "report",
        ],
    );

    assert_eq!(out, vec!["B 3", "A 1"]);
}

#[test]
fn thousand_counts_on_four_workers_emit_exactly_once_each() {
    let h = Harness::new();
    let input = "count\n".repeat(1000);

    let mut pool = WorkerPool::new(Some(4));
    pool.start().unwrap();
    let submitted = h.dispatcher.feed(input.as_bytes(), &pool).unwrap();
    pool.stop();

    assert_eq!(submitted, 1000);
    assert_eq!(pool.completed(), 1000);
    let out = h.output.take();
    assert_eq!(out.len(), 1000);
    assert!(out.iter().all(|line| line == "0"));
}

#[test]
fn concurrent_adds_through_the_pool_are_gap_free() {
    let h = Harness::new();
    let input: String = (0..500).map(|n| format!("add p{n}\n")).collect();
    h.run(8, &[input.as_str()]);

    assert_eq!(h.store.size(), 500);
    for index in 1..=500 {
        assert!(!h.store.is_removed(index), "index {index} missing");
    }
}

#[test]
fn bad_commands_are_reported_and_do_not_stop_the_batch() {
    let h = Harness::new();
    let out = h.run(0, &["add\nfly away\nremove 9\nadd Alice\ncount"]);

    assert_eq!(
        out,
        vec![
            "wrong number of arguments for add: expected 1 argument, got 0",
            "unknown command 'fly'",
            "remove: no entry at index 9",
            "1",
        ]
    );
}

#[test]
fn save_and_load_commands_use_the_bound_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lab.data");

    let h = Harness::with_store(CollectionStore::new(&path));
    h.run(0, &["add Alice\nadd_visit 1 2020 5 17\nsave\nadd Bob\nload\ncount"]);

    // Bob was added after the save, so reloading drops him.
    assert_eq!(h.store.size(), 1);
    assert_eq!(h.store.get(1).unwrap().visits().len(), 1);
}

#[test]
fn save_as_rebinds_the_data_file() {
    let dir = TempDir::new().unwrap();
    let other = dir.path().join("other.data");

    let h = Harness::with_store(CollectionStore::new(dir.path().join("lab.data")));
    let batch = format!("add Alice\nsave {}", other.display());
    let out = h.run(0, &[batch.as_str()]);

    assert!(out.is_empty(), "unexpected output: {out:?}");
    assert!(other.exists());
    assert_eq!(h.store.file_name(), other);
}

#[test]
fn failed_load_command_reports_and_keeps_state() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.data");

    let h = Harness::new();
    let batch = format!("add Alice\nload {}\ncount", missing.display());
    let out = h.run(0, &[batch.as_str()]);

    assert_eq!(out.len(), 2);
    assert!(out[0].starts_with("load of '"), "got {:?}", out[0]);
    assert_eq!(out[1], "1");
    // The next save still targets the original file.
    assert_eq!(h.store.file_name(), std::path::PathBuf::from("unused.data"));
}

#[test]
fn garbled_line_mid_batch_does_not_end_the_session() {
    let h = Harness::new();
    let input: &[u8] = b"add Alice\nadd \xff\xfe\nremove \xff\nadd Bob\ncount\n";

    let mut pool = WorkerPool::new(Some(2));
    pool.start().unwrap();
    let submitted = h.dispatcher.feed(input, &pool).unwrap();
    pool.stop();

    assert_eq!(submitted, 5);
    let out = h.output.take();
    assert!(
        out.contains(&"remove: invalid index '\u{fffd}'".to_string()),
        "got {out:?}"
    );
    assert_eq!(h.store.size(), 3);
}
