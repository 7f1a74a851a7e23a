//! Session resume through the ledger stores

use stepgate::{
    EventLog, EventSink, JsonFileStore, LedgerStore, MediaFactory, MemoryLedgerStore, Sequence, SequenceController,
    Step,
};
use tempfile::TempDir;

fn sequence() -> Sequence {
    Sequence::from_json(
        r#"{
            "id": "course-12/material-3",
            "steps": [
                {"id": "p2", "order_index": 1, "source_ref": "https://youtu.be/bbbbbbbbbbb"},
                {"id": "p1", "order_index": 0, "source_ref": "https://cdn.example.com/p1.mp4", "title": "Welcome"},
                {"id": "p3", "order_index": 2, "source_ref": "https://cdn.example.com/p3.webm", "duration_hint": 321.5}
            ]
        }"#,
    )
    .expect("valid sequence json")
}

#[test]
fn progress_survives_a_reload_from_disk() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::open(dir.path()).unwrap();

    {
        let mut c = SequenceController::new(sequence(), MediaFactory::default(), EventSink::new());
        c.mark_completed(0).unwrap();
        store.save(&c.snapshot()).unwrap();
    }

    let snap = store.load("course-12/material-3").unwrap().expect("saved snapshot");
    let sink = EventSink::new();
    let log = EventLog::attach(&sink);
    let c = SequenceController::resume(sequence(), &snap, MediaFactory::default(), sink).unwrap();
    assert!(c.is_completed(0));
    assert!(c.is_unlocked(1));
    assert!(!c.is_unlocked(2));
    assert!(log.events().is_empty(), "restoring must not replay completion events");
}

#[test]
fn snapshot_of_a_changed_sequence_is_refused() {
    let store = MemoryLedgerStore::new();
    let mut c = SequenceController::new(sequence(), MediaFactory::default(), EventSink::new());
    c.mark_completed(0).unwrap();
    store.save(&c.snapshot()).unwrap();

    let reshaped = Sequence::new(
        "course-12/material-3",
        vec![
            Step::new("p1", 0, "https://cdn.example.com/p1.mp4"),
            Step::new("p3", 1, "https://cdn.example.com/p3.webm"),
        ],
    )
    .unwrap();
    let snap = store.load("course-12/material-3").unwrap().unwrap();
    assert!(SequenceController::resume(reshaped, &snap, MediaFactory::default(), EventSink::new()).is_err());
}

#[test]
fn snapshot_json_shape() {
    let mut c = SequenceController::new(sequence(), MediaFactory::default(), EventSink::new());
    c.mark_completed(0).unwrap();
    c.mark_completed(1).unwrap();
    let js = serde_json::to_value(c.snapshot()).unwrap();
    assert_eq!(js["sequence_id"], "course-12/material-3");
    assert_eq!(js["completed"], serde_json::json!(["p1", "p2"]));
    assert!(js["fingerprint"].is_string());
}
