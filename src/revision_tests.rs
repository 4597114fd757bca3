use super::*;
use crate::storage::MemoryStorage;
use crate::test_support::FixedClock;

fn page() -> PageId {
    PageId::new("schema-guide.html")
}

fn track(storage: &mut MemoryStorage, clock: &FixedClock, kind: EditKind, old: &str, new: &str) {
    track_edit(storage, clock, &page(), kind, old, new).unwrap();
}

#[test]
fn entries_are_newest_first_with_iso_timestamps() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    track(&mut storage, &clock, EditKind::Add, "none", "Added new <p> block");
    clock.advance_ms(250);
    track(&mut storage, &clock, EditKind::Save, "Page structural save", "Saved updated HTML");

    let log = RevisionLog::load(&storage);
    assert_eq!(log.len(), 2);
    assert_eq!(log.entries()[0].kind, EditKind::Save);
    assert_eq!(log.entries()[0].timestamp, "2025-03-14T09:30:00.250Z");
    assert_eq!(log.entries()[1].timestamp, "2025-03-14T09:30:00.000Z");
    assert_eq!(log.entries()[1].author, EDIT_AUTHOR);
}

#[test]
fn same_instant_edits_get_distinct_timestamps() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    track(&mut storage, &clock, EditKind::Text, "a", "b");
    track(&mut storage, &clock, EditKind::Text, "b", "c");

    let log = RevisionLog::load(&storage);
    assert_ne!(log.entries()[0].timestamp, log.entries()[1].timestamp);
    assert_eq!(log.entries()[0].timestamp, "2025-03-14T09:30:00.001Z");
}

#[test]
fn sub_millisecond_edits_get_distinct_timestamps() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    clock.advance_us(100);
    track(&mut storage, &clock, EditKind::Text, "Intro", "Updated intro");
    clock.advance_us(300);
    track(&mut storage, &clock, EditKind::Save, "Page structural save", "Saved updated HTML");

    let log = RevisionLog::load(&storage);
    assert_eq!(log.entries()[1].timestamp, "2025-03-14T09:30:00.000Z");
    assert_eq!(log.entries()[0].timestamp, "2025-03-14T09:30:00.001Z");

    let text = log.entries()[1].timestamp.clone();
    PersistedPages::put(&mut storage, &page(), "<p>Updated intro</p>").unwrap();
    assert_eq!(reverse_edit(&mut storage, &text, |_| true).unwrap(), Reversal::Reverted);
    assert_eq!(saved_body(&storage).as_deref(), Some("<p>Intro</p>"));
}

#[test]
fn no_op_edits_are_filtered() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    assert!(!track_edit(&mut storage, &clock, &page(), EditKind::Text, "same", "same").unwrap());
    assert!(
        !track_edit(
            &mut storage,
            &clock,
            &page(),
            EditKind::Text,
            EMPTY_LINE_PLACEHOLDER,
            "typed into a new line"
        )
        .unwrap()
    );
    assert!(RevisionLog::load(&storage).is_empty());
    assert!(storage.get(REVISION_LOG_KEY).is_none());
}

#[test]
fn log_is_capped_and_drops_the_oldest() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    for index in 0..=MAX_ENTRIES {
        clock.advance_ms(1);
        track(&mut storage, &clock, EditKind::Text, &format!("old {index}"), &format!("new {index}"));
    }

    let log = RevisionLog::load(&storage);
    assert_eq!(log.len(), MAX_ENTRIES);
    assert_eq!(log.entries()[0].new_text, format!("new {MAX_ENTRIES}"));
    assert_eq!(log.entries()[MAX_ENTRIES - 1].new_text, "new 1");
    assert!(log.entries().iter().all(|entry| entry.new_text != "new 0"));
}

#[test]
fn serialized_shape_matches_browser_log() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    track(&mut storage, &clock, EditKind::Delete, "Table Row", "Deleted <tr> block");

    let raw = storage.get(REVISION_LOG_KEY).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let entry = &value[0];
    assert_eq!(entry["type"], "DELETE");
    assert_eq!(entry["oldText"], "Table Row");
    assert_eq!(entry["newText"], "Deleted <tr> block");
    assert_eq!(entry["page"], "schema-guide.html");
    assert_eq!(entry["author"], "CSRD Editor");
}

#[test]
fn corrupt_log_reads_as_empty() {
    let mut storage = MemoryStorage::new();
    storage.set(REVISION_LOG_KEY, "{broken").unwrap();
    assert!(RevisionLog::load(&storage).is_empty());
}

fn saved_body(storage: &MemoryStorage) -> Option<String> {
    PersistedPages::get(storage, &page())
}

fn newest_timestamp(storage: &MemoryStorage) -> String {
    RevisionLog::load(storage).entries()[0].timestamp.clone()
}

#[test]
fn reversing_a_text_edit_rewrites_one_occurrence() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    PersistedPages::put(&mut storage, &page(), "<p>Road names</p><p>Road names</p>").unwrap();
    track(&mut storage, &clock, EditKind::Text, "Street names", "Road names");
    let timestamp = newest_timestamp(&storage);

    let result = reverse_edit(&mut storage, &timestamp, |_| true).unwrap();
    assert_eq!(result, Reversal::Reverted);
    assert_eq!(
        saved_body(&storage).as_deref(),
        Some("<p>Street names</p><p>Road names</p>")
    );
    assert!(RevisionLog::load(&storage).find(&timestamp).is_none());
}

#[test]
fn reversal_fails_without_changes_when_text_moved_on() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    PersistedPages::put(&mut storage, &page(), "<p>Edited again</p>").unwrap();
    track(&mut storage, &clock, EditKind::Text, "Original", "First edit");
    let timestamp = newest_timestamp(&storage);

    let result = reverse_edit(&mut storage, &timestamp, |_| true);
    assert!(matches!(result, Err(EditorError::TextNotFound)));
    assert_eq!(saved_body(&storage).as_deref(), Some("<p>Edited again</p>"));
    assert_eq!(RevisionLog::load(&storage).len(), 1);
}

#[test]
fn reversal_needs_a_saved_body() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    track(&mut storage, &clock, EditKind::Text, "a", "b");
    let timestamp = newest_timestamp(&storage);

    let result = reverse_edit(&mut storage, &timestamp, |_| true);
    assert!(matches!(result, Err(EditorError::NoSavedBody { page: ref name }) if name == "schema-guide.html"));
    assert_eq!(RevisionLog::load(&storage).len(), 1);
}

#[test]
fn structural_entries_are_not_reversed() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    PersistedPages::put(&mut storage, &page(), "<p>x</p>").unwrap();
    track(&mut storage, &clock, EditKind::Add, "none", "Added new <h3> block");
    let timestamp = newest_timestamp(&storage);

    let mut asked = false;
    let result = reverse_edit(&mut storage, &timestamp, |_| {
        asked = true;
        true
    });
    assert!(matches!(result, Err(EditorError::StructuralEdit)));
    assert!(!asked);
    assert_eq!(RevisionLog::load(&storage).len(), 1);
}

#[test]
fn declined_reversal_changes_nothing() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    PersistedPages::put(&mut storage, &page(), "<p>b</p>").unwrap();
    track(&mut storage, &clock, EditKind::Text, "a", "b");
    let timestamp = newest_timestamp(&storage);

    let result = reverse_edit(&mut storage, &timestamp, |prompt| {
        assert_eq!(prompt, REVERSE_PROMPT);
        false
    })
    .unwrap();
    assert_eq!(result, Reversal::Declined);
    assert_eq!(saved_body(&storage).as_deref(), Some("<p>b</p>"));
    assert_eq!(RevisionLog::load(&storage).len(), 1);
}

#[test]
fn unknown_timestamp_is_reported() {
    let mut storage = MemoryStorage::new();
    let result = reverse_edit(&mut storage, "1999-01-01T00:00:00.000Z", |_| true);
    assert!(matches!(result, Err(EditorError::EntryNotFound)));
}

#[test]
fn discard_all_clears_bodies_and_history() {
    let mut storage = MemoryStorage::new();
    let clock = FixedClock::new();
    PersistedPages::put(&mut storage, &page(), "<p>x</p>").unwrap();
    PersistedPages::put(&mut storage, &PageId::new("golden.html"), "<p>y</p>").unwrap();
    track(&mut storage, &clock, EditKind::Save, "Page structural save", "Saved updated HTML");

    assert!(!discard_all(&mut storage, |_| false).unwrap());
    assert_eq!(RevisionLog::load(&storage).len(), 1);

    assert!(discard_all(&mut storage, |_| true).unwrap());
    assert!(storage.is_empty());
    assert!(RevisionLog::load(&storage).is_empty());
}
