use super::*;
use crate::page::PageId;
use crate::revision::RevisionLog;
use crate::storage::MemoryStorage;
use crate::test_support::FixedClock;

const PAGE_HTML: &str = concat!(
    "<div class=\"main\">",
    "<div class=\"content-wrap\">",
    "<h2>Schema</h2>",
    "<p>Road centerlines</p>",
    "<ul><li>First</li><li>Second</li></ul>",
    "<table><tr><td>A1</td><td>B1</td></tr><tr><td>A2</td><td>B2</td></tr></table>",
    "<details><summary><p>Hidden</p></summary><p>Body</p></details>",
    "<div class=\"code-block\"><p>code</p></div>",
    "<p><a href=\"domains.html\">Domains</a></p>",
    "</div>",
    "<div class=\"card\"><h4>Card title</h4><p>Card text</p><h3>Card heading</h3></div>",
    "<button class=\"mobile-toggle\">Menu</button>",
    "<button>Other</button>",
    "</div>",
    "<div class=\"card\"><p>Outer card</p></div>",
    "<a href=\"home.html\">Home</a>",
);

fn page_id() -> PageId {
    PageId::new("schema-guide.html")
}

fn viewer() -> EditorSession {
    let page = Page::parse(page_id(), PAGE_HTML);
    EditorSession::new(page).with_clock(FixedClock::new())
}

fn editor() -> EditorSession {
    let mut session = viewer();
    session.enable_edit_mode();
    session
}

fn find(session: &EditorSession, tag: &str, text: &str) -> NodeId {
    let dom = session.page().dom();
    dom.find_first(dom.root(), |dom, node| {
        dom.is_tag(node, tag) && dom.text_content(node) == text
    })
    .unwrap_or_else(|| panic!("no <{tag}> with text {text:?}"))
}

fn html(session: &EditorSession, node: NodeId) -> String {
    session.page().dom().inner_html(node)
}

fn log(storage: &MemoryStorage) -> RevisionLog {
    RevisionLog::load(storage)
}

#[test]
fn enabling_edit_mode_marks_whitelisted_blocks() {
    let mut session = viewer();
    assert_eq!(session.enable_edit_mode(), EDIT_MODE_NOTICE);
    assert!(session.is_edit_mode());
    assert_eq!(session.editables().count(), 13);

    let paragraph = find(&session, "p", "Road centerlines");
    let dom = session.page().dom();
    assert_eq!(dom.attr(paragraph, "contenteditable"), Some("true"));
    assert!(dom.has_class(paragraph, EDITABLE_CLASS));

    assert_eq!(session.kind_of(find(&session, "h2", "Schema")), Some(BlockKind::Heading(2)));
    assert_eq!(session.kind_of(find(&session, "h4", "Card title")), Some(BlockKind::Heading(4)));
    assert!(session.is_editable(find(&session, "p", "Outer card")));
    assert!(!session.is_editable(find(&session, "p", "Hidden")));
    assert!(!session.is_editable(find(&session, "p", "code")));
    assert!(!session.is_editable(find(&session, "h3", "Card heading")));

    assert_eq!(session.scan(), 0);
}

#[test]
fn editing_requires_edit_mode() {
    let mut session = viewer();
    let mut storage = MemoryStorage::new();
    let paragraph = find(&session, "p", "Road centerlines");

    assert!(matches!(
        session.focus(paragraph, &mut storage),
        Err(EditorError::EditModeInactive)
    ));
    assert!(matches!(session.save(&mut storage), Err(EditorError::EditModeInactive)));
    assert!(!session.page().content_html().contains(EDITABLE_CLASS));
}

#[test]
fn focus_moves_the_marker_and_toolbar_context() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let item = find(&session, "li", "First");
    let cell = find(&session, "td", "A1");

    session.focus(item, &mut storage).unwrap();
    assert_eq!(session.active(), Some(item));
    assert_eq!(session.toolbar(), ToolbarContext::List);
    assert!(session.page().dom().has_class(item, FOCUSED_CLASS));

    session.focus(cell, &mut storage).unwrap();
    assert_eq!(session.toolbar(), ToolbarContext::Table);
    assert!(!session.page().dom().has_class(item, FOCUSED_CLASS));
    assert!(session.page().dom().has_class(item, EDITABLE_CLASS));
    assert!(session.page().dom().has_class(cell, FOCUSED_CLASS));

    let hidden = find(&session, "p", "Hidden");
    assert!(matches!(
        session.focus(hidden, &mut storage),
        Err(EditorError::NotEditable)
    ));
}

#[test]
fn text_changes_are_logged_when_focus_leaves() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let paragraph = find(&session, "p", "Road centerlines");
    let heading = find(&session, "h2", "Schema");

    session.focus(paragraph, &mut storage).unwrap();
    session.set_active_content("Road centreline features").unwrap();
    assert!(log(&storage).is_empty());

    session.focus(heading, &mut storage).unwrap();
    let entries = log(&storage);
    assert_eq!(entries.len(), 1);
    let entry = &entries.entries()[0];
    assert_eq!(entry.kind, EditKind::Text);
    assert_eq!(entry.old_text, "Road centerlines");
    assert_eq!(entry.new_text, "Road centreline features");
    assert_eq!(entry.page, "schema-guide.html");

    session.blur(&mut storage).unwrap();
    assert_eq!(log(&storage).len(), 1);
    assert!(!session.page().dom().has_class(heading, FOCUSED_CLASS));
}

#[test]
fn nested_editables_log_text_without_markers() {
    let page = Page::parse(
        page_id(),
        "<div class=\"content-wrap\"><ul><li><p>Nested</p></li></ul></div>",
    );
    let mut session = EditorSession::new(page).with_clock(FixedClock::new());
    session.enable_edit_mode();
    let mut storage = MemoryStorage::new();
    let item = find(&session, "li", "Nested");

    session.focus(item, &mut storage).unwrap();
    let typed = html(&session, item).replace("Nested", "Nested note");
    assert!(typed.contains(EDITABLE_CLASS));
    session.set_active_content(&typed).unwrap();
    session.save(&mut storage).unwrap();

    let log = log(&storage);
    let entry = log
        .entries()
        .iter()
        .find(|entry| entry.kind == EditKind::Text)
        .unwrap();
    assert_eq!(entry.old_text, "<p>Nested</p>");
    assert_eq!(entry.new_text, "<p>Nested note</p>");

    let reversal = revision::reverse_edit(&mut storage, &entry.timestamp, |_| true).unwrap();
    assert_eq!(reversal, revision::Reversal::Reverted);
    assert_eq!(
        PersistedPages::get(&storage, &page_id()).as_deref(),
        Some("<ul><li><p>Nested</p></li></ul>")
    );
}

#[test]
fn enter_in_a_paragraph_spawns_a_silent_sibling() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let paragraph = find(&session, "p", "Road centerlines");
    session.focus(paragraph, &mut storage).unwrap();

    let outcome = session
        .key_down(EditorKey::Enter { shift: false }, &mut storage)
        .unwrap();
    assert_eq!(outcome, KeyOutcome::Handled);

    let spawned = session.active().unwrap();
    assert_ne!(spawned, paragraph);
    assert_eq!(session.page().dom().next_element_sibling(paragraph), Some(spawned));
    assert_eq!(html(&session, spawned), "<br>");
    assert!(session.page().dom().has_class(spawned, NEW_NODE_CLASS));
    assert_eq!(session.kind_of(spawned), Some(BlockKind::Paragraph));
    assert!(log(&storage).is_empty());
}

#[test]
fn enter_in_a_list_item_spawns_a_bullet() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let item = find(&session, "li", "Second");
    session.focus(item, &mut storage).unwrap();

    session
        .key_down(EditorKey::Enter { shift: false }, &mut storage)
        .unwrap();
    let spawned = session.active().unwrap();
    assert!(session.page().dom().is_tag(spawned, "li"));
    assert_eq!(session.toolbar(), ToolbarContext::List);
    assert!(log(&storage).is_empty());
}

#[test]
fn other_keys_fall_through() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let paragraph = find(&session, "p", "Road centerlines");
    let heading = find(&session, "h2", "Schema");
    session.focus(paragraph, &mut storage).unwrap();

    assert_eq!(
        session.key_down(EditorKey::Enter { shift: true }, &mut storage).unwrap(),
        KeyOutcome::Default
    );
    assert_eq!(session.key_down(EditorKey::Other, &mut storage).unwrap(), KeyOutcome::Default);

    session.focus(heading, &mut storage).unwrap();
    assert_eq!(
        session.key_down(EditorKey::Enter { shift: false }, &mut storage).unwrap(),
        KeyOutcome::Default
    );
    assert_eq!(session.active(), Some(heading));
}

#[test]
fn enter_in_a_cell_moves_to_the_next_cell() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let first = find(&session, "td", "A1");
    let second = find(&session, "td", "B1");
    session.focus(first, &mut storage).unwrap();

    let outcome = session
        .key_down(EditorKey::Enter { shift: false }, &mut storage)
        .unwrap();
    assert_eq!(outcome, KeyOutcome::Handled);
    assert_eq!(session.active(), Some(second));

    session
        .key_down(EditorKey::Enter { shift: false }, &mut storage)
        .unwrap();
    assert_eq!(session.active(), Some(second));
    assert!(log(&storage).is_empty());
}

#[test]
fn toolbar_inserts_use_placeholders_and_are_logged() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let heading = find(&session, "h2", "Schema");
    session.focus(heading, &mut storage).unwrap();

    let paragraph = session
        .insert(InsertKind::Paragraph, false, &mut storage)
        .unwrap();
    assert_eq!(html(&session, paragraph), "Start typing new text here...");
    assert_eq!(session.active(), Some(paragraph));

    let header = session
        .insert(InsertKind::Heading(HEADER_LEVEL), false, &mut storage)
        .unwrap();
    assert!(session.page().dom().is_tag(header, "h3"));
    assert_eq!(html(&session, header), "New Header");
    assert_eq!(session.page().dom().next_element_sibling(paragraph), Some(header));

    let entries = log(&storage);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.entries()[0].kind, EditKind::Add);
    assert_eq!(entries.entries()[0].old_text, "none");
    assert_eq!(entries.entries()[0].new_text, "Added new <h3> block");
    assert_eq!(entries.entries()[1].new_text, "Added new <p> block");
}

#[test]
fn insert_needs_a_suitable_active_block() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    assert!(matches!(
        session.insert(InsertKind::Paragraph, false, &mut storage),
        Err(EditorError::NothingToInsertAfter)
    ));

    let paragraph = find(&session, "p", "Road centerlines");
    session.focus(paragraph, &mut storage).unwrap();
    assert!(matches!(
        session.insert(InsertKind::TableRow, false, &mut storage),
        Err(EditorError::RowNeedsTableCell)
    ));
    assert!(log(&storage).is_empty());
}

#[test]
fn add_row_clones_the_row_with_blank_cells() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let cell = find(&session, "td", "B1");
    session.focus(cell, &mut storage).unwrap();

    let first_new_cell = session
        .insert(InsertKind::TableRow, false, &mut storage)
        .unwrap();
    let dom = session.page().dom();
    let row = dom.parent(first_new_cell).unwrap();
    let original_row = dom.parent(cell).unwrap();
    assert_eq!(dom.next_element_sibling(original_row), Some(row));
    assert_eq!(
        dom.outer_html(row),
        concat!(
            "<tr><td contenteditable=\"true\" class=\"editable-node focused\"><br></td>",
            "<td contenteditable=\"true\" class=\"editable-node\"><br></td></tr>"
        )
    );
    assert_eq!(session.active(), Some(first_new_cell));
    assert_eq!(session.toolbar(), ToolbarContext::Table);

    let table = dom.closest_tag(row, "table").unwrap();
    assert_eq!(dom.element_children(table).len(), 3);
    assert_eq!(log(&storage).entries()[0].new_text, "Added new <tr> block");
}

#[test]
fn deleting_a_cell_removes_its_row() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let cell = find(&session, "td", "A2");
    session.focus(cell, &mut storage).unwrap();
    let table = session.page().dom().closest_tag(cell, "table").unwrap();

    let deleted = session
        .delete_active(&mut storage, |prompt| prompt == DELETE_PROMPT)
        .unwrap();
    assert!(deleted);
    assert_eq!(session.page().dom().element_children(table).len(), 1);
    assert!(!session.is_editable(cell));
    assert!(session.is_editable(find(&session, "td", "A1")));
    assert_eq!(session.active(), None);
    assert_eq!(session.toolbar(), ToolbarContext::Text);

    let log = log(&storage);
    let entry = &log.entries()[0];
    assert_eq!(entry.kind, EditKind::Delete);
    assert_eq!(entry.old_text, "Table Row");
    assert_eq!(entry.new_text, "Deleted <tr> block");
}

#[test]
fn deleting_a_paragraph_logs_its_text() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    assert!(matches!(
        session.delete_active(&mut storage, |_| true),
        Err(EditorError::NothingToDelete)
    ));

    let paragraph = find(&session, "p", "Road centerlines");
    session.focus(paragraph, &mut storage).unwrap();
    assert!(!session.delete_active(&mut storage, |_| false).unwrap());
    assert!(session.page().dom().is_attached(paragraph));

    assert!(session.delete_active(&mut storage, |_| true).unwrap());
    assert!(!session.page().dom().is_attached(paragraph));
    assert!(!session.is_editable(paragraph));
    let log = log(&storage);
    let entry = &log.entries()[0];
    assert_eq!(entry.old_text, "Road centerlines");
    assert_eq!(entry.new_text, "Deleted <p> block");
}

#[test]
fn save_strips_editor_markers_and_reloads_identically() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let paragraph = find(&session, "p", "Road centerlines");
    session.focus(paragraph, &mut storage).unwrap();
    session.insert(InsertKind::Paragraph, false, &mut storage).unwrap();
    session.set_active_content("Address points").unwrap();

    session.save(&mut storage).unwrap();
    let body = PersistedPages::get(&storage, &page_id()).unwrap();
    for marker in ["contenteditable", EDITABLE_CLASS, FOCUSED_CLASS, NEW_NODE_CLASS, "class=\"\""] {
        assert!(!body.contains(marker), "saved body still carries {marker}");
    }
    assert!(body.contains("<p>Road centerlines</p><p>Address points</p>"));

    let reloaded = Page::load(page_id(), PAGE_HTML, &storage);
    assert_eq!(reloaded.content_html(), body);

    let entries = log(&storage);
    assert_eq!(entries.entries()[0].kind, EditKind::Save);
    assert_eq!(entries.entries()[0].old_text, "Page structural save");
    assert_eq!(entries.entries()[1].kind, EditKind::Text);
    assert_eq!(entries.entries()[1].old_text, "Start typing new text here...");
    assert_eq!(entries.entries()[2].kind, EditKind::Add);
}

#[test]
fn typed_angle_bracket_survives_save_and_reload() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let paragraph = find(&session, "p", "Road centerlines");
    session.focus(paragraph, &mut storage).unwrap();
    session.set_active_content("if a<b then").unwrap();
    assert_eq!(html(&session, paragraph), "if a&lt;b then");

    session.save(&mut storage).unwrap();
    let body = PersistedPages::get(&storage, &page_id()).unwrap();
    assert!(body.contains("<p>if a&lt;b then</p><ul>"));
    let reloaded = Page::load(page_id(), PAGE_HTML, &storage);
    assert_eq!(reloaded.content_html(), body);
}

#[test]
fn block_markup_inside_a_paragraph_is_refused() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let paragraph = find(&session, "p", "Road centerlines");
    session.focus(paragraph, &mut storage).unwrap();

    assert!(matches!(
        session.set_active_content("<div>note</div>"),
        Err(EditorError::UnstableMarkup)
    ));
    assert_eq!(html(&session, paragraph), "Road centerlines");

    session.set_active_content("Road <b>centerlines</b>").unwrap();
    assert_eq!(html(&session, paragraph), "Road <b>centerlines</b>");
}

#[test]
fn unsaved_inserts_are_lost_on_reload() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let paragraph = find(&session, "p", "Road centerlines");
    session.focus(paragraph, &mut storage).unwrap();
    session.insert(InsertKind::Paragraph, false, &mut storage).unwrap();

    let reloaded = Page::load(page_id(), PAGE_HTML, &storage);
    assert!(!reloaded.content_html().contains("Start typing new text here..."));
    assert!(PersistedPages::get(&storage, &page_id()).is_none());
}

#[test]
fn formatting_toggles_and_undoes() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    assert!(matches!(
        session.apply_style(InlineStyle::Bold),
        Err(EditorError::NothingToFormat)
    ));

    let paragraph = find(&session, "p", "Road centerlines");
    session.focus(paragraph, &mut storage).unwrap();
    session.apply_style(InlineStyle::Bold).unwrap();
    assert_eq!(html(&session, paragraph), "<b>Road centerlines</b>");

    assert_eq!(session.undo().unwrap(), paragraph);
    assert_eq!(html(&session, paragraph), "Road centerlines");
    assert_eq!(session.redo().unwrap(), paragraph);
    assert_eq!(html(&session, paragraph), "<b>Road centerlines</b>");
    assert!(matches!(session.redo(), Err(EditorError::NothingToRedo)));

    session.blur(&mut storage).unwrap();
    assert_eq!(log(&storage).entries()[0].new_text, "<b>Road centerlines</b>");
}

#[test]
fn links_are_prompted_for() {
    let mut session = editor();
    let mut storage = MemoryStorage::new();
    let paragraph = find(&session, "p", "Road centerlines");
    session.focus(paragraph, &mut storage).unwrap();

    assert!(!session.insert_link(|_, _| None).unwrap());
    let linked = session
        .insert_link(|message, default| {
            assert_eq!(message, LINK_PROMPT);
            assert_eq!(default, "https://");
            Some("https://ng911.example/roads".to_string())
        })
        .unwrap();
    assert!(linked);
    assert_eq!(
        html(&session, paragraph),
        "<a href=\"https://ng911.example/roads\">Road centerlines</a>"
    );
}

#[test]
fn navigation_is_blocked_inside_the_main_area() {
    let session = editor();
    let dom = session.page().dom();
    let link = dom
        .find_first(dom.root(), |dom, node| dom.attr(node, "href") == Some("domains.html"))
        .unwrap();
    let link_text = dom.children(link)[0];
    let outside_link = find(&session, "a", "Home");
    let menu = find(&session, "button", "Menu");
    let other = find(&session, "button", "Other");
    let paragraph = find(&session, "p", "Road centerlines");

    assert_eq!(session.intercept_click(link), ClickOutcome::Blocked);
    assert_eq!(session.intercept_click(link_text), ClickOutcome::Blocked);
    assert_eq!(session.intercept_click(other), ClickOutcome::Blocked);
    assert_eq!(session.intercept_click(menu), ClickOutcome::Allowed);
    assert_eq!(session.intercept_click(paragraph), ClickOutcome::Allowed);
    assert_eq!(session.intercept_click(outside_link), ClickOutcome::Allowed);

    let viewer = viewer();
    let link = find(&viewer, "a", "Domains");
    assert_eq!(viewer.intercept_click(link), ClickOutcome::Allowed);
}
