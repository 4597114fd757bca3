//! In-place editing of a loaded page.
//!
//! An [`EditorSession`] owns the page tree while edit mode is active. It
//! knows which blocks are editable, which one has focus, and what that
//! block looked like when it gained focus so text changes can be logged
//! once the user moves on. Storage is borrowed per call; nothing is
//! persisted except through [`EditorSession::save`] and the revision log.

use tdoc::InlineStyle;

use crate::dom::{Dom, NodeId};
use crate::error::EditorError;
use crate::page::Page;
use crate::revision::{self, Clock, EditKind, SystemClock};
use crate::storage::{PersistedPages, Storage};

mod format;
mod kind;
mod scan;
mod toolbar;

pub use format::{DomFormatter, InlineFormatter, inline_style_label};
pub use kind::{BlockKind, InsertKind};
pub use toolbar::{HEADER_LEVEL, ToolbarContext};

pub const EDITABLE_CLASS: &str = "editable-node";
pub const FOCUSED_CLASS: &str = "focused";
pub const NEW_NODE_CLASS: &str = "new-node-flash";
pub const TOOLBAR_CLASS: &str = "editor-toolbar";
const MOBILE_TOGGLE_CLASS: &str = "mobile-toggle";

pub const EDIT_MODE_NOTICE: &str = "WYSIWYG Editor Active. Toolbar at top.";
pub const SAVED_NOTICE: &str = "Page contents saved successfully!";
pub const DELETED_NOTICE: &str = "Block deleted. Make sure to click \"Save Page\".";
pub const NAVIGATION_BLOCKED_NOTICE: &str = "Navigation blocked. You are in Edit Mode.";
pub const DELETE_PROMPT: &str = "Are you sure you want to delete this block?";
pub const LINK_PROMPT: &str = "Enter the URL for the link:";
pub const LINK_DEFAULT: &str = "https://";

const SAVE_OLD_TEXT: &str = "Page structural save";
const SAVE_NEW_TEXT: &str = "Saved updated HTML";
const ROW_DELETE_TEXT: &str = "Table Row";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorKey {
    Enter { shift: bool },
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The host should perform its own behaviour for the key.
    Default,
    Handled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClickOutcome {
    Allowed,
    Blocked,
}

pub struct EditorSession {
    page: Page,
    editables: Vec<(NodeId, BlockKind)>,
    active: Option<NodeId>,
    /// Inner markup of the focused block when it gained focus.
    snapshot: Option<(NodeId, String)>,
    edit_mode: bool,
    toolbar: ToolbarContext,
    formatter: Box<dyn InlineFormatter>,
    clock: Box<dyn Clock>,
}

impl EditorSession {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            editables: Vec::new(),
            active: None,
            snapshot: None,
            edit_mode: false,
            toolbar: ToolbarContext::default(),
            formatter: Box::new(DomFormatter::new()),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_formatter(mut self, formatter: impl InlineFormatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn into_page(self) -> Page {
        self.page
    }

    pub fn is_edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn active(&self) -> Option<NodeId> {
        self.active
    }

    pub fn toolbar(&self) -> ToolbarContext {
        self.toolbar
    }

    /// Editable blocks in document order.
    pub fn editables(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.editables.iter().map(|(node, _)| *node)
    }

    pub fn kind_of(&self, node: NodeId) -> Option<BlockKind> {
        self.editables
            .iter()
            .find(|(candidate, _)| *candidate == node)
            .map(|(_, kind)| *kind)
    }

    pub fn is_editable(&self, node: NodeId) -> bool {
        self.kind_of(node).is_some()
    }

    pub fn enable_edit_mode(&mut self) -> &'static str {
        self.edit_mode = true;
        let marked = self.scan();
        tracing::info!(page = %self.page.id(), marked, "edit mode enabled");
        EDIT_MODE_NOTICE
    }

    /// Marks every whitelisted block that is not yet registered. Blocks
    /// that left the tree are forgotten. Returns the number newly marked.
    pub fn scan(&mut self) -> usize {
        let blocks = scan::editable_blocks(self.page.dom(), self.page.content_root());
        let mut marked = 0;
        for (node, _) in &blocks {
            if !self.is_editable(*node) {
                scan::mark(self.page.dom_mut(), *node);
                marked += 1;
            }
        }
        self.editables = blocks;
        if self.active.is_some_and(|node| !self.is_editable(node)) {
            self.active = None;
        }
        tracing::debug!(marked, total = self.editables.len(), "editable blocks scanned");
        marked
    }

    fn require_edit_mode(&self) -> Result<(), EditorError> {
        if self.edit_mode {
            Ok(())
        } else {
            Err(EditorError::EditModeInactive)
        }
    }

    pub fn focus(&mut self, node: NodeId, storage: &mut dyn Storage) -> Result<(), EditorError> {
        self.require_edit_mode()?;
        if !self.is_editable(node) {
            return Err(EditorError::NotEditable);
        }
        self.activate(node, storage)
    }

    fn activate(&mut self, node: NodeId, storage: &mut dyn Storage) -> Result<(), EditorError> {
        if self.active == Some(node) && self.snapshot.is_some() {
            return Ok(());
        }
        self.blur(storage)?;
        let dom = self.page.dom_mut();
        dom.add_class(node, FOCUSED_CLASS);
        self.snapshot = Some((node, clean_inner_html(dom, node)));
        self.active = Some(node);
        let kind = self
            .kind_of(node)
            .or_else(|| self.page.dom().tag(node).and_then(BlockKind::from_tag));
        self.toolbar = kind.map(ToolbarContext::for_kind).unwrap_or_default();
        Ok(())
    }

    /// Drops the focus marker and logs a text change made while focused.
    /// The block stays the target for toolbar actions.
    pub fn blur(&mut self, storage: &mut dyn Storage) -> Result<(), EditorError> {
        if let Some(node) = self.snapshot.as_ref().map(|(node, _)| *node) {
            self.page.dom_mut().remove_class(node, FOCUSED_CLASS);
        }
        self.commit_text(storage)?;
        self.snapshot = None;
        Ok(())
    }

    fn commit_text(&mut self, storage: &mut dyn Storage) -> Result<(), EditorError> {
        let Some((node, before)) = self.snapshot.take() else {
            return Ok(());
        };
        let dom = self.page.dom();
        if !dom.is_attached(node) {
            return Ok(());
        }
        let after = clean_inner_html(dom, node);
        if after != before {
            revision::track_edit(
                storage,
                self.clock.as_ref(),
                self.page.id(),
                EditKind::Text,
                &before,
                &after,
            )?;
        }
        self.snapshot = Some((node, after));
        Ok(())
    }

    /// The terminal's stand-in for typing into the focused block.
    pub fn set_active_content(&mut self, markup: &str) -> Result<(), EditorError> {
        self.require_edit_mode()?;
        let node = self.active.ok_or(EditorError::NothingToFormat)?;
        let (mut scratch, copy) = self.page.dom().clone_into_new(node);
        scratch.set_inner_html(copy, markup);
        if !scratch.survives_reparse(copy) {
            return Err(EditorError::UnstableMarkup);
        }
        self.formatter
            .replace_content(self.page.dom_mut(), node, markup);
        Ok(())
    }

    pub fn key_down(
        &mut self,
        key: EditorKey,
        storage: &mut dyn Storage,
    ) -> Result<KeyOutcome, EditorError> {
        let (EditorKey::Enter { shift: false }, Some(node)) = (key, self.active) else {
            return Ok(KeyOutcome::Default);
        };
        let Some(kind) = self.kind_of(node) else {
            return Ok(KeyOutcome::Default);
        };
        if let Some(sibling) = InsertKind::keyboard_sibling(kind) {
            self.insert(sibling, true, storage)?;
            return Ok(KeyOutcome::Handled);
        }
        match kind {
            BlockKind::TableCell => {
                let next = self.page.dom().next_element_sibling(node);
                if let Some(next) = next.filter(|next| self.is_editable(*next)) {
                    self.activate(next, storage)?;
                }
                Ok(KeyOutcome::Handled)
            }
            _ => Ok(KeyOutcome::Default),
        }
    }

    /// Adds a block after the active one and focuses it. Keyboard inserts
    /// start empty and leave no trace in the revision log.
    pub fn insert(
        &mut self,
        kind: InsertKind,
        via_keyboard: bool,
        storage: &mut dyn Storage,
    ) -> Result<NodeId, EditorError> {
        self.require_edit_mode()?;
        let active = self.active.ok_or(EditorError::NothingToInsertAfter)?;
        if kind == InsertKind::TableRow && self.kind_of(active) != Some(BlockKind::TableCell) {
            return Err(EditorError::RowNeedsTableCell);
        }
        self.commit_text(storage)?;

        let target = match kind {
            InsertKind::TableRow => self.clone_row(active)?,
            _ => {
                let dom = self.page.dom_mut();
                let node = dom.create_element(kind.tag());
                let content = if via_keyboard {
                    revision::EMPTY_LINE_PLACEHOLDER
                } else {
                    kind.placeholder()
                };
                dom.set_inner_html(node, content);
                dom.add_class(node, NEW_NODE_CLASS);
                dom.insert_after(active, node);
                node
            }
        };

        self.scan();
        self.activate(target, storage)?;
        if !via_keyboard {
            revision::track_edit(
                storage,
                self.clock.as_ref(),
                self.page.id(),
                EditKind::Add,
                "none",
                &format!("Added new <{}> block", kind.tag()),
            )?;
        }
        Ok(target)
    }

    /// Copies the active cell's row below it with every cell blanked and
    /// returns the first cell of the copy.
    fn clone_row(&mut self, cell: NodeId) -> Result<NodeId, EditorError> {
        let dom = self.page.dom_mut();
        let row = dom.closest_tag(cell, "tr").ok_or(EditorError::RowNeedsTableCell)?;
        let copy = dom.clone_subtree(row);
        let mut first_cell = None;
        for node in dom.descendants(copy) {
            strip_markers(dom, node);
            if dom.is_tag(node, "td") {
                dom.set_inner_html(node, revision::EMPTY_LINE_PLACEHOLDER);
                first_cell.get_or_insert(node);
            }
        }
        strip_markers(dom, copy);
        dom.insert_after(row, copy);
        first_cell.ok_or(EditorError::RowNeedsTableCell)
    }

    /// Removes the active block, or its whole row for a table cell.
    /// Returns false when the user declined.
    pub fn delete_active<F>(
        &mut self,
        storage: &mut dyn Storage,
        confirm: F,
    ) -> Result<bool, EditorError>
    where
        F: FnOnce(&str) -> bool,
    {
        self.require_edit_mode()?;
        let active = self.active.ok_or(EditorError::NothingToDelete)?;
        if !confirm(DELETE_PROMPT) {
            return Ok(false);
        }
        self.commit_text(storage)?;

        let dom = self.page.dom_mut();
        let row = match self.editables.iter().find(|(node, _)| *node == active) {
            Some((_, BlockKind::TableCell)) => dom.closest_tag(active, "tr"),
            _ => None,
        };
        let (removed_text, tag) = match row {
            Some(row) => {
                dom.detach(row);
                (ROW_DELETE_TEXT.to_string(), "tr".to_string())
            }
            None => {
                let tag = dom.tag(active).unwrap_or_default().to_string();
                let text = dom.text_content(active);
                dom.detach(active);
                (text, tag)
            }
        };

        self.active = None;
        self.snapshot = None;
        self.toolbar = ToolbarContext::Text;
        self.scan();
        revision::track_edit(
            storage,
            self.clock.as_ref(),
            self.page.id(),
            EditKind::Delete,
            &removed_text,
            &format!("Deleted <{tag}> block"),
        )?;
        Ok(true)
    }

    /// Persists the content region without editor markers.
    pub fn save(&mut self, storage: &mut dyn Storage) -> Result<(), EditorError> {
        self.require_edit_mode()?;
        self.commit_text(storage)?;

        let body = clean_inner_html(self.page.dom(), self.page.content_root());
        PersistedPages::put(storage, self.page.id(), &body)?;
        tracing::info!(page = %self.page.id(), bytes = body.len(), "page saved");
        revision::track_edit(
            storage,
            self.clock.as_ref(),
            self.page.id(),
            EditKind::Save,
            SAVE_OLD_TEXT,
            SAVE_NEW_TEXT,
        )?;
        Ok(())
    }

    pub fn apply_style(&mut self, style: InlineStyle) -> Result<(), EditorError> {
        self.require_edit_mode()?;
        let node = self.active.ok_or(EditorError::NothingToFormat)?;
        if !self
            .formatter
            .apply_inline_style(self.page.dom_mut(), node, style)
        {
            return Err(EditorError::NothingToFormat);
        }
        Ok(())
    }

    /// Asks for a URL and links the active block's content. Returns false
    /// when the prompt was cancelled or left empty.
    pub fn insert_link<F>(&mut self, prompt: F) -> Result<bool, EditorError>
    where
        F: FnOnce(&str, &str) -> Option<String>,
    {
        self.require_edit_mode()?;
        let node = self.active.ok_or(EditorError::NothingToFormat)?;
        let Some(url) = prompt(LINK_PROMPT, LINK_DEFAULT) else {
            return Ok(false);
        };
        let linked = self.formatter.create_link(self.page.dom_mut(), node, &url);
        if linked {
            self.scan();
        }
        Ok(linked)
    }

    pub fn undo(&mut self) -> Result<NodeId, EditorError> {
        self.require_edit_mode()?;
        self.formatter
            .undo(self.page.dom_mut())
            .ok_or(EditorError::NothingToUndo)
    }

    pub fn redo(&mut self) -> Result<NodeId, EditorError> {
        self.require_edit_mode()?;
        self.formatter
            .redo(self.page.dom_mut())
            .ok_or(EditorError::NothingToRedo)
    }

    /// Links and buttons inside the main area stop working while editing.
    pub fn intercept_click(&self, target: NodeId) -> ClickOutcome {
        if !self.edit_mode {
            return ClickOutcome::Allowed;
        }
        let dom = self.page.dom();
        let main = self.page.main_root();
        if target != main && !dom.is_descendant_of(target, main) {
            return ClickOutcome::Allowed;
        }
        if dom.closest_class(target, TOOLBAR_CLASS).is_some() {
            return ClickOutcome::Allowed;
        }
        let link = dom.closest_tag(target, "a");
        let button = dom
            .closest_tag(target, "button")
            .filter(|button| !dom.has_class(*button, MOBILE_TOGGLE_CLASS));
        if link.is_some() || button.is_some() {
            tracing::debug!("navigation blocked in edit mode");
            ClickOutcome::Blocked
        } else {
            ClickOutcome::Allowed
        }
    }
}

/// Markup of `node`'s content as it would be saved.
fn clean_inner_html(dom: &Dom, node: NodeId) -> String {
    let (mut clean, copy) = dom.clone_into_new(node);
    for descendant in clean.descendants(copy) {
        strip_markers(&mut clean, descendant);
    }
    clean.inner_html(copy)
}

fn strip_markers(dom: &mut Dom, node: NodeId) {
    if dom.element(node).is_none() {
        return;
    }
    dom.remove_attr(node, "contenteditable");
    for class in [EDITABLE_CLASS, FOCUSED_CLASS, NEW_NODE_CLASS] {
        dom.remove_class(node, class);
    }
    if dom.attr(node, "class").is_some_and(|value| value.trim().is_empty()) {
        dom.remove_attr(node, "class");
    }
}

#[cfg(test)]
#[path = "editor_tests.rs"]
mod editor_tests;
