use tdoc::InlineStyle;

use crate::dom::{Dom, NodeId};

const MAX_UNDO: usize = 100;

/// Rich-text capability the editor delegates to. The editor only needs to
/// ask for a style on the active block; how markup changes is up to the
/// implementation.
pub trait InlineFormatter {
    /// Toggles `style` over the whole content of `node`.
    fn apply_inline_style(&mut self, dom: &mut Dom, node: NodeId, style: InlineStyle) -> bool;

    fn create_link(&mut self, dom: &mut Dom, node: NodeId, url: &str) -> bool;

    /// Replaces the inner markup of `node`, recording it for undo.
    fn replace_content(&mut self, dom: &mut Dom, node: NodeId, markup: &str) -> bool;

    /// Returns the node whose content changed.
    fn undo(&mut self, dom: &mut Dom) -> Option<NodeId>;

    fn redo(&mut self, dom: &mut Dom) -> Option<NodeId>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Snapshot {
    node: NodeId,
    markup: String,
}

/// Formats by wrapping a block's content in a single inline element and
/// keeps whole-content snapshots for undo and redo.
#[derive(Clone, Debug, Default)]
pub struct DomFormatter {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    /// Node of the typing run in progress. Its keystrokes share one snapshot.
    typing: Option<NodeId>,
}

impl DomFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    fn remember(&mut self, dom: &Dom, node: NodeId) {
        self.typing = None;
        self.undo_stack.push(Snapshot {
            node,
            markup: dom.inner_html(node),
        });
        if self.undo_stack.len() > MAX_UNDO {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    fn wrap_content(&mut self, dom: &mut Dom, node: NodeId, tag: &str, href: Option<&str>) {
        let wrapper = dom.create_element(tag);
        if let Some(href) = href {
            dom.set_attr(wrapper, "href", href);
        }
        for child in dom.children(node).to_vec() {
            dom.append_child(wrapper, child);
        }
        dom.append_child(node, wrapper);
    }
}

impl InlineFormatter for DomFormatter {
    fn apply_inline_style(&mut self, dom: &mut Dom, node: NodeId, style: InlineStyle) -> bool {
        let tags = style_tags(style);
        let Some(tag) = tags.first() else {
            return false;
        };
        self.remember(dom, node);
        match sole_wrapper(dom, node) {
            Some(wrapper) if tags.iter().any(|candidate| dom.is_tag(wrapper, candidate)) => {
                unwrap(dom, wrapper);
            }
            _ => self.wrap_content(dom, node, tag, None),
        }
        true
    }

    fn create_link(&mut self, dom: &mut Dom, node: NodeId, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }
        self.remember(dom, node);
        match sole_wrapper(dom, node) {
            Some(anchor) if dom.is_tag(anchor, "a") => dom.set_attr(anchor, "href", url),
            _ => self.wrap_content(dom, node, "a", Some(url)),
        }
        true
    }

    fn replace_content(&mut self, dom: &mut Dom, node: NodeId, markup: &str) -> bool {
        if dom.inner_html(node) == markup {
            return false;
        }
        if self.typing == Some(node) {
            self.redo_stack.clear();
        } else {
            self.remember(dom, node);
            self.typing = Some(node);
        }
        dom.set_inner_html(node, markup);
        true
    }

    fn undo(&mut self, dom: &mut Dom) -> Option<NodeId> {
        self.typing = None;
        while let Some(snapshot) = self.undo_stack.pop() {
            if !dom.is_attached(snapshot.node) {
                continue;
            }
            self.redo_stack.push(Snapshot {
                node: snapshot.node,
                markup: dom.inner_html(snapshot.node),
            });
            dom.set_inner_html(snapshot.node, &snapshot.markup);
            return Some(snapshot.node);
        }
        None
    }

    fn redo(&mut self, dom: &mut Dom) -> Option<NodeId> {
        self.typing = None;
        while let Some(snapshot) = self.redo_stack.pop() {
            if !dom.is_attached(snapshot.node) {
                continue;
            }
            self.undo_stack.push(Snapshot {
                node: snapshot.node,
                markup: dom.inner_html(snapshot.node),
            });
            dom.set_inner_html(snapshot.node, &snapshot.markup);
            return Some(snapshot.node);
        }
        None
    }
}

/// Element names that carry a style; the first one is written, the rest are
/// recognised when toggling off.
fn style_tags(style: InlineStyle) -> &'static [&'static str] {
    match style {
        InlineStyle::None => &[],
        InlineStyle::Bold => &["b", "strong"],
        InlineStyle::Italic => &["i", "em"],
        InlineStyle::Underline => &["u"],
        InlineStyle::Strike => &["s", "strike", "del"],
        InlineStyle::Code => &["code"],
        InlineStyle::Highlight => &["mark"],
        InlineStyle::Link => &["a"],
    }
}

/// The only element child of `node` when everything else is blank text.
fn sole_wrapper(dom: &Dom, node: NodeId) -> Option<NodeId> {
    let mut wrapper = None;
    for child in dom.children(node) {
        if dom.element(*child).is_some() {
            if wrapper.is_some() {
                return None;
            }
            wrapper = Some(*child);
        } else if dom.raw_text(*child).is_some_and(|text| !text.trim().is_empty()) {
            return None;
        }
    }
    wrapper
}

fn unwrap(dom: &mut Dom, wrapper: NodeId) {
    let mut anchor = wrapper;
    for child in dom.children(wrapper).to_vec() {
        dom.insert_after(anchor, child);
        anchor = child;
    }
    dom.detach(wrapper);
}

pub fn inline_style_label(style: InlineStyle) -> Option<&'static str> {
    match style {
        InlineStyle::None => None,
        InlineStyle::Bold => Some("Bold"),
        InlineStyle::Italic => Some("Italic"),
        InlineStyle::Highlight => Some("Highlight"),
        InlineStyle::Underline => Some("Underline"),
        InlineStyle::Strike => Some("Strikethrough"),
        InlineStyle::Link => Some("Link"),
        InlineStyle::Code => Some("Code"),
    }
}
