use crate::dom::{Dom, NodeId};

use super::kind::BlockKind;
use super::{EDITABLE_CLASS, TOOLBAR_CLASS};

const CARD_CLASSES: [&str; 2] = ["card", "nav-card-body"];
const CODE_BLOCK_CLASS: &str = "code-block";

/// Every block that may be edited in place, in document order.
pub(super) fn editable_blocks(dom: &Dom, content_root: NodeId) -> Vec<(NodeId, BlockKind)> {
    dom.descendants(dom.root())
        .into_iter()
        .filter_map(|node| {
            let kind = BlockKind::from_tag(dom.tag(node)?)?;
            (in_scope(dom, node, kind, content_root) && !excluded(dom, node)).then_some((node, kind))
        })
        .collect()
}

fn in_scope(dom: &Dom, node: NodeId, kind: BlockKind, content_root: NodeId) -> bool {
    if dom.is_descendant_of(node, content_root) {
        return true;
    }
    kind.allowed_in_cards()
        && CARD_CLASSES.iter().any(|class| {
            dom.parent(node)
                .and_then(|parent| dom.closest_class(parent, class))
                .is_some()
        })
}

fn excluded(dom: &Dom, node: NodeId) -> bool {
    dom.closest_tag(node, "summary").is_some()
        || dom.closest_class(node, CODE_BLOCK_CLASS).is_some()
        || dom.closest_class(node, TOOLBAR_CLASS).is_some()
}

pub(super) fn mark(dom: &mut Dom, node: NodeId) {
    dom.set_attr(node, "contenteditable", "true");
    dom.add_class(node, EDITABLE_CLASS);
}
