//! Converts the inline content of a block element into styled spans.

use tdoc::{InlineStyle, Span};

use crate::dom::{Dom, NodeData, NodeId, decode_entities};

const SKIPPED: [&str; 4] = ["script", "style", "template", "button"];

/// Elements that start a new block; everything else flows inline.
pub const BLOCK_TAGS: [&str; 34] = [
    "address", "article", "aside", "blockquote", "body", "caption", "dd", "details", "div", "dl",
    "dt", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "html", "li", "main", "ol", "p", "pre", "section", "summary", "table", "tr", "ul",
];

pub fn is_block(dom: &Dom, node: NodeId) -> bool {
    dom.tag(node).is_some_and(|tag| {
        BLOCK_TAGS.contains(&tag) || matches!(tag, "td" | "th" | "thead" | "tbody" | "tfoot" | "nav")
    })
}

/// Font Awesome glyphs carry no text worth showing in a terminal.
pub fn is_icon(dom: &Dom, node: NodeId) -> bool {
    dom.is_tag(node, "i")
        && dom.attr(node, "class").is_some_and(|classes| {
            classes.split_ascii_whitespace().any(|class| {
                matches!(class, "fa" | "fas" | "far" | "fab") || class.starts_with("fa-")
            })
        })
}

fn style_for(tag: &str) -> Option<InlineStyle> {
    match tag {
        "b" | "strong" => Some(InlineStyle::Bold),
        "i" | "em" | "cite" => Some(InlineStyle::Italic),
        "u" | "ins" => Some(InlineStyle::Underline),
        "s" | "strike" | "del" => Some(InlineStyle::Strike),
        "code" | "kbd" | "samp" => Some(InlineStyle::Code),
        "mark" => Some(InlineStyle::Highlight),
        "a" => Some(InlineStyle::Link),
        _ => None,
    }
}

/// Spans for the inline children of `node`; nested blocks are left out.
pub fn inline_spans(dom: &Dom, node: NodeId) -> Vec<Span> {
    let mut spans = Vec::new();
    for child in dom.children(node) {
        if !is_block(dom, *child) {
            convert(dom, *child, &mut spans);
        }
    }
    spans
}

/// Spans for a run of sibling nodes.
pub fn spans_for(dom: &Dom, nodes: &[NodeId]) -> Vec<Span> {
    let mut spans = Vec::new();
    for node in nodes {
        convert(dom, *node, &mut spans);
    }
    spans
}

fn convert(dom: &Dom, node: NodeId, out: &mut Vec<Span>) {
    match dom.data(node) {
        NodeData::Text(raw) => {
            let text = collapse_whitespace(&decode_entities(raw));
            if !text.is_empty() {
                out.push(Span::new_text(&text));
            }
        }
        NodeData::Comment(_) | NodeData::Root => {}
        NodeData::Element(element) => {
            let tag = element.tag.as_str();
            if SKIPPED.contains(&tag) || is_icon(dom, node) {
                return;
            }
            if tag == "br" {
                out.push(Span::new_text("\n"));
                return;
            }
            if tag == "img" {
                if let Some(alt) = dom.attr(node, "alt").filter(|alt| !alt.is_empty()) {
                    out.push(Span::new_text(&format!("[{alt}]")));
                }
                return;
            }
            let mut children = Vec::new();
            for child in dom.children(node) {
                convert(dom, *child, &mut children);
            }
            match style_for(tag) {
                Some(style) => {
                    let mut span = Span::new_text("");
                    span.style = style;
                    span.children = children;
                    if style == InlineStyle::Link {
                        span.link_target = dom.attr(node, "href").map(str::to_string);
                    }
                    out.push(span);
                }
                None => out.extend(children),
            }
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() && ch != '\u{a0}' {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// First link target inside `node`, if any.
pub fn first_link(dom: &Dom, node: NodeId) -> Option<(NodeId, String)> {
    let anchor = dom.closest_tag(node, "a").or_else(|| {
        dom.find_first(node, |dom, candidate| {
            dom.is_tag(candidate, "a") && dom.attr(candidate, "href").is_some()
        })
    })?;
    let href = dom.attr(anchor, "href")?.to_string();
    Some((anchor, href))
}
