//! Full-text search over the generated index, preferring saved page bodies,
//! and in-page highlighting of the term a result was opened with.

use serde::{Deserialize, Serialize};

use crate::dom::{Dom, NodeId, decode_entities, escape_text};
use crate::page::PageId;
use crate::storage::{PersistedPages, Storage};

pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_RESULTS: usize = 6;
pub const SNIPPET_CONTEXT: usize = 40;
pub const QUERY_PARAM: &str = "sq";
pub const HIGHLIGHT_CLASS: &str = "search-highlight";
pub const NO_RESULTS_NOTICE: &str = "No matching results found across the documentation.";

const ELLIPSIS: &str = "...";
const UNSEARCHED_PARENTS: [&str; 4] = ["script", "style", "title", "mark"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedPage {
    pub page_id: String,
    pub title: String,
    pub path: String,
    /// Plain text of the generated page.
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchIndex {
    pages: Vec<IndexedPage>,
}

impl SearchIndex {
    pub fn new(pages: Vec<IndexedPage>) -> Self {
        Self { pages }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn pages(&self) -> &[IndexedPage] {
        &self.pages
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub path: String,
    /// Escaped text with every occurrence wrapped in `<mark>`.
    pub snippet: String,
    pub href: String,
}

pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Case-insensitive substring search across every indexed page. Pages with
/// a saved body are searched by that body's text instead.
pub fn search(index: &SearchIndex, storage: &dyn Storage, query: &str) -> Vec<SearchHit> {
    let query = normalize_query(query);
    let needle: Vec<char> = query.chars().collect();
    if needle.len() < MIN_QUERY_CHARS {
        return Vec::new();
    }

    let href_query = urlencoding::encode(&query);
    let hits: Vec<SearchHit> = index
        .pages
        .iter()
        .filter_map(|page| {
            let text = searchable_text(page, storage);
            let snippet = snippet(&text, &needle)?;
            Some(SearchHit {
                title: page.title.clone(),
                path: page.path.clone(),
                snippet,
                href: format!("{}?{QUERY_PARAM}={href_query}", page.path),
            })
        })
        .take(MAX_RESULTS)
        .collect();
    tracing::debug!(query = %query, hits = hits.len(), "search finished");
    hits
}

fn searchable_text(page: &IndexedPage, storage: &dyn Storage) -> String {
    match PersistedPages::get(storage, &PageId::new(page.page_id.as_str())) {
        Some(body) => {
            let dom = Dom::parse_fragment(&body);
            collapse_whitespace(&dom.text_content(dom.root()))
        }
        None => page.content.clone(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn snippet(text: &str, needle: &[char]) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let (first, _) = *match_ranges(&chars, needle).first()?;

    let start = first.saturating_sub(SNIPPET_CONTEXT);
    let end = (first + needle.len() + SNIPPET_CONTEXT).min(chars.len());
    let window = &chars[start..end];

    let mut out = String::new();
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    let mut cursor = 0;
    for (from, to) in match_ranges(window, needle) {
        out.push_str(&escape_text(&window[cursor..from].iter().collect::<String>()));
        out.push_str("<mark>");
        out.push_str(&escape_text(&window[from..to].iter().collect::<String>()));
        out.push_str("</mark>");
        cursor = to;
    }
    out.push_str(&escape_text(&window[cursor..].iter().collect::<String>()));
    if end < chars.len() {
        out.push_str(ELLIPSIS);
    }
    Some(out)
}

fn fold(ch: char) -> char {
    ch.to_lowercase().next().unwrap_or(ch)
}

/// Non-overlapping case-insensitive matches as char ranges.
fn match_ranges(haystack: &[char], needle: &[char]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    if needle.is_empty() || needle.len() > haystack.len() {
        return ranges;
    }
    let needle: Vec<char> = needle.iter().copied().map(fold).collect();
    let mut index = 0;
    while index + needle.len() <= haystack.len() {
        let matches = haystack[index..index + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(hay, want)| fold(*hay) == *want);
        if matches {
            ranges.push((index, index + needle.len()));
            index += needle.len();
        } else {
            index += 1;
        }
    }
    ranges
}

/// Splits the search term off an address. Returns the decoded term, if the
/// address carried one, and the address without its query and fragment.
pub fn take_search_query(address: &str) -> (Option<String>, String) {
    let without_fragment = address.split('#').next().unwrap_or_default();
    let Some((path, query)) = without_fragment.split_once('?') else {
        return (None, without_fragment.to_string());
    };
    let term = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == QUERY_PARAM)
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
        .filter(|value| !value.is_empty());
    (term, path.to_string())
}

/// Wraps every occurrence of `keyword` in text below `root` with a
/// highlight mark, opens the `details` holding the first one and returns
/// that first mark.
pub fn highlight_keyword(dom: &mut Dom, root: NodeId, keyword: &str) -> Option<NodeId> {
    let needle: Vec<char> = keyword.chars().collect();
    if needle.len() < MIN_QUERY_CHARS {
        return None;
    }

    let targets: Vec<(NodeId, Vec<char>, Vec<(usize, usize)>)> = dom
        .descendants(root)
        .into_iter()
        .filter(|node| {
            dom.parent(*node)
                .and_then(|parent| dom.tag(parent))
                .is_none_or(|tag| !UNSEARCHED_PARENTS.contains(&tag))
        })
        .filter_map(|node| {
            let text: Vec<char> = decode_entities(dom.raw_text(node)?).chars().collect();
            let ranges = match_ranges(&text, &needle);
            (!ranges.is_empty()).then_some((node, text, ranges))
        })
        .collect();

    let mut first_mark = None;
    for (node, text, ranges) in targets {
        let span = dom.create_element("span");
        let mut cursor = 0;
        for (from, to) in ranges {
            if from > cursor {
                let plain = dom.create_text(&text[cursor..from].iter().collect::<String>());
                dom.append_child(span, plain);
            }
            let mark = dom.create_element("mark");
            dom.set_attr(mark, "class", HIGHLIGHT_CLASS);
            let matched = dom.create_text(&text[from..to].iter().collect::<String>());
            dom.append_child(mark, matched);
            dom.append_child(span, mark);
            first_mark.get_or_insert(mark);
            cursor = to;
        }
        if cursor < text.len() {
            let rest = dom.create_text(&text[cursor..].iter().collect::<String>());
            dom.append_child(span, rest);
        }
        dom.replace(node, span);
    }

    let mark = first_mark?;
    if let Some(details) = dom.closest_tag(mark, "details") {
        dom.set_attr(details, "open", "");
    }
    tracing::debug!(keyword, "search term highlighted");
    Some(mark)
}

#[cfg(test)]
#[path = "search_tests.rs"]
mod search_tests;
