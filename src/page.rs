use std::fmt;

use crate::dom::{Dom, NodeId};
use crate::search;
use crate::storage::{PersistedPages, Storage};

pub const DEFAULT_PAGE: &str = "Documentation.html";
/// The revision log page never takes a saved override.
pub const REVISION_PAGE: &str = "version-edits.html";

pub const CONTENT_CLASS: &str = "content-wrap";
pub const MAIN_CLASS: &str = "main";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(String);

impl PageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Last non-empty path segment of a location, ignoring query and
    /// fragment.
    pub fn from_location(location: &str) -> Self {
        let path = location
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let last = path.rsplit('/').find(|segment| !segment.is_empty());
        match last {
            Some(segment) => Self(segment.to_string()),
            None => Self(DEFAULT_PAGE.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug)]
pub struct Page {
    id: PageId,
    dom: Dom,
    content_root: NodeId,
    main_root: NodeId,
}

impl Page {
    /// Parses generated HTML as-is.
    pub fn parse(id: PageId, html: &str) -> Self {
        let dom = Dom::parse_fragment(html);
        let content_root = dom
            .find_by_class(dom.root(), CONTENT_CLASS)
            .unwrap_or_else(|| dom.root());
        let main_root = dom
            .find_by_class(dom.root(), MAIN_CLASS)
            .unwrap_or(content_root);
        Self {
            id,
            dom,
            content_root,
            main_root,
        }
    }

    /// Parses generated HTML and lets a saved body replace the content
    /// region.
    pub fn load(id: PageId, html: &str, storage: &dyn Storage) -> Self {
        let mut page = Self::parse(id, html);
        if page.id.as_str() == REVISION_PAGE {
            return page;
        }
        if let Some(body) = PersistedPages::get(storage, &page.id) {
            tracing::debug!(page = %page.id, bytes = body.len(), "applying saved page body");
            page.dom.set_inner_html(page.content_root, &body);
        }
        page
    }

    pub fn id(&self) -> &PageId {
        &self.id
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    pub fn content_root(&self) -> NodeId {
        self.content_root
    }

    pub fn main_root(&self) -> NodeId {
        self.main_root
    }

    pub fn content_html(&self) -> String {
        self.dom.inner_html(self.content_root)
    }

    /// Marks a search term inside the content region only.
    pub fn highlight_keyword(&mut self, keyword: &str) -> Option<NodeId> {
        search::highlight_keyword(&mut self.dom, self.content_root, keyword)
    }
}
