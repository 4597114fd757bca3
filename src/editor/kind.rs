/// The closed set of block kinds a user can edit in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Paragraph,
    /// Levels 1 to 4.
    Heading(u8),
    ListItem,
    TableCell,
}

impl BlockKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "p" => Some(BlockKind::Paragraph),
            "h1" => Some(BlockKind::Heading(1)),
            "h2" => Some(BlockKind::Heading(2)),
            "h3" => Some(BlockKind::Heading(3)),
            "h4" => Some(BlockKind::Heading(4)),
            "li" => Some(BlockKind::ListItem),
            "td" => Some(BlockKind::TableCell),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            BlockKind::Paragraph => "p",
            BlockKind::Heading(1) => "h1",
            BlockKind::Heading(2) => "h2",
            BlockKind::Heading(3) => "h3",
            BlockKind::Heading(_) => "h4",
            BlockKind::ListItem => "li",
            BlockKind::TableCell => "td",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BlockKind::Paragraph => "Paragraph",
            BlockKind::Heading(_) => "Heading",
            BlockKind::ListItem => "List item",
            BlockKind::TableCell => "Table cell",
        }
    }

    /// Kinds that only become editable inside the content region; `p` and
    /// `h4` are also picked up from card containers elsewhere on the page.
    pub(crate) fn allowed_in_cards(self) -> bool {
        matches!(self, BlockKind::Paragraph | BlockKind::Heading(4))
    }
}

/// What the insert operation should create next to the active node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertKind {
    Paragraph,
    Heading(u8),
    ListItem,
    TableRow,
}

impl InsertKind {
    pub fn tag(self) -> &'static str {
        match self {
            InsertKind::Paragraph => "p",
            InsertKind::Heading(level) => BlockKind::Heading(level).tag(),
            InsertKind::ListItem => "li",
            InsertKind::TableRow => "tr",
        }
    }

    /// Hint text for blocks added from the toolbar.
    pub fn placeholder(self) -> &'static str {
        match self {
            InsertKind::Paragraph => "Start typing new text here...",
            InsertKind::ListItem => "New list item",
            InsertKind::Heading(_) | InsertKind::TableRow => "New Header",
        }
    }

    /// The sibling a keyboard Enter spawns, if the kind grows by Enter.
    pub(crate) fn keyboard_sibling(kind: BlockKind) -> Option<Self> {
        match kind {
            BlockKind::Paragraph => Some(InsertKind::Paragraph),
            BlockKind::ListItem => Some(InsertKind::ListItem),
            BlockKind::Heading(_) | BlockKind::TableCell => None,
        }
    }
}
