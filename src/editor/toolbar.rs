use super::kind::{BlockKind, InsertKind};

/// Level of the heading the "add header" button spawns.
pub const HEADER_LEVEL: u8 = 3;

/// Which set of contextual actions the toolbar offers for the active block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToolbarContext {
    #[default]
    Text,
    List,
    Table,
}

impl ToolbarContext {
    pub fn for_kind(kind: BlockKind) -> Self {
        match kind {
            BlockKind::TableCell => ToolbarContext::Table,
            BlockKind::ListItem => ToolbarContext::List,
            BlockKind::Paragraph | BlockKind::Heading(_) => ToolbarContext::Text,
        }
    }

    pub fn add_label(self) -> &'static str {
        match self {
            ToolbarContext::Text => "Add Text",
            ToolbarContext::List => "Add Bullet",
            ToolbarContext::Table => "Add Row",
        }
    }

    pub fn delete_label(self) -> &'static str {
        match self {
            ToolbarContext::Text => "Delete",
            ToolbarContext::List => "Del Bullet",
            ToolbarContext::Table => "Del Row",
        }
    }

    pub fn add_target(self) -> InsertKind {
        match self {
            ToolbarContext::Text => InsertKind::Paragraph,
            ToolbarContext::List => InsertKind::ListItem,
            ToolbarContext::Table => InsertKind::TableRow,
        }
    }

    /// Headings make no sense inside lists and tables.
    pub fn shows_header_button(self) -> bool {
        matches!(self, ToolbarContext::Text)
    }
}
