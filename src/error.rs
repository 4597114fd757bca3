use thiserror::Error;

use crate::storage::StorageError;

/// Every variant is a soft failure: the host shows the message and the
/// operation leaves state untouched.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("Edit mode is not active.")]
    EditModeInactive,
    #[error("Click a text block first to insert below it.")]
    NothingToInsertAfter,
    #[error("Click a block first to delete it.")]
    NothingToDelete,
    #[error("Click a text block first to format it.")]
    NothingToFormat,
    #[error("Click a table cell first to add a row.")]
    RowNeedsTableCell,
    #[error("That markup would not survive a save. Block elements cannot go inside this block.")]
    UnstableMarkup,
    #[error("That block is not editable.")]
    NotEditable,
    #[error("Nothing to undo.")]
    NothingToUndo,
    #[error("Nothing to redo.")]
    NothingToRedo,
    #[error("That edit is no longer in the history.")]
    EntryNotFound,
    #[error("Cannot auto-reverse structural changes. Use 'Discard All' if needed.")]
    StructuralEdit,
    #[error("No saved structural data found for {page}.")]
    NoSavedBody { page: String },
    #[error(
        "Could not locate the exact text in the saved block (it may have been heavily modified since)."
    )]
    TextNotFound,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
