use crate::model::{ItemId, Minute, SlotId};

#[derive(Debug)]
pub enum StoreError {
    /// Degenerate or out-of-day time range, rejected before any persistence.
    InvalidSpan { start: Minute, end: Minute },
    /// Empty or otherwise unusable item content.
    InvalidContent(&'static str),
    /// The candidate range overlaps the slot with this id.
    Conflict(SlotId),
    ItemNotFound(ItemId),
    LimitExceeded(&'static str),
    JournalError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::InvalidSpan { start, end } => {
                write!(f, "invalid time span [{start}, {end})")
            }
            StoreError::InvalidContent(msg) => write!(f, "invalid content: {msg}"),
            StoreError::Conflict(id) => write!(f, "range taken by slot: {id}"),
            StoreError::ItemNotFound(id) => write!(f, "item not found: {id}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
