//! Durable, observable store for daily time-box planning.
//!
//! Backs the capture → prioritize → place → review ritual: freeform
//! captured items, a Big-Three priority flag, conflict-checked placement
//! of items onto per-day timelines, and per-day review aggregates.
//!
//! State lives in memory and is made durable through an append-only
//! event journal (group-committed, CRC-checked, periodically compacted).
//! Committed mutations fan out to live subscribers through per-date
//! broadcast channels; a consumer snapshots, then re-queries on each
//! received event.

pub mod journal;
mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;

pub use model::{
    CapturedItem, DaySummary, Event, ItemId, Minute, ScheduleSlot, SlotColor, SlotId, TimeSpan,
};
pub use store::{DayWatch, SlotStore, StoreError};
