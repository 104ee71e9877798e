use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes since midnight — the only time-of-day type.
pub type Minute = u16;

/// Identifier of a captured item, assigned from a monotone sequence.
pub type ItemId = i64;

/// Identifier of a schedule slot.
pub type SlotId = Ulid;

/// Half-open time range `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: Minute,
    pub end: Minute,
}

impl TimeSpan {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "TimeSpan start must be before end");
        Self { start, end }
    }

    /// Build a span from `(hour, minute)` endpoints.
    pub fn from_hm(start_hour: u16, start_min: u16, end_hour: u16, end_min: u16) -> Self {
        Self::new(start_hour * 60 + start_min, end_hour * 60 + end_min)
    }

    pub fn duration_min(&self) -> Minute {
        self.end - self.start
    }

    /// Half-open overlap: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Display category of a slot, tied to the owning item's priority flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotColor {
    /// One of the day's Big Three.
    Focus,
    Standard,
    /// User-marked rest block; never recolored automatically.
    Break,
}

impl SlotColor {
    pub fn for_priority(priority: bool) -> Self {
        if priority {
            SlotColor::Focus
        } else {
            SlotColor::Standard
        }
    }
}

/// A freeform note logged by the user before scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedItem {
    pub id: ItemId,
    pub content: String,
    pub captured_at: DateTime<Utc>,
    /// Big-Three flag. The three-item cap is a presentation concern,
    /// not enforced here.
    pub priority: bool,
}

/// A captured item committed onto a day's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub id: SlotId,
    pub owner_item_id: ItemId,
    /// Copied from the owning item's content at placement time.
    pub title: String,
    pub span: TimeSpan,
    pub color: SlotColor,
    pub date: NaiveDate,
}

/// One day's timeline. Slots are kept sorted by `span.start` and,
/// by the placement invariant, pairwise disjoint.
#[derive(Debug, Clone)]
pub struct DayTimeline {
    pub date: NaiveDate,
    pub slots: Vec<ScheduleSlot>,
}

impl DayTimeline {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            slots: Vec::new(),
        }
    }

    /// Insert a slot maintaining sort order by span.start.
    pub fn insert_slot(&mut self, slot: ScheduleSlot) {
        let pos = self
            .slots
            .binary_search_by_key(&slot.span.start, |s| s.span.start)
            .unwrap_or_else(|e| e);
        self.slots.insert(pos, slot);
    }

    /// Remove a slot by id.
    pub fn remove_slot(&mut self, id: &SlotId) -> Option<ScheduleSlot> {
        if let Some(pos) = self.slots.iter().position(|s| &s.id == id) {
            Some(self.slots.remove(pos))
        } else {
            None
        }
    }

    /// First slot starting exactly at `start`, if any.
    pub fn slot_at_start(&self, start: Minute) -> Option<&ScheduleSlot> {
        self.slots.iter().find(|s| s.span.start == start)
    }

    /// Return only slots whose span overlaps the query window.
    /// Uses binary search to skip slots starting at or after `query.end`.
    pub fn overlapping(&self, query: &TimeSpan) -> impl Iterator<Item = &ScheduleSlot> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.slots.partition_point(|s| s.span.start < query.end);
        self.slots[..right_bound]
            .iter()
            .filter(move |s| s.span.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the journal record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ItemCaptured {
        id: ItemId,
        content: String,
        captured_at: DateTime<Utc>,
        priority: bool,
    },
    ItemPriorityChanged {
        id: ItemId,
        priority: bool,
    },
    ItemDeleted {
        id: ItemId,
    },
    ItemsCleared,
    SlotPlaced {
        id: SlotId,
        owner_item_id: ItemId,
        title: String,
        span: TimeSpan,
        color: SlotColor,
        date: NaiveDate,
    },
    SlotUpdated {
        id: SlotId,
        owner_item_id: ItemId,
        title: String,
        span: TimeSpan,
        color: SlotColor,
        date: NaiveDate,
    },
    SlotDeleted {
        id: SlotId,
    },
    OwnerSlotsDeleted {
        owner_item_id: ItemId,
    },
    DayCleared {
        date: NaiveDate,
    },
}

impl Event {
    /// Reassemble the slot record carried by a SlotPlaced/SlotUpdated event.
    pub(crate) fn slot_record(&self) -> Option<ScheduleSlot> {
        match self {
            Event::SlotPlaced {
                id,
                owner_item_id,
                title,
                span,
                color,
                date,
            }
            | Event::SlotUpdated {
                id,
                owner_item_id,
                title,
                span,
                color,
                date,
            } => Some(ScheduleSlot {
                id: *id,
                owner_item_id: *owner_item_id,
                title: title.clone(),
                span: *span,
                color: *color,
                date: *date,
            }),
            _ => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Per-day aggregate for the review screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub slot_count: usize,
    pub planned_min: u32,
    pub focus_slot_count: usize,
    pub focus_min: u32,
}
