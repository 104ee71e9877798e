use crate::model::Minute;

/// Upper bound for any time-of-day value; spans must end at or before this.
pub const MINUTES_PER_DAY: Minute = 1440;

/// Longest accepted item content, in bytes. Slot titles are copies of
/// item content, so they share this bound.
pub const MAX_CONTENT_LEN: usize = 1024;

/// Captured items held at once.
pub const MAX_ITEMS: usize = 10_000;

/// Slots on a single date. 288 = a full day at five-minute granularity.
pub const MAX_SLOTS_PER_DAY: usize = 288;

/// Journal writer command channel depth.
pub const JOURNAL_CHANNEL_CAPACITY: usize = 4096;

/// Per-date broadcast channel depth.
pub const NOTIFY_CHANNEL_CAPACITY: usize = 256;
