use chrono::NaiveDate;

use crate::limits::MINUTES_PER_DAY;
use crate::model::{DayTimeline, TimeSpan};

use super::{SlotStore, StoreError};

pub(crate) fn validate_span(span: &TimeSpan) -> Result<(), StoreError> {
    if span.start >= span.end || span.end > MINUTES_PER_DAY {
        return Err(StoreError::InvalidSpan {
            start: span.start,
            end: span.end,
        });
    }
    Ok(())
}

/// Reject iff any existing slot's half-open range intersects `candidate`.
/// `TimeSpan::overlaps` (via `DayTimeline::overlapping`) is the one
/// overlap predicate in the crate.
pub(crate) fn check_no_conflict(day: &DayTimeline, candidate: &TimeSpan) -> Result<(), StoreError> {
    if let Some(taken) = day.overlapping(candidate).next() {
        return Err(StoreError::Conflict(taken.id));
    }
    Ok(())
}

/// The open gaps of `window` once `day`'s slots are subtracted.
/// Relies on the timeline invariant: slots sorted, pairwise disjoint.
fn free_spans(day: &DayTimeline, window: &TimeSpan) -> Vec<TimeSpan> {
    let mut free = Vec::new();
    let mut cursor = window.start;
    for slot in day.overlapping(window) {
        if slot.span.start > cursor {
            free.push(TimeSpan::new(cursor, slot.span.start));
        }
        cursor = cursor.max(slot.span.end);
    }
    if cursor < window.end {
        free.push(TimeSpan::new(cursor, window.end));
    }
    free
}

impl SlotStore {
    /// Can `candidate` be committed on `date`?
    ///
    /// O(n) scan of that day's slots (n is single digits in practice).
    /// A degenerate candidate (`start >= end`) is a caller contract
    /// violation: rejected up front, never silently evaluated.
    pub async fn is_available(
        &self,
        date: NaiveDate,
        candidate: TimeSpan,
    ) -> Result<bool, StoreError> {
        validate_span(&candidate)?;
        let Some(day) = self.get_day(&date) else {
            return Ok(true);
        };
        let guard = day.read().await;
        Ok(check_no_conflict(&guard, &candidate).is_ok())
    }

    /// Open gaps of `window` on `date`: the placement targets the
    /// timeline screen offers.
    pub async fn free_spans(
        &self,
        date: NaiveDate,
        window: TimeSpan,
    ) -> Result<Vec<TimeSpan>, StoreError> {
        validate_span(&window)?;
        let Some(day) = self.get_day(&date) else {
            return Ok(vec![window]);
        };
        let guard = day.read().await;
        Ok(free_spans(&guard, &window))
    }
}
