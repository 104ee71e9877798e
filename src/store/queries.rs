use chrono::NaiveDate;
use tokio::sync::broadcast;

use crate::model::*;

use super::SlotStore;

impl SlotStore {
    // ── Item queries ─────────────────────────────────────────

    pub fn item(&self, id: ItemId) -> Option<CapturedItem> {
        self.items.get(&id).map(|e| e.value().clone())
    }

    /// All captured items, oldest first.
    pub fn items(&self) -> Vec<CapturedItem> {
        let mut items: Vec<CapturedItem> = self.items.iter().map(|e| e.value().clone()).collect();
        items.sort_by_key(|i| (i.captured_at, i.id));
        items
    }

    /// The current Big-Three selection (however many are flagged).
    pub fn priority_items(&self) -> Vec<CapturedItem> {
        let mut items: Vec<CapturedItem> = self
            .items
            .iter()
            .filter(|e| e.value().priority)
            .map(|e| e.value().clone())
            .collect();
        items.sort_by_key(|i| (i.captured_at, i.id));
        items
    }

    // ── Slot queries ─────────────────────────────────────────

    /// Snapshot of a date's timeline, ordered by start time.
    pub async fn slots_for_date(&self, date: NaiveDate) -> Vec<ScheduleSlot> {
        match self.get_day(&date) {
            Some(day) => day.read().await.slots.clone(),
            None => Vec::new(),
        }
    }

    /// Point lookup: the first slot starting exactly at `start`, or none.
    pub async fn slot_at_start(&self, date: NaiveDate, start: Minute) -> Option<ScheduleSlot> {
        let day = self.get_day(&date)?;
        let guard = day.read().await;
        guard.slot_at_start(start).cloned()
    }

    /// Dates that currently hold at least one slot, sorted.
    pub async fn planned_dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let handles: Vec<_> = self
            .days
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        for (date, day) in handles {
            if !day.read().await.slots.is_empty() {
                dates.push(date);
            }
        }
        dates.sort();
        dates
    }

    /// Per-day aggregate for the review screen.
    pub async fn day_summary(&self, date: NaiveDate) -> DaySummary {
        let slots = self.slots_for_date(date).await;
        let mut summary = DaySummary {
            date,
            slot_count: slots.len(),
            planned_min: 0,
            focus_slot_count: 0,
            focus_min: 0,
        };
        for slot in &slots {
            let dur = u32::from(slot.span.duration_min());
            summary.planned_min += dur;
            if slot.color == SlotColor::Focus {
                summary.focus_slot_count += 1;
                summary.focus_min += dur;
            }
        }
        summary
    }

    // ── Live views ───────────────────────────────────────────

    /// Raw change feed for one date.
    pub fn subscribe(&self, date: NaiveDate) -> broadcast::Receiver<Event> {
        self.notify.subscribe(date)
    }

    /// Raw change feed for item-level events.
    pub fn subscribe_items(&self) -> broadcast::Receiver<Event> {
        self.notify.subscribe_items()
    }

    /// Continuously-updating view of one date's timeline. Lives until the
    /// watch is dropped; there is no natural termination.
    pub fn watch_date(&self, date: NaiveDate) -> DayWatch<'_> {
        DayWatch {
            store: self,
            date,
            rx: self.notify.subscribe(date),
        }
    }
}

/// Live, ordered-by-start view of a single date.
///
/// Consumers take `snapshot()`, then await `changed()` in a loop and
/// re-render. A lagged receiver resyncs by snapshotting: the state is
/// authoritative, the events are only wake-ups.
pub struct DayWatch<'a> {
    store: &'a SlotStore,
    date: NaiveDate,
    rx: broadcast::Receiver<Event>,
}

impl DayWatch<'_> {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub async fn snapshot(&self) -> Vec<ScheduleSlot> {
        self.store.slots_for_date(self.date).await
    }

    /// Wait for the next change to this date and return the fresh
    /// snapshot. `None` once the store side has gone away.
    pub async fn changed(&mut self) -> Option<Vec<ScheduleSlot>> {
        match self.rx.recv().await {
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => Some(self.snapshot().await),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
