use chrono::{NaiveDate, Utc};
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{CONFLICTS_TOTAL, MUTATIONS_TOTAL};

use super::placement::{check_no_conflict, validate_span};
use super::{JournalCommand, SlotStore, StoreError};

impl SlotStore {
    // ── Captured items ───────────────────────────────────────

    /// Log a freeform note. Assigns the id and capture timestamp.
    pub async fn capture_item(
        &self,
        content: impl Into<String>,
    ) -> Result<CapturedItem, StoreError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(StoreError::InvalidContent("empty"));
        }
        if content.len() > MAX_CONTENT_LEN {
            return Err(StoreError::LimitExceeded("content too long"));
        }
        if self.items.len() >= MAX_ITEMS {
            return Err(StoreError::LimitExceeded("too many items"));
        }

        let item = CapturedItem {
            id: self.allocate_item_id(),
            content,
            captured_at: Utc::now(),
            priority: false,
        };
        let event = Event::ItemCaptured {
            id: item.id,
            content: item.content.clone(),
            captured_at: item.captured_at,
            priority: item.priority,
        };
        self.journal_append(&event).await?;
        self.apply_item_captured(item.clone());
        self.notify.send_items(&event);
        metrics::counter!(MUTATIONS_TOTAL, "op" => "capture_item").increment(1);
        Ok(item)
    }

    /// Promote or demote an item. Its non-Break slots are recolored to
    /// keep the timeline consistent with the flag.
    pub async fn set_item_priority(&self, id: ItemId, priority: bool) -> Result<(), StoreError> {
        let current = self
            .items
            .get(&id)
            .map(|e| e.value().priority)
            .ok_or(StoreError::ItemNotFound(id))?;
        if current == priority {
            return Ok(());
        }

        let event = Event::ItemPriorityChanged { id, priority };
        self.journal_append(&event).await?;
        let touched = self.apply_priority_change(id, priority).await;
        self.notify.send_items(&event);
        for date in touched {
            self.notify.send(date, &event);
        }
        metrics::counter!(MUTATIONS_TOTAL, "op" => "set_item_priority").increment(1);
        Ok(())
    }

    /// Delete one item; its slots are cascaded off every date.
    pub async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        if !self.items.contains_key(&id) {
            return Err(StoreError::ItemNotFound(id));
        }

        let event = Event::ItemDeleted { id };
        self.journal_append(&event).await?;
        let touched = self.apply_item_deleted(id).await;
        self.notify.send_items(&event);
        for date in touched {
            self.notify.send(date, &event);
        }
        metrics::counter!(MUTATIONS_TOTAL, "op" => "delete_item").increment(1);
        Ok(())
    }

    /// Bulk delete of every captured item, cascading their slots.
    pub async fn clear_items(&self) -> Result<(), StoreError> {
        if self.items.is_empty() {
            return Ok(());
        }

        let event = Event::ItemsCleared;
        self.journal_append(&event).await?;
        let touched = self.apply_items_cleared().await;
        self.notify.send_items(&event);
        for date in touched {
            self.notify.send(date, &event);
        }
        metrics::counter!(MUTATIONS_TOTAL, "op" => "clear_items").increment(1);
        Ok(())
    }

    // ── Slot repository ──────────────────────────────────────

    /// Persist a slot, replacing any record with the same id (possibly on
    /// another date). Validates the record shape only; overlap checking
    /// is the placement evaluator's job, invoked by the caller beforehand.
    pub async fn insert_slot(&self, slot: ScheduleSlot) -> Result<(), StoreError> {
        self.validate_slot_record(&slot).await?;
        let prior_date = self.date_of_slot(&slot.id);

        let event = slot_event(&slot, false);
        self.journal_append(&event).await?;
        self.apply_slot_upsert(slot).await;
        self.notify_slot_change(&event, prior_date);
        metrics::counter!(MUTATIONS_TOTAL, "op" => "insert_slot").increment(1);
        Ok(())
    }

    /// Full-record replace by id. Silent no-op when the id does not
    /// exist, mirroring upsert-like insert/update symmetry.
    pub async fn update_slot(&self, slot: ScheduleSlot) -> Result<(), StoreError> {
        let Some(prior_date) = self.date_of_slot(&slot.id) else {
            return Ok(());
        };
        self.validate_slot_record(&slot).await?;

        let event = slot_event(&slot, true);
        self.journal_append(&event).await?;
        self.apply_slot_upsert(slot).await;
        self.notify_slot_change(&event, Some(prior_date));
        metrics::counter!(MUTATIONS_TOTAL, "op" => "update_slot").increment(1);
        Ok(())
    }

    /// Remove one slot. No-op (not an error) if absent, so deletes are
    /// safe to retry.
    pub async fn delete_slot(&self, id: SlotId) -> Result<(), StoreError> {
        if self.date_of_slot(&id).is_none() {
            return Ok(());
        }

        let event = Event::SlotDeleted { id };
        self.journal_append(&event).await?;
        if let Some(date) = self.apply_slot_deleted(&id).await {
            self.notify.send(date, &event);
        }
        metrics::counter!(MUTATIONS_TOTAL, "op" => "delete_slot").increment(1);
        Ok(())
    }

    /// Remove every slot referencing `owner_item_id`. The cascade helper
    /// behind item deletion, also callable on its own.
    pub async fn delete_slots_by_owner(&self, owner_item_id: ItemId) -> Result<(), StoreError> {
        let has_any = self
            .owner_slots
            .get(&owner_item_id)
            .is_some_and(|e| !e.value().is_empty());
        if !has_any {
            return Ok(());
        }

        let event = Event::OwnerSlotsDeleted { owner_item_id };
        self.journal_append(&event).await?;
        let touched = self.apply_owner_slots_deleted(owner_item_id).await;
        for date in touched {
            self.notify.send(date, &event);
        }
        metrics::counter!(MUTATIONS_TOTAL, "op" => "delete_slots_by_owner").increment(1);
        Ok(())
    }

    /// Wipe a date's timeline.
    pub async fn clear_day(&self, date: NaiveDate) -> Result<(), StoreError> {
        let has_any = match self.get_day(&date) {
            Some(day) => !day.read().await.slots.is_empty(),
            None => false,
        };
        if !has_any {
            return Ok(());
        }

        let event = Event::DayCleared { date };
        self.journal_append(&event).await?;
        self.apply_day_cleared(date).await;
        self.notify.send(date, &event);
        metrics::counter!(MUTATIONS_TOTAL, "op" => "clear_day").increment(1);
        Ok(())
    }

    // ── Placement ────────────────────────────────────────────

    /// The composed placement flow: validate the range, check the date's
    /// timeline for overlap, then commit a slot carrying the owning
    /// item's content and priority color. Never partially applied: on
    /// `Conflict` nothing is journaled.
    pub async fn place_item(
        &self,
        item_id: ItemId,
        date: NaiveDate,
        span: TimeSpan,
    ) -> Result<ScheduleSlot, StoreError> {
        validate_span(&span)?;
        let (title, color) = {
            let item = self
                .items
                .get(&item_id)
                .ok_or(StoreError::ItemNotFound(item_id))?;
            (
                item.value().content.clone(),
                SlotColor::for_priority(item.value().priority),
            )
        };

        // Hold the day's write lock from the conflict check through the
        // apply, so no second placement can slip into the same range.
        let day = self.day_entry(date);
        let mut guard = day.write().await;
        if guard.slots.len() >= MAX_SLOTS_PER_DAY {
            return Err(StoreError::LimitExceeded("too many slots on date"));
        }
        if let Err(e) = check_no_conflict(&guard, &span) {
            metrics::counter!(CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let slot = ScheduleSlot {
            id: Ulid::new(),
            owner_item_id: item_id,
            title,
            span,
            color,
            date,
        };
        let event = slot_event(&slot, false);
        self.journal_append(&event).await?;
        self.attach_slot(&mut guard, slot.clone());
        drop(guard);

        self.notify.send(date, &event);
        metrics::counter!(MUTATIONS_TOTAL, "op" => "place_item").increment(1);
        Ok(slot)
    }

    // ── Journal maintenance ──────────────────────────────────

    /// Rewrite the journal with only the events needed to recreate the
    /// current state.
    pub async fn compact_journal(&self) -> Result<(), StoreError> {
        let mut events = Vec::new();

        let mut items: Vec<CapturedItem> = self.items.iter().map(|e| e.value().clone()).collect();
        items.sort_by_key(|i| i.id);
        for item in items {
            events.push(Event::ItemCaptured {
                id: item.id,
                content: item.content,
                captured_at: item.captured_at,
                priority: item.priority,
            });
        }

        // Items first, so every slot's owner already exists on replay.
        let mut dates: Vec<NaiveDate> = self.days.iter().map(|e| *e.key()).collect();
        dates.sort();
        for date in dates {
            let Some(day) = self.get_day(&date) else {
                continue;
            };
            let guard = day.read().await;
            for slot in &guard.slots {
                events.push(slot_event(slot, false));
            }
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| StoreError::JournalError(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    // ── Shared checks ────────────────────────────────────────

    async fn validate_slot_record(&self, slot: &ScheduleSlot) -> Result<(), StoreError> {
        validate_span(&slot.span)?;
        if slot.title.len() > MAX_CONTENT_LEN {
            return Err(StoreError::LimitExceeded("title too long"));
        }
        // Replacing a record already on this date frees its position.
        if self.date_of_slot(&slot.id) != Some(slot.date)
            && let Some(day) = self.get_day(&slot.date)
            && day.read().await.slots.len() >= MAX_SLOTS_PER_DAY
        {
            return Err(StoreError::LimitExceeded("too many slots on date"));
        }
        Ok(())
    }

    fn notify_slot_change(&self, event: &Event, prior_date: Option<NaiveDate>) {
        let Some(slot) = event.slot_record() else {
            return;
        };
        self.notify.send(slot.date, event);
        if let Some(prior) = prior_date
            && prior != slot.date
        {
            self.notify.send(prior, event);
        }
    }
}

fn slot_event(slot: &ScheduleSlot, update: bool) -> Event {
    if update {
        Event::SlotUpdated {
            id: slot.id,
            owner_item_id: slot.owner_item_id,
            title: slot.title.clone(),
            span: slot.span,
            color: slot.color,
            date: slot.date,
        }
    } else {
        Event::SlotPlaced {
            id: slot.id,
            owner_item_id: slot.owner_item_id,
            title: slot.title.clone(),
            span: slot.span,
            color: slot.color,
            date: slot.date,
        }
    }
}
