mod error;
mod mutations;
mod placement;
mod queries;

pub use error::StoreError;
pub use queries::DayWatch;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::journal::Journal;
use crate::limits::JOURNAL_CHANNEL_CAPACITY;
use crate::model::*;
use crate::notify::NotifyHub;

pub type SharedDayTimeline = Arc<RwLock<DayTimeline>>;

// ── Group-commit journal channel ─────────────────────────

pub(crate) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn flush_and_respond(
    journal: &mut Journal,
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(journal, batch);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    journal: &mut Journal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = journal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// The store: sole authority for captured items and schedule slots.
///
/// All reads and writes pass through here; committed mutations are
/// journaled, applied to in-memory state, and fanned out via `notify`.
pub struct SlotStore {
    pub(crate) items: DashMap<ItemId, CapturedItem>,
    pub(crate) days: DashMap<NaiveDate, SharedDayTimeline>,
    /// Reverse lookup: slot id → the date its record lives on.
    pub(crate) slot_dates: DashMap<SlotId, NaiveDate>,
    /// Owner item → its slot ids, for cascade deletes and recoloring.
    pub(crate) owner_slots: DashMap<ItemId, Vec<SlotId>>,
    next_item_id: AtomicI64,
    journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl SlotStore {
    /// Replay the journal at `path` and start the group-commit writer.
    pub async fn open(path: PathBuf) -> io::Result<Self> {
        let events = Journal::replay(&path)?;
        tracing::debug!("replaying {} journal events from {}", events.len(), path.display());
        let journal = Journal::open(&path)?;
        let (journal_tx, journal_rx) = mpsc::channel(JOURNAL_CHANNEL_CAPACITY);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let store = Self {
            items: DashMap::new(),
            days: DashMap::new(),
            slot_dates: DashMap::new(),
            owner_slots: DashMap::new(),
            next_item_id: AtomicI64::new(1),
            journal_tx,
            notify: Arc::new(NotifyHub::new()),
        };

        for event in events {
            store.apply_replayed(event).await;
        }

        Ok(store)
    }

    /// Write event to the journal via the background group-commit writer.
    pub(crate) async fn journal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| StoreError::JournalError(e.to_string()))
    }

    pub(crate) fn get_day(&self, date: &NaiveDate) -> Option<SharedDayTimeline> {
        self.days.get(date).map(|e| e.value().clone())
    }

    pub(crate) fn day_entry(&self, date: NaiveDate) -> SharedDayTimeline {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayTimeline::new(date))))
            .clone()
    }

    pub(crate) fn allocate_item_id(&self) -> ItemId {
        self.next_item_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn date_of_slot(&self, id: &SlotId) -> Option<NaiveDate> {
        self.slot_dates.get(id).map(|e| *e.value())
    }

    // ── Event application ────────────────────────────────────
    //
    // One apply path serves both replay and live mutations, so the state
    // after a restart is exactly the state before it.

    async fn apply_replayed(&self, event: Event) {
        match event {
            Event::ItemCaptured {
                id,
                content,
                captured_at,
                priority,
            } => {
                self.apply_item_captured(CapturedItem {
                    id,
                    content,
                    captured_at,
                    priority,
                });
            }
            Event::ItemPriorityChanged { id, priority } => {
                self.apply_priority_change(id, priority).await;
            }
            Event::ItemDeleted { id } => {
                self.apply_item_deleted(id).await;
            }
            Event::ItemsCleared => {
                self.apply_items_cleared().await;
            }
            ref e @ (Event::SlotPlaced { .. } | Event::SlotUpdated { .. }) => {
                if let Some(slot) = e.slot_record() {
                    self.apply_slot_upsert(slot).await;
                }
            }
            Event::SlotDeleted { id } => {
                self.apply_slot_deleted(&id).await;
            }
            Event::OwnerSlotsDeleted { owner_item_id } => {
                self.apply_owner_slots_deleted(owner_item_id).await;
            }
            Event::DayCleared { date } => {
                self.apply_day_cleared(date).await;
            }
        }
    }

    pub(crate) fn apply_item_captured(&self, item: CapturedItem) {
        // Keep the sequence ahead of every id ever journaled.
        self.next_item_id.fetch_max(item.id + 1, Ordering::Relaxed);
        self.items.insert(item.id, item);
    }

    /// Flip the flag and recolor the item's slots (Break blocks stay).
    /// Returns the dates whose timelines changed.
    pub(crate) async fn apply_priority_change(&self, id: ItemId, priority: bool) -> Vec<NaiveDate> {
        let mut touched = Vec::new();
        {
            let Some(mut item) = self.items.get_mut(&id) else {
                return touched;
            };
            item.priority = priority;
        }

        let owned: Vec<SlotId> = self
            .owner_slots
            .get(&id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let color = SlotColor::for_priority(priority);
        for slot_id in owned {
            let Some(date) = self.date_of_slot(&slot_id) else {
                continue;
            };
            let Some(day) = self.get_day(&date) else {
                continue;
            };
            let mut guard = day.write().await;
            if let Some(pos) = guard.slots.iter().position(|s| s.id == slot_id) {
                if guard.slots[pos].color != SlotColor::Break {
                    guard.slots[pos].color = color;
                }
                if !touched.contains(&date) {
                    touched.push(date);
                }
            }
        }
        touched
    }

    pub(crate) async fn apply_item_deleted(&self, id: ItemId) -> Vec<NaiveDate> {
        self.items.remove(&id);
        self.apply_owner_slots_deleted(id).await
    }

    pub(crate) async fn apply_items_cleared(&self) -> Vec<NaiveDate> {
        let owners: Vec<ItemId> = self.items.iter().map(|e| *e.key()).collect();
        self.items.clear();
        let mut touched = Vec::new();
        for owner in owners {
            for date in self.apply_owner_slots_deleted(owner).await {
                if !touched.contains(&date) {
                    touched.push(date);
                }
            }
        }
        touched
    }

    /// Remove every slot owned by `owner`. Returns the dates touched.
    pub(crate) async fn apply_owner_slots_deleted(&self, owner: ItemId) -> Vec<NaiveDate> {
        let owned = self
            .owner_slots
            .remove(&owner)
            .map(|(_, ids)| ids)
            .unwrap_or_default();
        let mut touched = Vec::new();
        for slot_id in owned {
            let Some(date) = self.date_of_slot(&slot_id) else {
                continue;
            };
            let Some(day) = self.get_day(&date) else {
                continue;
            };
            let mut guard = day.write().await;
            if guard.remove_slot(&slot_id).is_some() {
                self.slot_dates.remove(&slot_id);
                if !touched.contains(&date) {
                    touched.push(date);
                }
            }
        }
        touched
    }

    /// Insert or full-record-replace a slot, handling moves across dates.
    pub(crate) async fn apply_slot_upsert(&self, slot: ScheduleSlot) {
        if let Some(prior_date) = self.date_of_slot(&slot.id)
            && let Some(day) = self.get_day(&prior_date)
        {
            let mut guard = day.write().await;
            self.detach_slot(&mut guard, &slot.id);
        }
        let day = self.day_entry(slot.date);
        let mut guard = day.write().await;
        self.attach_slot(&mut guard, slot);
    }

    pub(crate) async fn apply_slot_deleted(&self, id: &SlotId) -> Option<NaiveDate> {
        let date = self.date_of_slot(id)?;
        let day = self.get_day(&date)?;
        let mut guard = day.write().await;
        self.detach_slot(&mut guard, id)?;
        Some(date)
    }

    pub(crate) async fn apply_day_cleared(&self, date: NaiveDate) {
        let Some(day) = self.get_day(&date) else {
            return;
        };
        let mut guard = day.write().await;
        let ids: Vec<SlotId> = guard.slots.iter().map(|s| s.id).collect();
        for id in ids {
            self.detach_slot(&mut guard, &id);
        }
    }

    /// Insert a slot into a locked day and index it. Caller holds the lock.
    pub(crate) fn attach_slot(&self, day: &mut DayTimeline, slot: ScheduleSlot) {
        self.slot_dates.insert(slot.id, slot.date);
        self.owner_slots
            .entry(slot.owner_item_id)
            .or_default()
            .push(slot.id);
        day.insert_slot(slot);
    }

    /// Remove a slot from a locked day and unindex it. Caller holds the lock.
    pub(crate) fn detach_slot(&self, day: &mut DayTimeline, id: &SlotId) -> Option<ScheduleSlot> {
        let slot = day.remove_slot(id)?;
        self.slot_dates.remove(id);
        if let Some(mut owned) = self.owner_slots.get_mut(&slot.owner_item_id) {
            owned.retain(|s| s != id);
        }
        Some(slot)
    }
}
