use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::limits::NOTIFY_CHANNEL_CAPACITY;
use crate::model::Event;

/// Broadcast hub fanning out committed mutations to live subscribers.
///
/// One channel per calendar date plus a single channel for item-level
/// changes. Subscribing is cheap; sending with no subscribers is a no-op.
pub struct NotifyHub {
    channels: DashMap<NaiveDate, broadcast::Sender<Event>>,
    items: broadcast::Sender<Event>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            items: broadcast::channel(NOTIFY_CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to notifications for a date. Creates the channel if needed.
    pub fn subscribe(&self, date: NaiveDate) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(date)
            .or_insert_with(|| broadcast::channel(NOTIFY_CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Subscribe to item-level notifications (capture, priority, delete).
    pub fn subscribe_items(&self) -> broadcast::Receiver<Event> {
        self.items.subscribe()
    }

    /// Send a date-scoped notification. No-op if nobody is listening.
    pub fn send(&self, date: NaiveDate, event: &Event) {
        if let Some(sender) = self.channels.get(&date) {
            let _ = sender.send(event.clone());
        }
    }

    /// Send an item-level notification. No-op if nobody is listening.
    pub fn send_items(&self, event: &Event) {
        let _ = self.items.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(date());

        let event = Event::DayCleared { date: date() };
        hub.send(date(), &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber — should not panic
        hub.send(date(), &Event::DayCleared { date: date() });
        hub.send_items(&Event::ItemDeleted { id: 1 });
    }

    #[tokio::test]
    async fn item_channel_is_separate() {
        let hub = NotifyHub::new();
        let mut day_rx = hub.subscribe(date());
        let mut item_rx = hub.subscribe_items();

        hub.send_items(&Event::ItemDeleted { id: 1 });

        assert_eq!(item_rx.recv().await.unwrap(), Event::ItemDeleted { id: 1 });
        assert!(day_rx.try_recv().is_err());
    }
}
