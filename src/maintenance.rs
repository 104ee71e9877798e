use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::store::SlotStore;

/// Background task that rewrites the journal once enough appends pile up.
pub async fn run_compactor(store: Arc<SlotStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = store.journal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match store.compact_journal().await {
            Ok(()) => info!("compacted journal after {appends} appends"),
            Err(e) => tracing::warn!("journal compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::TimeSpan;
    use crate::store::SlotStore;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_journal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("timebox_test_maintenance");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compaction_resets_counter_and_preserves_state() {
        let path = test_journal_path(&format!("compact_{}.journal", Ulid::new()));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let store = SlotStore::open(path.clone()).await.unwrap();
        let item = store.capture_item("Write launch email").await.unwrap();
        // Churn: place and delete repeatedly, then keep one slot.
        for _ in 0..20 {
            let slot = store
                .place_item(item.id, date, TimeSpan::from_hm(9, 0, 10, 0))
                .await
                .unwrap();
            store.delete_slot(slot.id).await.unwrap();
        }
        let kept = store
            .place_item(item.id, date, TimeSpan::from_hm(9, 0, 10, 0))
            .await
            .unwrap();

        assert!(store.journal_appends_since_compact().await >= 40);
        store.compact_journal().await.unwrap();
        assert_eq!(store.journal_appends_since_compact().await, 0);

        // Reopened state matches: one item, one slot.
        let reopened = SlotStore::open(path.clone()).await.unwrap();
        assert_eq!(reopened.items().len(), 1);
        let slots = reopened.slots_for_date(date).await;
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].id, kept.id);

        let _ = std::fs::remove_file(&path);
    }
}
