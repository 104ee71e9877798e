use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use ulid::Ulid;

use timebox_core::{SlotStore, TimeSpan};

const DATES: u64 = 30;
const SLOTS_PER_DATE: u16 = 48; // full day of 30-minute blocks

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

#[tokio::main]
async fn main() {
    timebox_core::observability::init(
        std::env::var("TIMEBOX_METRICS_PORT")
            .ok()
            .and_then(|s| s.parse().ok()),
    );

    let dir = std::env::temp_dir().join(format!("timebox_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let journal = dir.join("stress.journal");

    let store = SlotStore::open(journal).await.expect("open store");
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

    println!("timebox-core stress: {DATES} dates x {SLOTS_PER_DATE} slots");

    // Capture the backlog.
    let mut capture_lat = Vec::new();
    let mut item_ids = Vec::new();
    for i in 0..200 {
        let start = Instant::now();
        let item = store
            .capture_item(format!("task {i}"))
            .await
            .expect("capture");
        capture_lat.push(start.elapsed());
        item_ids.push(item.id);
    }
    print_latency("capture_item", &mut capture_lat);

    // Conflict-free placements on a 30-minute grid.
    let mut place_lat = Vec::new();
    for day in 0..DATES {
        let date = base.checked_add_days(Days::new(day)).unwrap();
        for block in 0..SLOTS_PER_DATE {
            let span = TimeSpan::new(block * 30, block * 30 + 30);
            let item = item_ids[(block as usize + day as usize) % item_ids.len()];
            let start = Instant::now();
            store.place_item(item, date, span).await.expect("place");
            place_lat.push(start.elapsed());
        }
    }
    print_latency("place_item", &mut place_lat);

    // Every further placement on the grid now conflicts.
    let mut conflict_lat = Vec::new();
    for day in 0..DATES {
        let date = base.checked_add_days(Days::new(day)).unwrap();
        let start = Instant::now();
        let taken = store
            .is_available(date, TimeSpan::new(600, 660))
            .await
            .expect("availability");
        conflict_lat.push(start.elapsed());
        assert!(!taken);
    }
    print_latency("is_available (taken)", &mut conflict_lat);

    // Snapshot reads.
    let mut read_lat = Vec::new();
    for day in 0..DATES {
        let date = base.checked_add_days(Days::new(day)).unwrap();
        let start = Instant::now();
        let slots = store.slots_for_date(date).await;
        read_lat.push(start.elapsed());
        assert_eq!(slots.len(), SLOTS_PER_DATE as usize);
    }
    print_latency("slots_for_date", &mut read_lat);

    // Compaction after the churn above.
    let start = Instant::now();
    store.compact_journal().await.expect("compact");
    println!(
        "  compact_journal: {:.2}ms",
        start.elapsed().as_secs_f64() * 1000.0
    );

    let _ = std::fs::remove_dir_all(&dir);
}
