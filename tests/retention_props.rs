// Property tests for the retention cutoff semantics: an event survives a
// cleanup pass if and only if its timestamp is at or after the cutoff.

use academyd::store::Storage;
use proptest::prelude::*;

fn run_case(timestamps: Vec<i64>, cutoff: i64) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();

        for (i, ts) in timestamps.iter().enumerate() {
            storage
                .insert_event("page_view", Some(&format!("u{i}")), *ts, None)
                .await
                .unwrap();
        }

        let expected_deleted = timestamps.iter().filter(|t| **t < cutoff).count() as u64;
        let deleted = storage.delete_events_before(cutoff).await.unwrap();
        assert_eq!(deleted, expected_deleted);

        let remaining = storage.event_timestamps().await.unwrap();
        assert_eq!(
            remaining.len(),
            timestamps.len() - expected_deleted as usize
        );
        for ts in remaining {
            assert!(ts >= cutoff, "event at {ts} survived cutoff {cutoff}");
        }
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn events_survive_iff_at_or_after_cutoff(
        timestamps in prop::collection::vec(0i64..2_000_000_000, 0..40),
        cutoff in 0i64..2_000_000_000,
    ) {
        run_case(timestamps, cutoff);
    }

    #[test]
    fn cutoff_boundary_is_exclusive_for_survivors(
        ts in 1i64..2_000_000_000,
    ) {
        // An event exactly at the cutoff survives; one just below does not.
        run_case(vec![ts, ts - 1], ts);
    }
}
