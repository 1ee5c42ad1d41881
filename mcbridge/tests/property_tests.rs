//! Property-based tests for ordering, capacity, sampling and snapshots

use mcbridge::queue::{sampling_period, Admission};
use mcbridge::{Priority, PriorityHeap, PushOutcome, StateDelta, StateSynchronizer, StateValidator};
use proptest::prelude::*;
use serde_json::json;
use tokio::time::Instant;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: pops come out by descending priority, FIFO within a priority.
    #[test]
    fn prop_heap_pops_by_priority_then_arrival(
        priorities in prop::collection::vec(-5_i32..120, 0..200)
    ) {
        let mut heap = PriorityHeap::with_capacity(usize::MAX);
        let now = Instant::now();
        for (index, value) in priorities.iter().enumerate() {
            let admitted = matches!(
                heap.push((*value, index), Priority::new(*value), now),
                PushOutcome::Admitted
            );
            prop_assert!(admitted);
        }

        let popped: Vec<(i32, usize)> = std::iter::from_fn(|| heap.pop()).collect();
        prop_assert_eq!(popped.len(), priorities.len());
        for pair in popped.windows(2) {
            let (first, second) = (pair[0], pair[1]);
            prop_assert!(first.0 >= second.0);
            if first.0 == second.0 {
                prop_assert!(first.1 < second.1);
            }
        }
    }

    /// Property: a full heap keeps the most urgent entries.
    #[test]
    fn prop_capacity_keeps_highest_priorities(
        priorities in prop::collection::vec(0_i32..100, 1..100),
        capacity in 1_usize..20
    ) {
        let mut heap = PriorityHeap::with_capacity(capacity);
        let now = Instant::now();
        for value in &priorities {
            let _ = heap.push(*value, Priority::new(*value), now);
        }
        prop_assert!(heap.len() <= capacity);

        let mut kept: Vec<i32> = std::iter::from_fn(|| heap.pop()).collect();
        let mut expected = priorities.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        expected.truncate(kept.len());
        kept.sort_unstable_by(|a, b| b.cmp(a));
        prop_assert_eq!(kept, expected);
    }

    /// Property: sampling keeps exactly every `round(1 / rate)`th event.
    #[test]
    fn prop_sampling_is_exact(rate in 0.01_f64..1.0, calls in 0_u64..500) {
        let mut admission = Admission::new(100);
        let kept = (0..calls)
            .filter(|_| admission.should_sample("minecraft:position", rate))
            .count() as u64;
        prop_assert_eq!(kept, calls / sampling_period(rate));
    }

    /// Property: restoring a snapshot discards every later change.
    #[test]
    fn prop_snapshot_round_trip(
        before in prop::collection::btree_map("[a-z]{1,6}", -1000_i64..1000, 1..10),
        after in prop::collection::btree_map("[a-z]{1,6}", -1000_i64..1000, 1..10)
    ) {
        let runtime = runtime();
        runtime.block_on(async {
            let sync = StateSynchronizer::builder()
                .with_validator(StateValidator::new())
                .build();

            let first: StateDelta = before
                .iter()
                .map(|(key, value)| (format!("world.{}", key), json!(value)))
                .collect();
            prop_assert!(sync.apply_delta(&first, None, "test").await);
            let snapshot = sync.take_snapshot().await;

            let second: StateDelta = after
                .iter()
                .map(|(key, value)| (format!("other.{}", key), json!(value)))
                .collect();
            prop_assert!(sync.apply_delta(&second, None, "test").await);
            prop_assert!(sync.get("other").await.is_some());

            prop_assert!(sync.restore_from_snapshot(&snapshot).await);
            prop_assert_eq!(sync.current_state().await, snapshot.state.clone());
            prop_assert!(sync.get("other").await.is_none());
            Ok(())
        })?;
    }
}
