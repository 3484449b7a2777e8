#![forbid(unsafe_code)]

use rigdeck_core::{BatchState, BatchTracker, ProgressView, QueueSnapshot};

fn q(pending: u64, in_progress: u64, completed: u64) -> QueueSnapshot {
    QueueSnapshot { pending, in_progress, completed, failed: 0, canceled: 0 }
}

#[test]
fn replay_two_batches_with_idle_gap() {
    let mut t = BatchTracker::new();

    // (reading, service_running, expected label)
    let ticks: Vec<(Option<QueueSnapshot>, bool, Option<&str>)> = vec![
        (Some(q(0, 0, 0)), true, None),
        (Some(q(3, 1, 0)), true, Some("0/4")),
        (Some(q(2, 1, 1)), true, Some("1/4")),
        (None, true, None),
        (Some(q(0, 1, 3)), true, Some("3/4")),
        (Some(q(0, 0, 4)), true, None),
        (Some(q(0, 0, 4)), true, None),
        (Some(q(1, 1, 4)), true, Some("0/2")),
        (Some(q(0, 1, 5)), true, Some("1/2")),
        (Some(q(0, 0, 6)), true, None),
    ];

    for (i, (reading, running, want)) in ticks.into_iter().enumerate() {
        let view = t.update(reading.as_ref(), running);
        assert_eq!(view.label().as_deref(), want, "tick {}", i);
    }
    assert_eq!(t.state(), BatchState::Idle);
}

#[test]
fn replay_service_restart_mid_batch() {
    let mut t = BatchTracker::new();
    t.update(Some(&q(5, 0, 20)), true);
    t.update(Some(&q(3, 1, 21)), true);

    // Service goes away and comes back with fresh counters.
    assert_eq!(t.update(None, false), ProgressView::HIDDEN);
    assert_eq!(t.state(), BatchState::Idle);

    let v = t.update(Some(&q(2, 1, 0)), true);
    assert_eq!(v, ProgressView { visible: true, processed: 0, total: 3 });
    let v = t.update(Some(&q(1, 0, 2)), true);
    assert_eq!(v.label().as_deref(), Some("2/3"));
}

/// Small deterministic generator so the walk is reproducible without extra deps.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

#[test]
fn processed_never_decreases_while_counters_grow() {
    for seed in 1..50u64 {
        let mut rng = Lcg(seed);
        let mut t = BatchTracker::new();
        let mut snap = QueueSnapshot::default();
        let mut last: Option<u64> = None;

        for _ in 0..200 {
            // Finish some active items, then maybe enqueue new ones.
            let finish = rng.next(snap.active() + 1);
            for _ in 0..finish {
                if snap.in_progress > 0 {
                    snap.in_progress -= 1;
                } else {
                    snap.pending -= 1;
                }
                match rng.next(3) {
                    0 => snap.completed += 1,
                    1 => snap.failed += 1,
                    _ => snap.canceled += 1,
                }
            }
            snap.pending += rng.next(3);
            if snap.pending > 0 && snap.in_progress == 0 {
                snap.pending -= 1;
                snap.in_progress = 1;
            }

            let view = t.update(Some(&snap), true);
            if view.visible {
                assert!(view.total > 0);
                if let Some(prev) = last {
                    assert!(view.processed >= prev, "seed {}: {} < {}", seed, view.processed, prev);
                }
                last = Some(view.processed);
            } else {
                assert_eq!(snap.active(), 0);
                assert!(!t.is_tracking());
                last = None;
            }
        }
    }
}
