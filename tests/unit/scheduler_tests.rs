use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use seckill::clock::{Clock, ManualClock};
use seckill::timing::{draw_lead_ms, Scheduler, TargetWindow, LEAD_CHOICES_MS};

#[test]
fn corrected_target_subtracts_lead() {
    let window = TargetWindow::new(10_000, 0, 100);
    assert_eq!(window.corrected_target_ms(), 9_900);
    assert!(!window.is_due(9_899));
    assert!(window.is_due(9_900));
}

#[test]
fn positive_offset_delays_local_firing() {
    // Local clock runs 300 ms ahead of the service clock.
    let window = TargetWindow::new(10_000, 300, 0);
    assert!(!window.is_due(10_000));
    assert!(window.is_due(10_300));
}

#[test]
fn drawn_lead_is_one_of_the_choices() {
    for _ in 0..100 {
        assert!(LEAD_CHOICES_MS.contains(&draw_lead_ms()));
    }
}

#[tokio::test]
async fn returns_immediately_when_already_due() {
    let clock = Arc::new(ManualClock::new(20_000));
    let scheduler = Scheduler::new(Arc::clone(&clock) as Arc<dyn Clock>);

    scheduler.wait_until(10_000, 0, 0).await;

    assert_eq!(clock.sleep_count(), 0);
    assert_eq!(clock.now_ms(), 20_000);
}

#[tokio::test]
async fn fires_at_first_poll_past_deadline() {
    let clock = Arc::new(ManualClock::new(0));
    let scheduler = Scheduler::new(Arc::clone(&clock) as Arc<dyn Clock>)
        .with_poll_interval(Duration::from_millis(50));

    scheduler.wait_until(1_000, 0, 100).await;

    assert_eq!(clock.now_ms(), 900);
    assert_eq!(clock.sleep_count(), 18);
}

#[tokio::test]
async fn never_fires_early_and_never_overshoots_a_poll() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let target = rng.gen_range(1_000_000..2_000_000_i64);
        let offset = rng.gen_range(-5_000..=5_000_i64);
        let lead = LEAD_CHOICES_MS[rng.gen_range(0..LEAD_CHOICES_MS.len())];
        let poll_ms = rng.gen_range(1..=100_i64);
        let start = target + offset - lead - rng.gen_range(1..20_000_i64);

        let clock = Arc::new(ManualClock::new(start));
        let scheduler = Scheduler::new(Arc::clone(&clock) as Arc<dyn Clock>)
            .with_poll_interval(Duration::from_millis(poll_ms.unsigned_abs()));
        scheduler.wait_until(target, offset, lead).await;

        let fired_service_ms = clock.now_ms() - offset;
        assert!(fired_service_ms >= target - lead, "fired early");
        assert!(fired_service_ms < target - lead + poll_ms, "overshot by a full poll");
    }
}

#[tokio::test]
async fn wait_for_uses_frozen_window() {
    let clock = Arc::new(ManualClock::new(5_000));
    let window = TargetWindow::new(5_120, -30, 50);
    let scheduler = Scheduler::new(Arc::clone(&clock) as Arc<dyn Clock>)
        .with_poll_interval(Duration::from_millis(10));

    scheduler.wait_for(&window).await;

    assert!(window.is_due(clock.now_ms()));
    assert_eq!(clock.now_ms(), 5_040);
}
