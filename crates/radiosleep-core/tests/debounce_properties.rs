//! End-to-end debounce behaviour through a running daemon.
//!
//! Every test runs on a paused clock, so grace periods and stabilization
//! delays elapse virtually. Checks are placed 100 ms either side of each
//! deadline.

use std::time::Duration;

use pretty_assertions::assert_eq;
use radiosleep_test_utils::{MockRadio, RadioCall, TestConfigBuilder, TestDaemon};

fn five_and_two() -> TestConfigBuilder {
    TestConfigBuilder::new()
        .grace_period_ms(5_000)
        .stabilization_ms(2_000)
}

async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[test_log::test(tokio::test(start_paused = true))]
async fn wake_at_three_seconds_cancels_disable_and_checks_at_five() {
    let daemon = TestDaemon::start(five_and_two(), MockRadio::enabled()).await;

    daemon.events.sleep().await;
    advance_ms(3_000).await;
    daemon.events.wake().await;

    advance_ms(1_900).await;
    assert_eq!(daemon.radio.calls(), vec![]);

    advance_ms(200).await;
    assert_eq!(daemon.radio.calls(), vec![RadioCall::Query]);

    advance_ms(10_000).await;
    assert_eq!(daemon.radio.disable_calls(), 0);

    let status = daemon.stop().await.unwrap();
    assert_eq!(status.timers_armed, 1);
    assert_eq!(status.timers_cancelled, 1);
    assert_eq!(status.timers_fired, 0);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn no_wake_disables_exactly_once_at_grace_period() {
    let daemon = TestDaemon::start(five_and_two(), MockRadio::enabled()).await;

    daemon.events.sleep().await;
    advance_ms(4_900).await;
    assert_eq!(daemon.radio.calls(), vec![]);

    advance_ms(200).await;
    assert_eq!(
        daemon.radio.calls(),
        vec![RadioCall::Query, RadioCall::Disable]
    );
    assert!(!daemon.radio.is_on());

    advance_ms(30_000).await;
    assert_eq!(daemon.radio.disable_calls(), 1);

    let status = daemon.stop().await.unwrap();
    assert!(status.disabled_after_delay);
    assert_eq!(status.disables, 1);
}

#[tokio::test(start_paused = true)]
async fn radio_already_off_is_left_alone() {
    let daemon = TestDaemon::start(five_and_two(), MockRadio::disabled()).await;

    daemon.events.sleep().await;
    advance_ms(5_100).await;
    assert_eq!(daemon.radio.calls(), vec![RadioCall::Query]);

    let status = daemon.stop().await.unwrap();
    assert!(!status.disabled_after_delay);
    assert_eq!(status.disables, 0);
}

#[tokio::test(start_paused = true)]
async fn repeated_sleep_restarts_the_grace_period() {
    let daemon = TestDaemon::start(five_and_two(), MockRadio::enabled()).await;

    daemon.events.sleep().await;
    advance_ms(3_000).await;
    daemon.events.sleep().await;

    // The first sleep's deadline passes without a disable.
    advance_ms(2_100).await;
    assert_eq!(daemon.radio.disable_calls(), 0);

    advance_ms(3_000).await;
    assert_eq!(daemon.radio.disable_calls(), 1);

    let status = daemon.stop().await.unwrap();
    assert_eq!(status.timers_armed, 2);
    assert_eq!(status.timers_cancelled, 1);
    assert_eq!(status.timers_fired, 1);
    assert_eq!(status.timers_in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn wake_after_disable_re_enables_and_clears_marker() {
    let daemon = TestDaemon::start(five_and_two(), MockRadio::enabled()).await;

    daemon.events.sleep().await;
    advance_ms(6_000).await;
    assert!(!daemon.radio.is_on());

    daemon.events.wake().await;
    advance_ms(2_100).await;
    assert!(daemon.radio.is_on());
    assert_eq!(
        daemon.radio.calls(),
        vec![
            RadioCall::Query,
            RadioCall::Disable,
            RadioCall::Query,
            RadioCall::Enable
        ]
    );

    let status = daemon.stop().await.unwrap();
    assert!(!status.disabled_after_delay);
    assert_eq!(status.enables, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_disable_is_not_retried() {
    let radio = MockRadio::enabled();
    radio.fail_disable(true);
    let daemon = TestDaemon::start(five_and_two(), radio).await;

    daemon.events.sleep().await;
    advance_ms(30_000).await;
    assert_eq!(daemon.radio.disable_calls(), 1);
    assert!(daemon.radio.is_on());

    let status = daemon.stop().await.unwrap();
    assert_eq!(status.toggle_failures, 1);
    assert!(!status.disabled_after_delay);
}

#[tokio::test(start_paused = true)]
async fn failed_enable_is_not_retried() {
    let radio = MockRadio::disabled();
    radio.fail_enable(true);
    let daemon = TestDaemon::start(five_and_two(), radio).await;

    daemon.events.sleep().await;
    advance_ms(6_000).await;
    daemon.events.wake().await;
    advance_ms(2_100).await;
    assert_eq!(
        daemon.radio.calls(),
        vec![RadioCall::Query, RadioCall::Query, RadioCall::Enable]
    );
    assert!(!daemon.radio.is_on());

    advance_ms(30_000).await;
    assert_eq!(daemon.radio.enable_calls(), 1);

    let status = daemon.stop().await.unwrap();
    assert_eq!(status.toggle_failures, 1);
    assert_eq!(status.enables, 0);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn wake_queued_when_grace_deadline_passes_still_cancels_disable() {
    let radio = MockRadio::enabled();
    // Keeps the machine inside an enable check from 2 s until 6 s.
    radio.set_query_delay(Duration::from_secs(4));
    let daemon = TestDaemon::start(five_and_two(), radio).await;

    daemon.events.wake().await;
    daemon.events.sleep().await;
    advance_ms(3_000).await;
    // Queued while the machine is busy; the 5 s deadline passes before it
    // gets a look.
    daemon.events.wake().await;

    advance_ms(30_000).await;
    assert_eq!(daemon.radio.disable_calls(), 0);
    assert!(daemon.radio.is_on());

    let status = daemon.stop().await.unwrap();
    assert_eq!(status.timers_armed, 1);
    assert_eq!(status.timers_cancelled, 1);
    assert_eq!(status.timers_fired, 0);
    assert_eq!(status.wakes, 2);
}

#[tokio::test(start_paused = true)]
async fn no_toggles_after_shutdown() {
    let daemon = TestDaemon::start(five_and_two(), MockRadio::enabled()).await;
    let radio = daemon.radio.clone();
    let pid_path = daemon.pid_path();

    daemon.events.sleep().await;
    advance_ms(1_000).await;
    let status = daemon.stop().await.unwrap();
    assert_eq!(status.timers_cancelled, 1);
    assert!(!pid_path.exists());

    advance_ms(30_000).await;
    assert_eq!(radio.calls(), vec![]);
}
