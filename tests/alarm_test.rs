//! The tokio-backed alarm, on a paused runtime so long sleeps finish at once.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use disco_rs::clock::{Alarm, AlarmClock, SystemAlarmClock};
use proptest::prelude::*;

/// Longer than any arm in these tests.
const NEVER: StdDuration = StdDuration::from_secs(10 * 24 * 3600);

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn past_deadline_fires_immediately() {
    let mut alarm = Alarm::new();
    let at = Utc::now() - Duration::hours(1);
    alarm.arm(at);

    assert_eq!(alarm.fired().await, at);
    // A fire disarms.
    assert!(tokio::time::timeout(NEVER, alarm.fired()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn rearming_replaces_the_earlier_arm() {
    let mut alarm = Alarm::new();
    let later = Utc::now() + Duration::seconds(30);
    alarm.arm(Utc::now() + Duration::seconds(1));
    alarm.arm(later);

    assert_eq!(alarm.fired().await, later);
    assert!(tokio::time::timeout(NEVER, alarm.fired()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn stopped_alarm_never_fires() {
    let mut alarm = Alarm::new();
    alarm.arm(Utc::now() - Duration::seconds(1));
    // Give the timer task a chance to deliver before stopping.
    tokio::task::yield_now().await;
    alarm.stop();
    alarm.stop();

    assert!(tokio::time::timeout(NEVER, alarm.fired()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn system_clock_goes_through_the_alarm() {
    let mut clock = SystemAlarmClock::new();
    let at = clock.now() + Duration::minutes(5);
    clock.set_alarm(at);
    assert_eq!(clock.fired().await, at);

    clock.set_alarm(at);
    clock.stop();
    assert!(tokio::time::timeout(NEVER, clock.fired()).await.is_err());
}

#[derive(Debug, Clone)]
enum Op {
    Arm(i64),
    Stop,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-60i64..3600).prop_map(Op::Arm),
        Just(Op::Stop),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Only the last arm can fire, and only if nothing stopped it since.
    #[test]
    fn last_arm_wins(ops in proptest::collection::vec(op(), 1..12)) {
        let runtime = paused_runtime();
        runtime.block_on(async {
            let mut alarm = Alarm::new();
            let base = Utc::now();
            let mut expected = None;
            for op in &ops {
                match *op {
                    Op::Arm(secs) => {
                        let at = base + Duration::seconds(secs);
                        alarm.arm(at);
                        expected = Some(at);
                    }
                    Op::Stop => {
                        alarm.stop();
                        expected = None;
                    }
                }
                tokio::task::yield_now().await;
            }

            let fired = tokio::time::timeout(NEVER, alarm.fired()).await.ok();
            prop_assert_eq!(fired, expected);
            Ok(())
        })?;
    }
}
