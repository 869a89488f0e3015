//! Hand-driven alarm clock.
//!
//! Time only moves when the test says so, and the alarm only fires on
//! [`ManualAlarmClock::fire`]. Clones share state: hand one to the engine
//! and keep one to drive it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;

use super::AlarmClock;

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    alarm: Option<DateTime<Utc>>,
    generation: u64,
    fired: Option<u64>,
}

#[derive(Clone)]
pub struct ManualAlarmClock {
    state: Arc<Mutex<ManualState>>,
    notify: Arc<Notify>,
}

impl ManualAlarmClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now,
                alarm: None,
                generation: 0,
                fired: None,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        // A panic while holding this lock is a test failure already.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_time(&self, now: DateTime<Utc>) {
        self.lock().now = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now += by;
    }

    /// The currently armed deadline, if any.
    pub fn alarm(&self) -> Option<DateTime<Utc>> {
        self.lock().alarm
    }

    /// Jump to the armed deadline and deliver the fire. Returns the deadline,
    /// or `None` (and delivers nothing) when the alarm is not armed.
    pub fn fire(&self) -> Option<DateTime<Utc>> {
        let at = {
            let mut state = self.lock();
            let at = state.alarm.take()?;
            state.now = at;
            state.fired = Some(state.generation);
            at
        };
        self.notify.notify_one();
        Some(at)
    }
}

impl AlarmClock for ManualAlarmClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }

    fn set_alarm(&mut self, at: DateTime<Utc>) {
        let mut state = self.lock();
        state.generation += 1;
        state.fired = None;
        state.alarm = Some(at);
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.generation += 1;
        state.fired = None;
        state.alarm = None;
    }

    fn fired(&mut self) -> impl Future<Output = DateTime<Utc>> + Send {
        let state = Arc::clone(&self.state);
        let notify = Arc::clone(&self.notify);
        async move {
            loop {
                {
                    let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
                    if guard.fired.take() == Some(guard.generation) {
                        guard.generation += 1;
                        return guard.now;
                    }
                }
                notify.notified().await;
            }
        }
    }
}
