// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Real-time and static `Clock` implementations.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use meridian_core::{
    AtomicTime, MUTEX_POISONED, UUID4, UnixNanos,
    correctness::{
        check_positive_u64, check_predicate_false, check_predicate_true, check_valid_string,
    },
    nanos::DurationNanos,
    time::get_atomic_clock_realtime,
};
use ustr::Ustr;

use crate::timer::{
    LiveTimer, TestTimer, TimeEvent, TimeEventCallback, TimeEventHandler, TimerTrampoline,
    create_valid_interval,
};

/// Represents a type of clock.
///
/// A registry of labeled timers and their handlers, a provider of "now", and
/// the coordinator of timer cancellation and teardown.
///
/// # Notes
///
/// An active timer is one which is registered and has not yet expired.
pub trait Clock: Debug {
    /// Returns the current date and time as a timezone-aware `DateTime<Utc>`.
    fn utc_now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp_ns().as_i64())
    }

    /// Returns the current UNIX timestamp in nanoseconds (ns).
    fn timestamp_ns(&self) -> UnixNanos;

    /// Returns the current UNIX timestamp in microseconds (μs).
    fn timestamp_us(&self) -> u64;

    /// Returns the current UNIX timestamp in milliseconds (ms).
    fn timestamp_ms(&self) -> u64;

    /// Returns the current UNIX timestamp in seconds.
    fn timestamp(&self) -> f64;

    /// Returns the nanoseconds elapsed between the clock's current time and `ts_ns`
    /// (zero if `ts_ns` is in the future).
    fn delta_ns(&self, ts_ns: UnixNanos) -> DurationNanos {
        self.timestamp_ns().duration_since(&ts_ns).unwrap_or_default()
    }

    /// Returns a snapshot of the labels of active timers in the clock.
    fn timer_labels(&self) -> Vec<Ustr>;

    /// Returns the count of active timers in the clock.
    fn timer_count(&self) -> usize;

    /// Returns whether any timer is currently registered.
    fn has_timers(&self) -> bool {
        self.timer_count() > 0
    }

    /// Returns the earliest due time across all registered timers,
    /// or `None` when no timer is registered.
    fn next_event_time_ns(&self) -> Option<UnixNanos>;

    /// Returns whether this clock is a deterministic test clock.
    fn is_test_clock(&self) -> bool;

    /// Registers a default event handler for the clock. If a timer is set
    /// without its own handler, then this handler is used.
    fn register_default_handler(&mut self, callback: TimeEventCallback);

    /// Sets a timer to alert exactly once at the specified time. The optional
    /// callback (or the default handler when omitted) handles the generated event.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the registry untouched, if:
    /// - `name` is not a valid string.
    /// - `name` is already registered with this clock.
    /// - `alert_time_ns` is in the past (the current time is accepted).
    /// - No callback was given and no default handler is registered.
    fn set_time_alert_ns(
        &mut self,
        name: &str,
        alert_time_ns: UnixNanos,
        callback: Option<TimeEventCallback>,
    ) -> anyhow::Result<()>;

    /// Sets a timer to fire time events at every interval between the start
    /// and stop time. The optional callback (or the default handler when
    /// omitted) handles the generated events.
    ///
    /// A missing `start_time_ns` defaults to the current time. An explicit
    /// `start_time_ns` may lie in the past, supporting interval-aligned
    /// schedules; on a live clock any already-due fire is clamped to now.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the registry untouched, if:
    /// - `name` is not a valid string.
    /// - `name` is already registered with this clock.
    /// - `interval_ns` is not positive.
    /// - `stop_time_ns` is given and does not lie at least one interval after
    ///   the start time.
    /// - No callback was given and no default handler is registered.
    fn set_timer_ns(
        &mut self,
        name: &str,
        interval_ns: u64,
        start_time_ns: Option<UnixNanos>,
        stop_time_ns: Option<UnixNanos>,
        callback: Option<TimeEventCallback>,
    ) -> anyhow::Result<()>;

    /// Cancels the timer with `name`, removing it and its handler.
    ///
    /// An unknown label logs a warning and returns normally.
    fn cancel_timer(&mut self, name: &str);

    /// Cancels all timers, iterating a snapshot of the current labels.
    fn cancel_timers(&mut self);
}

/// A static test clock.
///
/// Stores the current timestamp internally which is advanced only through
/// [`TestClock::advance_time`] (or overwritten via `set_time` for test
/// initialization). All time progression and event delivery happen inside the
/// caller's invocation, making runs deterministic and replayable.
#[derive(Debug)]
pub struct TestClock {
    time: AtomicTime,
    // Btree map ensures stable ordering when scanning timers in `advance_time`
    timers: BTreeMap<Ustr, TestTimer>,
    callbacks: HashMap<Ustr, TimeEventCallback>,
    default_callback: Option<TimeEventCallback>,
    next_event_time_ns: Option<UnixNanos>,
}

impl TestClock {
    /// Creates a new [`TestClock`] instance at the UNIX epoch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            time: AtomicTime::new(false, UnixNanos::default()),
            timers: BTreeMap::new(),
            callbacks: HashMap::new(),
            default_callback: None,
            next_event_time_ns: None,
        }
    }

    /// Returns a reference to the internal timers for the clock.
    #[must_use]
    pub const fn get_timers(&self) -> &BTreeMap<Ustr, TestTimer> {
        &self.timers
    }

    /// Advances the internal clock to `to_time_ns`, returning every generated
    /// [`TimeEvent`] paired with its registered handler, sorted ascending by
    /// `(ts_event, name)` so interleaving timers produce a globally ordered
    /// stream.
    ///
    /// When no timer is due at or before `to_time_ns` this is a no-op: the
    /// internal clock time is deliberately left untouched so callers can
    /// probe a target time cheaply. Calling again with the same `to_time_ns`
    /// returns nothing further.
    ///
    /// # Panics
    ///
    /// Panics if `to_time_ns` is less than the current internal clock time.
    pub fn advance_time(&mut self, to_time_ns: UnixNanos) -> Vec<TimeEventHandler> {
        // Time should be non-decreasing
        assert!(
            to_time_ns >= self.time.get_time_ns(),
            "`to_time_ns` {to_time_ns} was < `self.time.get_time_ns()` {}",
            self.time.get_time_ns()
        );

        match self.next_event_time_ns {
            Some(next_time_ns) if to_time_ns >= next_time_ns => {}
            _ => return Vec::new(), // Nothing due, clock time untouched
        }

        // Harvest due events from a scan over the current timers, pairing each
        // with the handler registered at harvest time. Only retain alive timers.
        let mut handlers: Vec<TimeEventHandler> = Vec::new();
        let callbacks = &self.callbacks;
        self.timers.retain(|name, timer| {
            for event in timer.advance(to_time_ns) {
                let callback = callbacks
                    .get(name)
                    .cloned()
                    .expect("registered timer should have a handler");
                handlers.push(TimeEventHandler::new(event, callback));
            }

            !timer.is_expired()
        });

        let timers = &self.timers;
        self.callbacks.retain(|name, _| timers.contains_key(name));

        self.update_next_event_time();
        self.time.set_time(to_time_ns);

        handlers.sort();
        handlers
    }

    fn update_next_event_time(&mut self) {
        self.next_event_time_ns = self.timers.values().map(TestTimer::next_time_ns).min();
    }
}

impl Default for TestClock {
    /// Creates a new default [`TestClock`] instance.
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TestClock {
    type Target = AtomicTime;

    fn deref(&self) -> &Self::Target {
        &self.time
    }
}

impl Clock for TestClock {
    fn timestamp_ns(&self) -> UnixNanos {
        self.time.get_time_ns()
    }

    fn timestamp_us(&self) -> u64 {
        self.time.get_time_us()
    }

    fn timestamp_ms(&self) -> u64 {
        self.time.get_time_ms()
    }

    fn timestamp(&self) -> f64 {
        self.time.get_time()
    }

    fn timer_labels(&self) -> Vec<Ustr> {
        self.timers.keys().copied().collect()
    }

    fn timer_count(&self) -> usize {
        self.timers.len()
    }

    fn next_event_time_ns(&self) -> Option<UnixNanos> {
        self.next_event_time_ns
    }

    fn is_test_clock(&self) -> bool {
        true
    }

    fn register_default_handler(&mut self, callback: TimeEventCallback) {
        self.default_callback = Some(callback);
    }

    fn set_time_alert_ns(
        &mut self,
        name: &str,
        alert_time_ns: UnixNanos,
        callback: Option<TimeEventCallback>,
    ) -> anyhow::Result<()> {
        check_valid_string(name, stringify!(name))?;
        let name = Ustr::from(name);
        check_predicate_false(
            self.timers.contains_key(&name),
            &format!("Timer '{name}' already exists"),
        )?;

        let ts_now = self.time.get_time_ns();
        check_predicate_true(
            alert_time_ns >= ts_now,
            &format!(
                "Timer '{name}' alert time {} was in the past (current time is {})",
                alert_time_ns.to_rfc3339(),
                ts_now.to_rfc3339(),
            ),
        )?;

        let callback = callback
            .or_else(|| self.default_callback.clone())
            .ok_or_else(|| anyhow::anyhow!("No callbacks provided"))?;

        let timer = TestTimer::new_alert(name, alert_time_ns, ts_now);
        self.timers.insert(name, timer);
        self.callbacks.insert(name, callback);
        self.update_next_event_time();

        Ok(())
    }

    fn set_timer_ns(
        &mut self,
        name: &str,
        interval_ns: u64,
        start_time_ns: Option<UnixNanos>,
        stop_time_ns: Option<UnixNanos>,
        callback: Option<TimeEventCallback>,
    ) -> anyhow::Result<()> {
        check_valid_string(name, stringify!(name))?;
        check_positive_u64(interval_ns, stringify!(interval_ns))?;
        let name = Ustr::from(name);
        check_predicate_false(
            self.timers.contains_key(&name),
            &format!("Timer '{name}' already exists"),
        )?;

        // An explicit start time may lie in the past (historical schedules)
        let start_time_ns = start_time_ns.unwrap_or_else(|| self.time.get_time_ns());
        if let Some(stop_time_ns) = stop_time_ns {
            check_predicate_true(
                start_time_ns < stop_time_ns,
                &format!(
                    "Timer '{name}' stop time {} must be after start time {}",
                    stop_time_ns.to_rfc3339(),
                    start_time_ns.to_rfc3339(),
                ),
            )?;
            check_predicate_true(
                start_time_ns + interval_ns <= stop_time_ns,
                &format!(
                    "Timer '{name}' stop time {} must be at least one interval after start time {}",
                    stop_time_ns.to_rfc3339(),
                    start_time_ns.to_rfc3339(),
                ),
            )?;
        }

        let callback = callback
            .or_else(|| self.default_callback.clone())
            .ok_or_else(|| anyhow::anyhow!("No callbacks provided"))?;

        let interval_ns = create_valid_interval(interval_ns);
        let timer = TestTimer::new(name, interval_ns, start_time_ns, stop_time_ns);
        self.timers.insert(name, timer);
        self.callbacks.insert(name, callback);
        self.update_next_event_time();

        Ok(())
    }

    fn cancel_timer(&mut self, name: &str) {
        let name = Ustr::from(name);
        match self.timers.remove(&name) {
            Some(mut timer) => {
                timer.cancel();
                self.callbacks.remove(&name);
                self.update_next_event_time();
            }
            None => log::warn!("Cannot cancel timer '{name}': not found"),
        }
    }

    fn cancel_timers(&mut self) {
        for name in self.timer_labels() {
            self.cancel_timer(name.as_str());
        }
    }
}

#[derive(Debug)]
struct LiveClockInner {
    timers: HashMap<Ustr, LiveTimer>,
    callbacks: HashMap<Ustr, TimeEventCallback>,
    default_callback: Option<TimeEventCallback>,
    next_event_time_ns: Option<UnixNanos>,
}

impl LiveClockInner {
    fn update_next_event_time(&mut self) {
        self.next_event_time_ns = self.timers.values().map(LiveTimer::next_time_ns).min();
    }
}

/// One-shot trampoline run by a live timer's fire task.
///
/// Unregisters the timer and its handler under the registry lock *before*
/// dispatching, so a panicking handler cannot prevent cleanup. A label no
/// longer in the registry lost the race to `cancel_timer` and dispatches
/// nothing.
fn raise_time_event(
    inner: &Mutex<LiveClockInner>,
    time: &'static AtomicTime,
    name: Ustr,
    event_time_ns: UnixNanos,
) {
    let callback = {
        let mut inner = inner.lock().expect(MUTEX_POISONED);
        if inner.timers.remove(&name).is_none() {
            return;
        }
        let callback = inner.callbacks.remove(&name);
        inner.update_next_event_time();
        callback
    };

    if let Some(callback) = callback {
        let event = TimeEvent::new(name, UUID4::new(), event_time_ns, time.get_time_ns());
        callback.call(event);
    }
}

/// Repeating trampoline run by a live timer's fire task.
///
/// Under the registry lock: a fire at or past the stop time unregisters the
/// timer and its handler, otherwise the timer iterates to its next due time
/// and re-arms. The handler is resolved at fire time and always invoked
/// outside the lock, so a handler may itself set or cancel timers.
fn raise_time_event_repeating(
    inner: &Mutex<LiveClockInner>,
    time: &'static AtomicTime,
    name: Ustr,
    event_time_ns: UnixNanos,
) {
    let callback = {
        let mut guard = inner.lock().expect(MUTEX_POISONED);
        let inner = &mut *guard;
        let Some(timer) = inner.timers.get_mut(&name) else {
            return; // Cancelled while this fire was in flight
        };

        let callback = if timer.stop_time_ns.is_some_and(|stop| event_time_ns >= stop) {
            inner.timers.remove(&name);
            inner.callbacks.remove(&name)
        } else {
            timer.iterate_next();
            timer.repeat(time.get_time_ns());
            inner.callbacks.get(&name).cloned()
        };
        inner.update_next_event_time();
        callback
    };

    if let Some(callback) = callback {
        let event = TimeEvent::new(name, UUID4::new(), event_time_ns, time.get_time_ns());
        callback.call(event);
    }
}

/// A real-time clock which uses system time.
///
/// Timestamps are guaranteed to be unique and monotonically increasing.
/// Timer fires run on the shared Tokio runtime; the registries are shared
/// with those fire tasks behind a single lock, and handlers always execute
/// outside the lock.
#[derive(Debug)]
pub struct LiveClock {
    time: &'static AtomicTime,
    inner: Arc<Mutex<LiveClockInner>>,
}

impl LiveClock {
    /// Creates a new [`LiveClock`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            time: get_atomic_clock_realtime(),
            inner: Arc::new(Mutex::new(LiveClockInner {
                timers: HashMap::new(),
                callbacks: HashMap::new(),
                default_callback: None,
                next_event_time_ns: None,
            })),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, LiveClockInner> {
        self.inner.lock().expect(MUTEX_POISONED)
    }

    fn one_shot_trampoline(&self) -> TimerTrampoline {
        let inner = Arc::clone(&self.inner);
        let time = self.time;
        Arc::new(move |name, event_time_ns| raise_time_event(&inner, time, name, event_time_ns))
    }

    fn repeating_trampoline(&self) -> TimerTrampoline {
        let inner = Arc::clone(&self.inner);
        let time = self.time;
        Arc::new(move |name, event_time_ns| {
            raise_time_event_repeating(&inner, time, name, event_time_ns);
        })
    }
}

impl Default for LiveClock {
    /// Creates a new default [`LiveClock`] instance.
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LiveClock {
    /// Tears the clock down, cancelling all timers and releasing their
    /// pending fire tasks.
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

impl Clock for LiveClock {
    fn timestamp_ns(&self) -> UnixNanos {
        self.time.get_time_ns()
    }

    fn timestamp_us(&self) -> u64 {
        self.time.get_time_us()
    }

    fn timestamp_ms(&self) -> u64 {
        self.time.get_time_ms()
    }

    fn timestamp(&self) -> f64 {
        self.time.get_time()
    }

    fn timer_labels(&self) -> Vec<Ustr> {
        self.lock_inner().timers.keys().copied().collect()
    }

    fn timer_count(&self) -> usize {
        self.lock_inner().timers.len()
    }

    fn next_event_time_ns(&self) -> Option<UnixNanos> {
        self.lock_inner().next_event_time_ns
    }

    fn is_test_clock(&self) -> bool {
        false
    }

    fn register_default_handler(&mut self, callback: TimeEventCallback) {
        self.lock_inner().default_callback = Some(callback);
    }

    fn set_time_alert_ns(
        &mut self,
        name: &str,
        alert_time_ns: UnixNanos,
        callback: Option<TimeEventCallback>,
    ) -> anyhow::Result<()> {
        check_valid_string(name, stringify!(name))?;
        let name = Ustr::from(name);
        let ts_now = self.time.get_time_ns();

        let trampoline = self.one_shot_trampoline();

        // Hold the registry lock for the whole registration so an immediately
        // due fire cannot run its trampoline before the timer is registered
        let mut inner = self.lock_inner();
        check_predicate_false(
            inner.timers.contains_key(&name),
            &format!("Timer '{name}' already exists"),
        )?;
        check_predicate_true(
            alert_time_ns >= ts_now,
            &format!(
                "Timer '{name}' alert time {} was in the past (current time is {})",
                alert_time_ns.to_rfc3339(),
                ts_now.to_rfc3339(),
            ),
        )?;
        let callback = callback
            .or_else(|| inner.default_callback.clone())
            .ok_or_else(|| anyhow::anyhow!("No callbacks provided"))?;

        let mut timer = LiveTimer::new_alert(name, alert_time_ns, ts_now, trampoline);
        timer.start(ts_now);

        inner.timers.insert(name, timer);
        inner.callbacks.insert(name, callback);
        inner.update_next_event_time();

        Ok(())
    }

    fn set_timer_ns(
        &mut self,
        name: &str,
        interval_ns: u64,
        start_time_ns: Option<UnixNanos>,
        stop_time_ns: Option<UnixNanos>,
        callback: Option<TimeEventCallback>,
    ) -> anyhow::Result<()> {
        check_valid_string(name, stringify!(name))?;
        check_positive_u64(interval_ns, stringify!(interval_ns))?;
        let name = Ustr::from(name);
        let ts_now = self.time.get_time_ns();

        let trampoline = self.repeating_trampoline();

        let mut inner = self.lock_inner();
        check_predicate_false(
            inner.timers.contains_key(&name),
            &format!("Timer '{name}' already exists"),
        )?;

        // An explicit start time may lie in the past (interval-aligned
        // schedules); an already due first fire is clamped in `start`
        let start_time_ns = start_time_ns.unwrap_or(ts_now);
        if let Some(stop_time_ns) = stop_time_ns {
            check_predicate_true(
                start_time_ns < stop_time_ns,
                &format!(
                    "Timer '{name}' stop time {} must be after start time {}",
                    stop_time_ns.to_rfc3339(),
                    start_time_ns.to_rfc3339(),
                ),
            )?;
            check_predicate_true(
                start_time_ns + interval_ns <= stop_time_ns,
                &format!(
                    "Timer '{name}' stop time {} must be at least one interval after start time {}",
                    stop_time_ns.to_rfc3339(),
                    start_time_ns.to_rfc3339(),
                ),
            )?;
        }

        let callback = callback
            .or_else(|| inner.default_callback.clone())
            .ok_or_else(|| anyhow::anyhow!("No callbacks provided"))?;

        let interval_ns = create_valid_interval(interval_ns);
        let mut timer = LiveTimer::new(
            name,
            interval_ns,
            ts_now,
            Some(start_time_ns),
            stop_time_ns,
            trampoline,
        );
        timer.start(ts_now);

        inner.timers.insert(name, timer);
        inner.callbacks.insert(name, callback);
        inner.update_next_event_time();

        Ok(())
    }

    fn cancel_timer(&mut self, name: &str) {
        let name = Ustr::from(name);
        let mut inner = self.lock_inner();
        match inner.timers.remove(&name) {
            Some(mut timer) => {
                timer.cancel();
                inner.callbacks.remove(&name);
                inner.update_next_event_time();
            }
            None => log::warn!("Cannot cancel timer '{name}': not found"),
        }
    }

    fn cancel_timers(&mut self) {
        let labels: Vec<Ustr> = self.lock_inner().timers.keys().copied().collect();
        for name in labels {
            self.cancel_timer(name.as_str());
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use meridian_core::datetime::NANOSECONDS_IN_MILLISECOND;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    use super::*;

    fn noop_callback() -> TimeEventCallback {
        TimeEventCallback::new(|_event: TimeEvent| {})
    }

    fn counting_callback() -> (TimeEventCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let callback = TimeEventCallback::new(move |_event: TimeEvent| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (callback, count)
    }

    fn event_keys(handlers: &[TimeEventHandler]) -> Vec<(&str, u64)> {
        handlers
            .iter()
            .map(|handler| (handler.event.name.as_str(), handler.event.ts_event.as_u64()))
            .collect()
    }

    #[fixture]
    fn test_clock() -> TestClock {
        let mut clock = TestClock::new();
        clock.register_default_handler(noop_callback());
        clock
    }

    #[rstest]
    fn test_single_alert(mut test_clock: TestClock) {
        test_clock
            .set_time_alert_ns("a", UnixNanos::from(5_000), None)
            .unwrap();
        assert!(test_clock.has_timers());
        assert_eq!(test_clock.next_event_time_ns(), Some(UnixNanos::from(5_000)));

        let handlers = test_clock.advance_time(UnixNanos::from(10_000));
        assert_eq!(event_keys(&handlers), vec![("a", 5_000)]);
        assert!(!test_clock.has_timers());
        assert_eq!(test_clock.timestamp_ns(), 10_000);
    }

    #[rstest]
    fn test_alert_at_current_time_accepted(mut test_clock: TestClock) {
        test_clock.set_time(UnixNanos::from(1_000));
        test_clock
            .set_time_alert_ns("a", UnixNanos::from(1_000), None)
            .unwrap();
        assert_eq!(test_clock.next_event_time_ns(), Some(UnixNanos::from(1_000)));

        let handlers = test_clock.advance_time(UnixNanos::from(1_000));
        assert_eq!(event_keys(&handlers), vec![("a", 1_000)]);
        assert!(!test_clock.has_timers());
    }

    #[rstest]
    fn test_alert_in_past_rejected(mut test_clock: TestClock) {
        test_clock.set_time(UnixNanos::from(2_000));
        let result = test_clock.set_time_alert_ns("a", UnixNanos::from(1_000), None);
        assert!(result.unwrap_err().to_string().contains("was in the past"));
        assert!(!test_clock.has_timers());
    }

    #[rstest]
    fn test_repeating_timer_with_stop_time(mut test_clock: TestClock) {
        test_clock
            .set_timer_ns(
                "r",
                1_000,
                Some(UnixNanos::default()),
                Some(UnixNanos::from(3_000)),
                None,
            )
            .unwrap();

        let handlers = test_clock.advance_time(UnixNanos::from(10_000));
        assert_eq!(
            event_keys(&handlers),
            vec![("r", 1_000), ("r", 2_000), ("r", 3_000)]
        );
        assert!(!test_clock.has_timers());
    }

    #[rstest]
    fn test_interleaved_timers_globally_ordered(mut test_clock: TestClock) {
        test_clock
            .set_time_alert_ns("a", UnixNanos::from(2_000), None)
            .unwrap();
        test_clock
            .set_timer_ns(
                "b",
                3_000,
                Some(UnixNanos::default()),
                Some(UnixNanos::from(9_000)),
                None,
            )
            .unwrap();

        let handlers = test_clock.advance_time(UnixNanos::from(7_000));
        assert_eq!(
            event_keys(&handlers),
            vec![("a", 2_000), ("b", 3_000), ("b", 6_000)]
        );
        assert!(test_clock.has_timers()); // "b" still has fires due before its stop
        assert_eq!(test_clock.next_event_time_ns(), Some(UnixNanos::from(9_000)));
    }

    #[rstest]
    fn test_cancel_before_fire(mut test_clock: TestClock) {
        test_clock
            .set_time_alert_ns("x", UnixNanos::from(5_000), None)
            .unwrap();
        test_clock.cancel_timer("x");

        let handlers = test_clock.advance_time(UnixNanos::from(10_000));
        assert!(handlers.is_empty());
        assert!(!test_clock.has_timers());
    }

    #[rstest]
    fn test_duplicate_label_rejected(mut test_clock: TestClock) {
        test_clock
            .set_time_alert_ns("a", UnixNanos::from(1_000), None)
            .unwrap();

        let result = test_clock.set_time_alert_ns("a", UnixNanos::from(2_000), None);
        assert!(result.unwrap_err().to_string().contains("already exists"));

        // Registry unchanged by the failed call
        assert_eq!(test_clock.timer_count(), 1);
        assert_eq!(test_clock.next_event_time_ns(), Some(UnixNanos::from(1_000)));

        let result = test_clock.set_timer_ns("a", 500, None, None, None);
        assert!(result.is_err());
        assert_eq!(test_clock.timer_count(), 1);
    }

    #[rstest]
    fn test_no_op_advance_leaves_time_untouched(mut test_clock: TestClock) {
        test_clock
            .set_time_alert_ns("a", UnixNanos::from(10_000), None)
            .unwrap();

        let handlers = test_clock.advance_time(UnixNanos::from(5_000));
        assert!(handlers.is_empty());
        assert_eq!(test_clock.timestamp_ns(), 0);

        // The due event still fires on a later advance
        let handlers = test_clock.advance_time(UnixNanos::from(10_000));
        assert_eq!(event_keys(&handlers), vec![("a", 10_000)]);
        assert_eq!(test_clock.timestamp_ns(), 10_000);
    }

    #[rstest]
    fn test_advance_without_timers_leaves_time_untouched(mut test_clock: TestClock) {
        let handlers = test_clock.advance_time(UnixNanos::from(5_000));
        assert!(handlers.is_empty());
        assert_eq!(test_clock.timestamp_ns(), 0);
    }

    #[rstest]
    fn test_advance_to_exact_next_event_time_fires(mut test_clock: TestClock) {
        test_clock.set_timer_ns("t", 1_000, None, None, None).unwrap();
        let next_time = test_clock.next_event_time_ns().unwrap();

        let handlers = test_clock.advance_time(next_time);
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].event.ts_event, next_time);
    }

    #[rstest]
    fn test_advance_idempotent_for_same_target(mut test_clock: TestClock) {
        test_clock.set_timer_ns("t", 1_000, None, None, None).unwrap();
        assert_eq!(test_clock.advance_time(UnixNanos::from(2_500)).len(), 2);
        assert!(test_clock.advance_time(UnixNanos::from(2_500)).is_empty());
    }

    #[rstest]
    #[should_panic(expected = "was <")]
    fn test_advance_backwards_panics(mut test_clock: TestClock) {
        test_clock.set_time(UnixNanos::from(5_000));
        let _ = test_clock.advance_time(UnixNanos::from(1_000));
    }

    #[rstest]
    fn test_stop_time_one_interval_after_start_fires_exactly_once(mut test_clock: TestClock) {
        test_clock
            .set_timer_ns(
                "once",
                1_000,
                Some(UnixNanos::default()),
                Some(UnixNanos::from(1_000)),
                None,
            )
            .unwrap();

        let handlers = test_clock.advance_time(UnixNanos::from(10_000));
        assert_eq!(event_keys(&handlers), vec![("once", 1_000)]);
        assert!(!test_clock.has_timers());
    }

    #[rstest]
    fn test_timer_zero_interval_rejected(mut test_clock: TestClock) {
        let result = test_clock.set_timer_ns("t", 0, None, None, None);
        assert!(result.is_err());
        assert_eq!(test_clock.timer_count(), 0);
    }

    #[rstest]
    fn test_timer_empty_name_rejected(mut test_clock: TestClock) {
        assert!(test_clock.set_timer_ns("", 1_000, None, None, None).is_err());
        assert!(test_clock
            .set_time_alert_ns("", UnixNanos::from(1_000), None)
            .is_err());
        assert_eq!(test_clock.timer_count(), 0);
    }

    #[rstest]
    fn test_stop_time_before_start_rejected(mut test_clock: TestClock) {
        test_clock.set_time(UnixNanos::from(2_000));
        let result = test_clock.set_timer_ns(
            "t",
            100,
            Some(UnixNanos::from(3_000)),
            Some(UnixNanos::from(2_500)),
            None,
        );
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must be after start time"));
        assert_eq!(test_clock.timer_count(), 0);
    }

    #[rstest]
    fn test_stop_time_within_first_interval_rejected(mut test_clock: TestClock) {
        let result = test_clock.set_timer_ns(
            "t",
            1_000,
            Some(UnixNanos::default()),
            Some(UnixNanos::from(500)),
            None,
        );
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least one interval"));
        assert_eq!(test_clock.timer_count(), 0);
    }

    #[rstest]
    fn test_missing_handler_rejected() {
        let mut clock = TestClock::new(); // no default handler registered
        assert!(clock
            .set_time_alert_ns("a", UnixNanos::from(1_000), None)
            .is_err());
        assert!(clock.set_timer_ns("t", 1_000, None, None, None).is_err());
        assert_eq!(clock.timer_count(), 0);
    }

    #[rstest]
    fn test_explicit_past_start_time_allowed(mut test_clock: TestClock) {
        test_clock.set_time(UnixNanos::from(10_000));
        test_clock
            .set_timer_ns("bar", 3_000, Some(UnixNanos::from(2_000)), None, None)
            .unwrap();

        // First fire dates from the historical schedule
        assert_eq!(test_clock.next_event_time_ns(), Some(UnixNanos::from(5_000)));
        let handlers = test_clock.advance_time(UnixNanos::from(12_000));
        assert_eq!(
            event_keys(&handlers),
            vec![("bar", 5_000), ("bar", 8_000), ("bar", 11_000)]
        );
    }

    #[rstest]
    fn test_cancel_unknown_label_is_soft(mut test_clock: TestClock) {
        test_clock.set_timer_ns("t", 1_000, None, None, None).unwrap();
        test_clock.cancel_timer("unknown");
        assert_eq!(test_clock.timer_count(), 1);
    }

    #[rstest]
    fn test_cancel_all_timers(mut test_clock: TestClock) {
        test_clock.set_timer_ns("t1", 1_000, None, None, None).unwrap();
        test_clock.set_timer_ns("t2", 1_500, None, None, None).unwrap();
        test_clock
            .set_time_alert_ns("a1", UnixNanos::from(2_000), None)
            .unwrap();
        assert_eq!(test_clock.timer_count(), 3);

        test_clock.cancel_timers();
        assert_eq!(test_clock.timer_count(), 0);
        assert_eq!(test_clock.next_event_time_ns(), None);
        assert!(test_clock.advance_time(UnixNanos::from(10_000)).is_empty());
    }

    #[rstest]
    fn test_set_then_cancel_observationally_identical(mut test_clock: TestClock) {
        test_clock
            .set_time_alert_ns("x", UnixNanos::from(5_000), None)
            .unwrap();
        test_clock.cancel_timer("x");

        assert!(test_clock.timer_labels().is_empty());
        assert_eq!(test_clock.next_event_time_ns(), None);
        assert!(!test_clock.has_timers());
        assert!(test_clock.advance_time(UnixNanos::from(10_000)).is_empty());
        assert_eq!(test_clock.timestamp_ns(), 0);

        // The label can be reused after cancellation
        test_clock
            .set_time_alert_ns("x", UnixNanos::from(6_000), None)
            .unwrap();
        assert_eq!(test_clock.timer_count(), 1);
    }

    #[rstest]
    fn test_registries_share_key_set(mut test_clock: TestClock) {
        test_clock.set_timer_ns("t1", 1_000, None, None, None).unwrap();
        test_clock
            .set_time_alert_ns("a1", UnixNanos::from(1_500), None)
            .unwrap();
        test_clock.cancel_timer("t1");
        let _ = test_clock.advance_time(UnixNanos::from(2_000)); // expires "a1"

        assert_eq!(test_clock.timers.len(), test_clock.callbacks.len());
        for name in test_clock.timers.keys() {
            assert!(test_clock.callbacks.contains_key(name));
        }
    }

    #[rstest]
    fn test_default_and_custom_callbacks_dispatch() {
        let mut clock = TestClock::new();
        let (default_callback, default_count) = counting_callback();
        let (custom_callback, custom_count) = counting_callback();

        clock.register_default_handler(default_callback);
        clock
            .set_time_alert_ns("default_timer", UnixNanos::from(1_000), None)
            .unwrap();
        clock
            .set_time_alert_ns("custom_timer", UnixNanos::from(1_000), Some(custom_callback))
            .unwrap();

        for handler in clock.advance_time(UnixNanos::from(1_000)) {
            handler.run();
        }

        assert_eq!(default_count.load(Ordering::SeqCst), 1);
        assert_eq!(custom_count.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_delta_ns(test_clock: TestClock) {
        test_clock.set_time(UnixNanos::from(5_000));
        assert_eq!(test_clock.delta_ns(UnixNanos::from(2_000)), 3_000);
        assert_eq!(test_clock.delta_ns(UnixNanos::from(5_000)), 0);
        assert_eq!(test_clock.delta_ns(UnixNanos::from(9_000)), 0);
    }

    #[rstest]
    fn test_utc_now_matches_internal_time(test_clock: TestClock) {
        test_clock.set_time(UnixNanos::from(1_577_836_805_000_000_000));
        assert_eq!(
            test_clock.utc_now().to_rfc3339(),
            "2020-01-01T00:00:05+00:00"
        );
    }

    #[rstest]
    fn test_is_test_clock_flags() {
        assert!(TestClock::new().is_test_clock());
        assert!(!LiveClock::new().is_test_clock());
    }

    #[derive(Clone, Debug)]
    enum ClockInput {
        SetAlert { offset: u8 },
        SetTimer { interval: u8, stop: Option<u8> },
        Advance { step: u8 },
        Cancel { pick: u8 },
    }

    fn clock_input_strategy() -> impl Strategy<Value = ClockInput> {
        prop_oneof![
            2 => (1u8..=20).prop_map(|offset| ClockInput::SetAlert { offset }),
            2 => ((1u8..=10), proptest::option::of(0u8..=20))
                .prop_map(|(interval, stop)| ClockInput::SetTimer { interval, stop }),
            4 => (1u8..=30).prop_map(|step| ClockInput::Advance { step }),
            1 => proptest::num::u8::ANY.prop_map(|pick| ClockInput::Cancel { pick }),
        ]
    }

    fn clock_sequence_strategy() -> impl Strategy<Value = Vec<ClockInput>> {
        proptest::collection::vec(clock_input_strategy(), 5..=60)
    }

    fn run_clock_sequence(inputs: Vec<ClockInput>) {
        const UNIT: u64 = 1_000;

        let mut clock = TestClock::new();
        clock.register_default_handler(noop_callback());
        let mut label_seq = 0usize;
        let mut cancelled: Vec<Ustr> = Vec::new();

        for input in inputs {
            let ts_now = clock.timestamp_ns();
            match input {
                ClockInput::SetAlert { offset } => {
                    let name = format!("alert-{label_seq}");
                    label_seq += 1;
                    clock
                        .set_time_alert_ns(&name, ts_now + u64::from(offset) * UNIT, None)
                        .unwrap();
                }
                ClockInput::SetTimer { interval, stop } => {
                    let name = format!("timer-{label_seq}");
                    label_seq += 1;
                    let interval_ns = u64::from(interval) * UNIT;
                    // Any stop time lies at least one interval past the start
                    let stop_time_ns = stop.map(|s| ts_now + interval_ns + u64::from(s) * UNIT);
                    clock
                        .set_timer_ns(&name, interval_ns, None, stop_time_ns, None)
                        .unwrap();
                }
                ClockInput::Advance { step } => {
                    let to_time_ns = ts_now + u64::from(step) * UNIT;
                    let next_before = clock.next_event_time_ns();
                    let had_work = next_before.is_some_and(|next| to_time_ns >= next);

                    let handlers = clock.advance_time(to_time_ns);

                    for pair in handlers.windows(2) {
                        assert!(pair[0].event.ts_event <= pair[1].event.ts_event);
                    }
                    for handler in &handlers {
                        assert!(handler.event.ts_event > ts_now);
                        assert!(handler.event.ts_event <= to_time_ns);
                        assert!(!cancelled.contains(&handler.event.name));
                    }

                    if had_work {
                        assert_eq!(clock.timestamp_ns(), to_time_ns);
                        assert_eq!(handlers[0].event.ts_event, next_before.unwrap());
                    } else {
                        assert!(handlers.is_empty());
                        assert_eq!(clock.timestamp_ns(), ts_now);
                    }
                }
                ClockInput::Cancel { pick } => {
                    let labels = clock.timer_labels();
                    if !labels.is_empty() {
                        let name = labels[usize::from(pick) % labels.len()];
                        clock.cancel_timer(name.as_str());
                        cancelled.push(name);
                    }
                }
            }

            // Universal invariants after every operation
            assert_eq!(clock.timers.len(), clock.callbacks.len());
            for name in clock.timers.keys() {
                assert!(clock.callbacks.contains_key(name));
            }
            assert_eq!(
                clock.next_event_time_ns(),
                clock.timers.values().map(TestTimer::next_time_ns).min()
            );
            assert_eq!(clock.has_timers(), clock.timer_count() > 0);
        }
    }

    #[rstest]
    fn test_clock_operation_sequence_properties() {
        proptest!(move |(inputs in clock_sequence_strategy())| {
            run_clock_sequence(inputs);
        });
    }

    #[rstest]
    fn test_live_clock_timestamps_increase() {
        let clock = LiveClock::new();
        let first = clock.timestamp_ns();
        let second = clock.timestamp_ns();
        assert!(second > first);
    }

    #[rstest]
    fn test_live_clock_alert_fires_once_and_unregisters() {
        let mut clock = LiveClock::new();
        let (callback, count) = counting_callback();
        clock.register_default_handler(callback);

        let alert_time = clock.timestamp_ns() + 20 * NANOSECONDS_IN_MILLISECOND;
        clock.set_time_alert_ns("alert-once", alert_time, None).unwrap();
        assert_eq!(clock.timer_count(), 1);

        std::thread::sleep(std::time::Duration::from_millis(400));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(clock.timer_count(), 0);
    }

    #[rstest]
    fn test_live_clock_cancel_before_fire() {
        let mut clock = LiveClock::new();
        let (callback, count) = counting_callback();
        clock.register_default_handler(callback);

        let alert_time = clock.timestamp_ns() + 200 * NANOSECONDS_IN_MILLISECOND;
        clock.set_time_alert_ns("alert-cancelled", alert_time, None).unwrap();
        clock.cancel_timer("alert-cancelled");
        assert_eq!(clock.timer_count(), 0);

        std::thread::sleep(std::time::Duration::from_millis(400));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn test_live_clock_repeating_timer_stops_at_stop_time() {
        let mut clock = LiveClock::new();
        let (callback, count) = counting_callback();
        clock.register_default_handler(callback);

        let ts_now = clock.timestamp_ns();
        let interval_ns = 20 * NANOSECONDS_IN_MILLISECOND;
        clock
            .set_timer_ns(
                "repeating",
                interval_ns,
                Some(ts_now),
                Some(ts_now + 4 * interval_ns),
                None,
            )
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(600));
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(clock.timer_count(), 0);
    }

    #[rstest]
    fn test_live_clock_duplicate_label_rejected() {
        let mut clock = LiveClock::new();
        clock.register_default_handler(noop_callback());

        let alert_time = clock.timestamp_ns() + 500 * NANOSECONDS_IN_MILLISECOND;
        clock.set_time_alert_ns("dup", alert_time, None).unwrap();
        assert!(clock.set_time_alert_ns("dup", alert_time, None).is_err());
        assert_eq!(clock.timer_count(), 1);
    }
}
