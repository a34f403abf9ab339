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

//! Real-time and test timers for use with `Clock` implementations.

use std::{
    cmp::Ordering,
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    num::NonZeroU64,
    sync::{
        Arc,
        atomic::{self, AtomicU64},
    },
};

use meridian_core::{
    UUID4, UnixNanos,
    correctness::{FAILED, check_valid_string},
    datetime::floor_to_nearest_microsecond,
};
use tokio::{task::JoinHandle, time::Duration};
use ustr::Ustr;

use crate::runtime::get_runtime;

/// Creates a valid nanoseconds interval that is guaranteed to be positive,
/// clamping zero to one nanosecond.
#[must_use]
pub fn create_valid_interval(interval_ns: u64) -> NonZeroU64 {
    NonZeroU64::new(interval_ns).unwrap_or(NonZeroU64::MIN)
}

/// Represents a time event occurring at the event timestamp.
///
/// A `TimeEvent` carries the label of the timer which produced it, a unique
/// event ID, and timestamps indicating when the event was scheduled to occur
/// and when the instance was created.
#[derive(Clone, Copy, Debug)]
pub struct TimeEvent {
    /// The event name, identifying the timer which produced the event.
    pub name: Ustr,
    /// The unique identifier for the event.
    pub event_id: UUID4,
    /// UNIX timestamp (nanoseconds) when the event occurred.
    pub ts_event: UnixNanos,
    /// UNIX timestamp (nanoseconds) when the instance was initialized.
    pub ts_init: UnixNanos,
}

impl TimeEvent {
    /// Creates a new [`TimeEvent`] instance.
    #[must_use]
    pub const fn new(name: Ustr, event_id: UUID4, ts_event: UnixNanos, ts_init: UnixNanos) -> Self {
        Self {
            name,
            event_id,
            ts_event,
            ts_init,
        }
    }
}

// Identity is the event ID; ordering is by occurrence for deterministic replay
impl PartialEq for TimeEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}

impl Eq for TimeEvent {}

impl Hash for TimeEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.event_id.hash(state);
    }
}

/// Ascending by event timestamp, with the name as a tie-break for stable sorting.
impl Ord for TimeEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts_event
            .cmp(&other.ts_event)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for TimeEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for TimeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TimeEvent(name={}, event_id={}, ts_event={}, ts_init={})",
            self.name, self.event_id, self.ts_event, self.ts_init
        )
    }
}

/// The callable signature for handling time events.
pub type TimeEventFn = dyn Fn(TimeEvent) + Send + Sync;

/// A cloneable, thread-safe callback invoked with a [`TimeEvent`] on each fire.
///
/// `Send + Sync` because live clocks dispatch from scheduler threads.
#[derive(Clone)]
pub struct TimeEventCallback {
    callback: Arc<TimeEventFn>,
}

impl TimeEventCallback {
    /// Creates a new [`TimeEventCallback`] from the given closure.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(TimeEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Invokes the callback synchronously with `event`.
    pub fn call(&self, event: TimeEvent) {
        (self.callback)(event);
    }
}

impl Debug for TimeEventCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(stringify!(TimeEventCallback))
    }
}

impl From<Arc<TimeEventFn>> for TimeEventCallback {
    fn from(callback: Arc<TimeEventFn>) -> Self {
        Self { callback }
    }
}

/// A fired [`TimeEvent`] paired with the callback registered for its timer.
///
/// This is the element type of the ordered event stream returned by
/// `TestClock::advance_time`.
#[derive(Clone, Debug)]
pub struct TimeEventHandler {
    /// The time event.
    pub event: TimeEvent,
    /// The callable handler for the event.
    pub callback: TimeEventCallback,
}

impl TimeEventHandler {
    /// Creates a new [`TimeEventHandler`] instance.
    #[must_use]
    pub const fn new(event: TimeEvent, callback: TimeEventCallback) -> Self {
        Self { event, callback }
    }

    /// Consumes the handler, dispatching the event to the callback.
    pub fn run(self) {
        let Self { event, callback } = self;
        callback.call(event);
    }
}

impl PartialEq for TimeEventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.event.ts_event == other.event.ts_event && self.event.name == other.event.name
    }
}

impl Eq for TimeEventHandler {}

impl Ord for TimeEventHandler {
    fn cmp(&self, other: &Self) -> Ordering {
        self.event
            .ts_event
            .cmp(&other.event.ts_event)
            .then_with(|| self.event.name.cmp(&other.event.name))
    }
}

impl PartialOrd for TimeEventHandler {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A test timer for use with a `TestClock`.
///
/// `TestTimer` is a pure value-advancing timer: given a target time it
/// enumerates every fire up to that time, allowing precise control over
/// event generation in test and backtest scenarios.
#[derive(Clone, Copy, Debug)]
pub struct TestTimer {
    /// The name of the timer.
    pub name: Ustr,
    /// The interval between timer events in nanoseconds.
    pub interval_ns: NonZeroU64,
    /// The start time of the timer in UNIX nanoseconds.
    pub start_time_ns: UnixNanos,
    /// The optional stop time of the timer in UNIX nanoseconds.
    pub stop_time_ns: Option<UnixNanos>,
    next_time_ns: UnixNanos,
    is_expired: bool,
}

impl TestTimer {
    /// Creates a new repeating [`TestTimer`] instance.
    ///
    /// The first fire is due at `start_time_ns + interval_ns`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid string.
    #[must_use]
    pub fn new(
        name: Ustr,
        interval_ns: NonZeroU64,
        start_time_ns: UnixNanos,
        stop_time_ns: Option<UnixNanos>,
    ) -> Self {
        check_valid_string(name, stringify!(name)).expect(FAILED);

        Self {
            name,
            interval_ns,
            start_time_ns,
            stop_time_ns,
            next_time_ns: start_time_ns + interval_ns.get(),
            is_expired: false,
        }
    }

    /// Creates a new one-shot [`TestTimer`] due at exactly `alert_time_ns`.
    ///
    /// The single fire is due at `alert_time_ns`, which is also the stop time,
    /// so the timer expires after that fire. Holds at the `alert == now`
    /// boundary, where the timer is due immediately.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid string.
    #[must_use]
    pub fn new_alert(name: Ustr, alert_time_ns: UnixNanos, ts_now: UnixNanos) -> Self {
        check_valid_string(name, stringify!(name)).expect(FAILED);

        let interval_ns = create_valid_interval(alert_time_ns.saturating_sub(ts_now.as_u64()));
        Self {
            name,
            interval_ns,
            start_time_ns: ts_now,
            stop_time_ns: Some(alert_time_ns),
            next_time_ns: alert_time_ns,
            is_expired: false,
        }
    }

    /// Returns the next time in UNIX nanoseconds when the timer is due to fire.
    #[must_use]
    pub const fn next_time_ns(&self) -> UnixNanos {
        self.next_time_ns
    }

    /// Returns whether the timer is expired.
    ///
    /// An expired timer will not generate any further events.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        self.is_expired
    }

    /// Advances the due time by one interval.
    ///
    /// Must not be called on an expired timer.
    pub fn iterate_next(&mut self) {
        debug_assert!(!self.is_expired, "`iterate_next` called on expired timer");
        self.next_time_ns += self.interval_ns.get();
    }

    /// Advances the timer to `to_time_ns`, producing one event per due moment.
    ///
    /// Events are returned in ascending `ts_event` order. After each emitted
    /// event the due time moves forward one interval; once the updated due
    /// time exceeds the stop time the timer latches expired and emits no
    /// further events for this or any later call.
    pub fn advance(&mut self, to_time_ns: UnixNanos) -> Vec<TimeEvent> {
        let mut events = Vec::new();
        while !self.is_expired && self.next_time_ns <= to_time_ns {
            events.push(TimeEvent::new(
                self.name,
                UUID4::new(),
                self.next_time_ns,
                self.next_time_ns,
            ));
            self.iterate_next();

            if let Some(stop_time_ns) = self.stop_time_ns {
                if self.next_time_ns > stop_time_ns {
                    self.is_expired = true;
                }
            }
        }
        events
    }

    /// Cancels the timer (the timer will not generate further events).
    ///
    /// Used to stop the timer before its scheduled stop time.
    pub fn cancel(&mut self) {
        self.is_expired = true;
    }
}

/// The clock-internal trampoline a [`LiveTimer`] invokes when its delay elapses.
///
/// Receives the timer name and the scheduled fire time. The trampoline is
/// never the user handler itself: the owning clock performs expiry
/// bookkeeping there before dispatching the handler.
pub type TimerTrampoline = Arc<dyn Fn(Ustr, UnixNanos) + Send + Sync>;

/// A live timer for use with a `LiveClock`.
///
/// `LiveTimer` wraps a delayed task on the shared Tokio runtime. Each fire is
/// armed as a one-shot delay; the owning clock re-arms repeating timers via
/// [`LiveTimer::repeat`] after each successful fire.
pub struct LiveTimer {
    /// The name of the timer.
    pub name: Ustr,
    /// The interval between timer events in nanoseconds.
    pub interval_ns: NonZeroU64,
    /// The start time of the timer in UNIX nanoseconds.
    pub start_time_ns: UnixNanos,
    /// The optional stop time of the timer in UNIX nanoseconds.
    pub stop_time_ns: Option<UnixNanos>,
    next_time_ns: Arc<AtomicU64>,
    trampoline: TimerTrampoline,
    task_handle: Option<JoinHandle<()>>,
}

impl Debug for LiveTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(LiveTimer))
            .field("name", &self.name)
            .field("interval_ns", &self.interval_ns)
            .field("start_time_ns", &self.start_time_ns)
            .field("stop_time_ns", &self.stop_time_ns)
            .field("next_time_ns", &self.next_time_ns())
            .finish_non_exhaustive()
    }
}

impl LiveTimer {
    /// Creates a new repeating [`LiveTimer`] instance.
    ///
    /// A missing `start_time_ns` defaults to `ts_now`. The first fire is due
    /// at `start_time_ns + interval_ns`. The timer is not armed until
    /// [`LiveTimer::start`] is called.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid string.
    #[must_use]
    pub fn new(
        name: Ustr,
        interval_ns: NonZeroU64,
        ts_now: UnixNanos,
        start_time_ns: Option<UnixNanos>,
        stop_time_ns: Option<UnixNanos>,
        trampoline: TimerTrampoline,
    ) -> Self {
        check_valid_string(name, stringify!(name)).expect(FAILED);

        log::debug!("Creating timer '{name}'");
        let start_time_ns = start_time_ns.unwrap_or(ts_now);
        Self {
            name,
            interval_ns,
            start_time_ns,
            stop_time_ns,
            next_time_ns: Arc::new(AtomicU64::new(start_time_ns.as_u64() + interval_ns.get())),
            trampoline,
            task_handle: None,
        }
    }

    /// Creates a new one-shot [`LiveTimer`] due at exactly `alert_time_ns`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid string.
    #[must_use]
    pub fn new_alert(
        name: Ustr,
        alert_time_ns: UnixNanos,
        ts_now: UnixNanos,
        trampoline: TimerTrampoline,
    ) -> Self {
        check_valid_string(name, stringify!(name)).expect(FAILED);

        log::debug!("Creating timer '{name}'");
        let interval_ns = create_valid_interval(alert_time_ns.saturating_sub(ts_now.as_u64()));
        Self {
            name,
            interval_ns,
            start_time_ns: ts_now,
            stop_time_ns: Some(alert_time_ns),
            next_time_ns: Arc::new(AtomicU64::new(alert_time_ns.as_u64())),
            trampoline,
            task_handle: None,
        }
    }

    /// Returns the next time in UNIX nanoseconds when the timer is due to fire.
    #[must_use]
    pub fn next_time_ns(&self) -> UnixNanos {
        UnixNanos::from(self.next_time_ns.load(atomic::Ordering::SeqCst))
    }

    /// Starts the timer, arming the delayed task for the first fire.
    ///
    /// A fire time already in the past is clamped to `ts_now` with a warning,
    /// resulting in an immediate fire.
    pub fn start(&mut self, ts_now: UnixNanos) {
        let mut fire_time_ns = self.next_time_ns();
        if fire_time_ns < ts_now {
            log::warn!(
                "Timer '{}' fire time {} was in the past, adjusted to current time for immediate fire",
                self.name,
                fire_time_ns.to_rfc3339(),
            );
            fire_time_ns = ts_now;
            self.next_time_ns
                .store(ts_now.as_u64(), atomic::Ordering::SeqCst);
        }
        self.arm(ts_now, fire_time_ns);
    }

    /// Advances the due time by one interval.
    pub fn iterate_next(&self) {
        self.next_time_ns
            .fetch_add(self.interval_ns.get(), atomic::Ordering::SeqCst);
    }

    /// Re-arms a fresh delayed task for the updated due time.
    ///
    /// Called by the owning clock after each successful fire of a repeating
    /// timer. The fresh task supersedes the previous one, which has already
    /// fired.
    pub fn repeat(&mut self, ts_now: UnixNanos) {
        let fire_time_ns = self.next_time_ns();
        self.arm(ts_now, fire_time_ns);
    }

    fn arm(&mut self, ts_now: UnixNanos, fire_time_ns: UnixNanos) {
        let name = self.name;
        let trampoline = self.trampoline.clone();
        let delay_ns = floor_to_nearest_microsecond(fire_time_ns.saturating_sub(ts_now.as_u64()));
        let delay = Duration::from_nanos(delay_ns);

        let handle = get_runtime().spawn(async move {
            tokio::time::sleep(delay).await;
            trampoline(name, fire_time_ns);
        });

        self.task_handle = Some(handle);
    }

    /// Cancels the timer.
    ///
    /// Any pending delayed task is aborted; subsequent expiries deliver no
    /// events. Callers serialize `cancel` and `repeat` through the owning
    /// clock's registry lock.
    pub fn cancel(&mut self) {
        log::debug!("Cancel timer '{}'", self.name);
        if let Some(ref handle) = self.task_handle {
            handle.abort();
        }
    }
}
