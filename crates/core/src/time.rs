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

//! An atomic clock over UNIX nanosecond timestamps.
//!
//! An [`AtomicTime`] operates in one of two modes:
//!
//! - **Realtime**: reads derive from the system clock and are guaranteed to be
//!   unique and strictly increasing across calls, even when the underlying
//!   system clock resolution would produce duplicates.
//! - **Static**: reads return a stored value which only changes through
//!   [`AtomicTime::set_time`], as required for deterministic test clocks.

use std::{
    sync::{
        OnceLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    UnixNanos,
    datetime::{nanos_to_micros, nanos_to_millis, nanos_to_secs},
};

static ATOMIC_CLOCK_REALTIME: OnceLock<AtomicTime> = OnceLock::new();

/// Returns a process-wide realtime [`AtomicTime`] instance.
pub fn get_atomic_clock_realtime() -> &'static AtomicTime {
    ATOMIC_CLOCK_REALTIME.get_or_init(|| AtomicTime::new(true, UnixNanos::default()))
}

/// Returns the nanoseconds elapsed since the UNIX epoch according to the system clock.
///
/// # Panics
///
/// Panics if the system clock is set before the UNIX epoch.
#[must_use]
pub fn nanos_since_unix_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System clock should be after the UNIX epoch")
        .as_nanos() as u64
}

/// An atomic clock which returns UNIX epoch timestamps in nanoseconds.
#[derive(Debug)]
pub struct AtomicTime {
    /// Whether the clock reads from the system clock or the stored value.
    realtime: AtomicBool,
    /// The last recorded time in UNIX nanoseconds.
    timestamp_ns: AtomicU64,
}

impl AtomicTime {
    /// Creates a new [`AtomicTime`] instance in the given mode with an initial time.
    #[must_use]
    pub fn new(realtime: bool, time: UnixNanos) -> Self {
        Self {
            realtime: AtomicBool::new(realtime),
            timestamp_ns: AtomicU64::new(time.as_u64()),
        }
    }

    /// Returns the current UNIX timestamp in nanoseconds (ns).
    ///
    /// In realtime mode successive reads are unique and strictly increasing.
    #[must_use]
    pub fn get_time_ns(&self) -> UnixNanos {
        if self.realtime.load(Ordering::Relaxed) {
            self.time_since_epoch()
        } else {
            UnixNanos::from(self.timestamp_ns.load(Ordering::SeqCst))
        }
    }

    /// Returns the current UNIX timestamp in microseconds (μs).
    #[must_use]
    pub fn get_time_us(&self) -> u64 {
        nanos_to_micros(self.get_time_ns().as_u64())
    }

    /// Returns the current UNIX timestamp in milliseconds (ms).
    #[must_use]
    pub fn get_time_ms(&self) -> u64 {
        nanos_to_millis(self.get_time_ns().as_u64())
    }

    /// Returns the current UNIX timestamp in seconds.
    #[must_use]
    pub fn get_time(&self) -> f64 {
        nanos_to_secs(self.get_time_ns().as_u64())
    }

    /// Stores `time` as the current value of the clock.
    ///
    /// Meaningful in static mode only; a realtime clock keeps reading the
    /// system clock regardless of the stored value.
    pub fn set_time(&self, time: UnixNanos) {
        self.timestamp_ns.store(time.as_u64(), Ordering::SeqCst);
    }

    /// Returns a realtime timestamp which is unique and strictly greater than
    /// any timestamp previously returned by this instance.
    #[must_use]
    pub fn time_since_epoch(&self) -> UnixNanos {
        let now = nanos_since_unix_epoch();
        let mut last = self.timestamp_ns.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self.timestamp_ns.compare_exchange(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return UnixNanos::from(next),
                Err(actual) => last = actual,
            }
        }
    }
}

impl Default for AtomicTime {
    /// Creates a new default [`AtomicTime`] instance in realtime mode.
    fn default() -> Self {
        Self::new(true, UnixNanos::default())
    }
}
