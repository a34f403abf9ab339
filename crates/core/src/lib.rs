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

//! Core foundational types and utilities for Meridian.
//!
//! The `meridian-core` crate is designed to be lightweight and to provide zero-cost
//! abstractions wherever possible. It supplies the essential building blocks used
//! across the Meridian ecosystem, including:
//!
//! - Time handling and atomic clock functionality.
//! - UUID generation and management.
//! - Correctness validation functions.
//! - Date and time conversion utilities.
//!
//! # Platform
//!
//! Meridian is a high-performance algorithmic trading platform, providing quantitative
//! traders with the ability to backtest portfolios of automated trading strategies on
//! historical data with an event-driven engine, and also deploy those same strategies
//! live, with no code changes.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod correctness;
pub mod datetime;
pub mod nanos;
pub mod time;
pub mod uuid;

// Re-exports
pub use crate::{
    nanos::{DurationNanos, UnixNanos},
    time::AtomicTime,
    uuid::UUID4,
};

/// Message for when a mutex guard cannot be acquired due to poisoning.
///
/// Mutex guards should use `expect` rather than handle poison errors.
/// A poisoned mutex indicates a thread panicked while holding the lock,
/// meaning protected data may be in an inconsistent state. Propagating
/// the panic is the safe approach, as continuing with potentially
/// corrupted data would violate safety invariants.
pub const MUTEX_POISONED: &str = "Mutex poisoned";
