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

//! Common componentry for Meridian.
//!
//! The `meridian-common` crate provides the clock and timer subsystem which forms the
//! system foundation for Meridian applications: a uniform, testable abstraction over
//! wall-clock time letting strategies register alerts and periodic timers producing
//! discrete, labeled time events.
//!
//! Two interchangeable clock realizations share a single contract so that backtests
//! and live runs use identical strategy code:
//!
//! - [`clock::TestClock`] — deterministic, driven by explicit time advancement.
//! - [`clock::LiveClock`] — driven by the operating system's UTC time and real timers.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod clock;
pub mod runtime;
pub mod timer;
