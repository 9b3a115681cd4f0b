/*
 * Copyright 2024 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! Synchronization primitives.
//!
//! The spinlock and once-cell primitives are architecture-agnostic (they only need to mask the
//! abstract `interrupt` stand-ins from `utils`), so they live in `utils::lock` and are
//! re-exported here. What's left here is scheduler-aware: [`mutex`] sleeps the current thread
//! instead of spinning, and [`wait_queue`] is the FIFO channel threads block on.

pub mod mutex;
pub mod wait_queue;

pub use utils::lock::{IntSpin, IntSpinGuard, Spin, SpinGuard, once::OnceInit};
