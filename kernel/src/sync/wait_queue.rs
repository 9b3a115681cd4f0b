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

//! FIFO queue of threads blocked on a condition.
//!
//! A thread is on at most one queue at a time. Two flavors of sleep are offered: the plain one
//! can only be ended by [`WaitQueue::wake_one`]/[`WaitQueue::wake_all`]; the cancellable one can
//! additionally be interrupted by [`WaitQueue::cancel_one`], which is how `kthread_cancel`
//! delivers its sentinel wake.

use crate::{
	process::kthread::{self, Thread, ThreadState},
	sync::IntSpin,
};
use core::fmt;
use utils::{collections::vec::Vec, ptr::arc::Arc};

/// The reason a cancellable sleep ended.
#[derive(Debug, Eq, PartialEq)]
pub enum WakeReason {
	/// The queue was woken normally (`wake_one`/`wake_all`).
	Woken,
	/// The thread was cancelled while sleeping (`cancel_one`/`kthread_cancel`).
	Cancelled,
}

/// An ordered set of threads blocked on a condition.
pub struct WaitQueue(IntSpin<Vec<Arc<Thread>>>);

impl Default for WaitQueue {
	fn default() -> Self {
		Self::new()
	}
}

impl WaitQueue {
	/// Creates a new, empty queue.
	pub const fn new() -> Self {
		Self(IntSpin::new(Vec::new()))
	}

	/// Returns whether the queue currently has no waiters.
	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}

	/// Enqueues the current thread and puts it to sleep until woken.
	///
	/// Non-cancellable: only [`Self::wake_one`]/[`Self::wake_all`] can end this sleep.
	pub fn sleep(&self) {
		let cur = kthread::current();
		self.0.lock().push(cur.clone()).ok();
		kthread::set_state(&cur, ThreadState::Sleeping);
		kthread::schedule();
	}

	/// Like [`Self::sleep`], but returns [`WakeReason::Cancelled`] if `kthread_cancel` woke the
	/// thread instead of a normal wake.
	pub fn sleep_cancellable(&self) -> WakeReason {
		let cur = kthread::current();
		self.0.lock().push(cur.clone()).ok();
		kthread::set_state(&cur, ThreadState::SleepingCancellable);
		kthread::schedule();
		if kthread::take_cancelled(&cur) {
			WakeReason::Cancelled
		} else {
			WakeReason::Woken
		}
	}

	/// Wakes the longest-waiting thread, if any.
	pub fn wake_one(&self) {
		let next = {
			let mut q = self.0.lock();
			if q.is_empty() { None } else { Some(q.remove(0)) }
		};
		if let Some(thr) = next {
			kthread::wake(&thr);
		}
	}

	/// Wakes every waiting thread.
	pub fn wake_all(&self) {
		let waiters = core::mem::take(&mut *self.0.lock());
		for thr in &waiters {
			kthread::wake(thr);
		}
	}

	/// Wakes `thr` specifically with the cancelled sentinel, if it is currently in this queue.
	///
	/// Returns whether `thr` was found and woken.
	pub fn cancel_one(&self, thr: &Arc<Thread>) -> bool {
		let removed = {
			let mut q = self.0.lock();
			let pos = q.iter().position(|t| Arc::ptr_eq(t, thr));
			pos.map(|i| q.remove(i))
		};
		match removed {
			Some(thr) => {
				kthread::mark_cancelled(&thr);
				kthread::wake(&thr);
				true
			}
			None => false,
		}
	}

	/// Removes `thr` from the queue without waking it (used to make sure a thread that woke up
	/// on its own, e.g. after a spurious resume, is not left enqueued).
	pub fn remove(&self, thr: &Arc<Thread>) {
		let mut q = self.0.lock();
		if let Some(pos) = q.iter().position(|t| Arc::ptr_eq(t, thr)) {
			q.remove(pos);
		}
	}
}

unsafe impl Sync for WaitQueue {}

impl fmt::Debug for WaitQueue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "WaitQueue({} waiting)", self.0.lock().len())
	}
}
