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

//! Sleeping mutual exclusion synchronization primitive.
//!
//! Contrary to a spinlock, [`Mutex`] makes the current thread sleep while waiting, reducing CPU
//! cycle waste. A binary lock with an owner-thread reference and a FIFO wait queue; recursive
//! acquisition by the owner is a programmer error, not a recoverable condition.

use crate::{
	process::kthread::{self, Thread},
	sync::{IntSpin, wait_queue::WaitQueue},
};
use core::{
	cell::UnsafeCell,
	fmt,
	fmt::Formatter,
	ops::{Deref, DerefMut},
};
use utils::ptr::arc::Arc;

struct State {
	owner: Option<Arc<Thread>>,
}

/// Unlocks the associated [`Mutex`] when dropped.
pub struct MutexGuard<'m, T: ?Sized> {
	mutex: &'m Mutex<T>,
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		unsafe { &*self.mutex.data.get() }
	}
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { &mut *self.mutex.data.get() }
	}
}

impl<T: ?Sized> !Send for MutexGuard<'_, T> {}

unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self.deref(), f)
	}
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
	fn drop(&mut self) {
		unsafe {
			self.mutex.unlock();
		}
	}
}

/// Sleeping mutex: a binary lock with an owner-thread reference and a FIFO wait queue.
pub struct Mutex<T: ?Sized> {
	state: IntSpin<State>,
	waiters: WaitQueue,
	data: UnsafeCell<T>,
}

impl<T: Default> Default for Mutex<T> {
	fn default() -> Self {
		Self::new(Default::default())
	}
}

impl<T> Mutex<T> {
	/// Creates a new instance wrapping the given `data`.
	pub const fn new(data: T) -> Self {
		Self {
			state: IntSpin::new(State { owner: None }),
			waiters: WaitQueue::new(),
			data: UnsafeCell::new(data),
		}
	}

	/// Acquires the mutex, consumes it and returns the inner value.
	pub fn into_inner(self) -> T {
		self.data.into_inner()
	}
}

impl<T: ?Sized> Mutex<T> {
	/// Acquires the mutex, sleeping while it is held by another thread.
	///
	/// # Panics
	///
	/// Panics if the calling thread already holds the mutex: recursive acquisition is a
	/// programmer error, never a legitimate contention case.
	pub fn lock(&self) -> MutexGuard<T> {
		let cur = kthread::current();
		loop {
			let mut state = self.state.lock();
			match &state.owner {
				None => {
					state.owner = Some(cur.clone());
					break;
				}
				Some(owner) => {
					assert!(
						!Arc::ptr_eq(owner, &cur),
						"recursive acquisition of a non-recursive mutex"
					);
					drop(state);
					self.waiters.sleep();
				}
			}
		}
		MutexGuard {
			mutex: self,
		}
	}

	/// Releases the mutex, waking the next waiting thread, if any.
	///
	/// # Safety
	///
	/// Must only be called by the current owner of the lock; called automatically when the
	/// guard is dropped.
	unsafe fn unlock(&self) {
		self.state.lock().owner = None;
		self.waiters.wake_one();
	}
}

unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let guard = self.lock();
		fmt::Debug::fmt(&*guard, f)
	}
}
