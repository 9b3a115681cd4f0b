//! Mutually exclusive access primitive based on a spinlock.
//!
//! A [`Spin`] protects its wrapped data from being accessed concurrently.
//!
//! One particularity of kernel code is that multi-threading is not the only
//! source of concurrency: an interrupt handler may run at any moment. For
//! this reason spinlocks here come with an option to mask interrupts while
//! held, via the `INT` const parameter (`false` masks, `true` does not).

pub mod once;

use crate::interrupt::{cli, is_interrupt_enabled, sti};
use core::{
	cell::UnsafeCell,
	fmt::{self, Formatter},
	hint,
	ops::{Deref, DerefMut},
	sync::atomic::{
		AtomicBool,
		Ordering::{Acquire, Release},
	},
};

#[inline(always)]
fn raw_lock(lock: &AtomicBool) {
	while lock.swap(true, Acquire) {
		hint::spin_loop();
	}
}

/// Unlocks the associated [`Spin`] when dropped.
pub struct SpinGuard<'m, T: ?Sized, const INT: bool> {
	spin: &'m Spin<T, INT>,
	/// The interrupt status before locking. Relevant only when `INT == false`.
	int_state: bool,
}

impl<T: ?Sized, const INT: bool> Deref for SpinGuard<'_, T, INT> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		unsafe { &*self.spin.data.get() }
	}
}

impl<T: ?Sized, const INT: bool> DerefMut for SpinGuard<'_, T, INT> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { &mut *self.spin.data.get() }
	}
}

impl<T: ?Sized, const INT: bool> !Send for SpinGuard<'_, T, INT> {}

unsafe impl<T: ?Sized + Sync, const INT: bool> Sync for SpinGuard<'_, T, INT> {}

impl<T: ?Sized + fmt::Debug, const INT: bool> fmt::Debug for SpinGuard<'_, T, INT> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self.deref(), f)
	}
}

impl<T: ?Sized, const INT: bool> Drop for SpinGuard<'_, T, INT> {
	fn drop(&mut self) {
		unsafe {
			self.spin.unlock(self.int_state);
		}
	}
}

/// Wraps a value that can be accessed by only one context at a time.
///
/// `INT` tells whether interrupts stay enabled while the lock is held. Code that shares state
/// with an interrupt handler must use `INT = false` (see [`IntSpin`]) to avoid deadlocking
/// against itself.
pub struct Spin<T: ?Sized, const INT: bool = true> {
	spin: AtomicBool,
	data: UnsafeCell<T>,
}

impl<T, const INT: bool> Spin<T, INT> {
	/// Creates a new instance wrapping the given `data`.
	pub const fn new(data: T) -> Self {
		Self {
			spin: AtomicBool::new(false),
			data: UnsafeCell::new(data),
		}
	}

	/// Acquires the spinlock, consumes it and returns the inner value.
	pub fn into_inner(self) -> T {
		raw_lock(&self.spin);
		self.data.into_inner()
	}
}

impl<T: Default, const INT: bool> Default for Spin<T, INT> {
	fn default() -> Self {
		Self::new(Default::default())
	}
}

impl<T: ?Sized, const INT: bool> Spin<T, INT> {
	/// Acquires the spinlock, spinning until it becomes available.
	pub fn lock(&self) -> SpinGuard<T, INT> {
		let int_state = if !INT {
			let enabled = is_interrupt_enabled();
			cli();
			enabled
		} else {
			false
		};
		raw_lock(&self.spin);
		SpinGuard {
			spin: self,
			int_state,
		}
	}

	/// Releases the spinlock. Called automatically when the guard is dropped.
	///
	/// # Safety
	///
	/// The spinlock must currently be locked by the calling context.
	pub unsafe fn unlock(&self, int_state: bool) {
		self.spin.store(false, Release);
		if !INT && int_state {
			sti();
		}
	}
}

unsafe impl<T: ?Sized + Send, const INT: bool> Sync for Spin<T, INT> {}
unsafe impl<T: ?Sized + Send, const INT: bool> Send for Spin<T, INT> {}

impl<T: ?Sized + fmt::Debug, const INT: bool> fmt::Debug for Spin<T, INT> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let guard = self.lock();
		fmt::Debug::fmt(&*guard, f)
	}
}

/// A [`Spin`] that leaves interrupts enabled while held.
pub type NoIntSpin<T> = Spin<T, true>;
/// A [`Spin`] that masks interrupts while held.
pub type IntSpin<T> = Spin<T, false>;
/// Guard for an [`IntSpin`].
pub type IntSpinGuard<'m, T> = SpinGuard<'m, T, false>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lock_unlock_roundtrip() {
		let spin: IntSpin<u32> = Spin::new(0);
		*spin.lock() += 1;
		*spin.lock() += 1;
		assert_eq!(*spin.lock(), 2);
	}

	#[test]
	fn int_spin_restores_interrupt_state() {
		sti();
		let spin: IntSpin<u32> = Spin::new(0);
		{
			let _guard = spin.lock();
			assert!(!is_interrupt_enabled());
		}
		assert!(is_interrupt_enabled());
	}
}
