//! Once-initialized objects.

use core::{cell::UnsafeCell, mem::MaybeUninit, ops::Deref};

/// An object meant to be initialized once early on, then accessed read-only.
///
/// The value **must** be initialized with [`OnceInit::init`] before the first [`Deref`].
/// Failing to do so is undefined behavior. Used for boot-time singletons such as the root
/// vnode and the scheduler's run queue, which cannot be built `const`.
pub struct OnceInit<T>(UnsafeCell<MaybeUninit<T>>);

impl<T> OnceInit<T> {
	/// Creates a new instance waiting to be initialized.
	///
	/// # Safety
	///
	/// The value must be initialized with [`Self::init`] before any `Deref`.
	pub const unsafe fn new() -> Self {
		Self(UnsafeCell::new(MaybeUninit::uninit()))
	}

	/// Initializes with the given value.
	///
	/// If already initialized, the previous value is **not** dropped.
	///
	/// # Safety
	///
	/// The caller is responsible for ensuring this runs at most once concurrently.
	pub unsafe fn init(this: &Self, val: T) -> &T {
		unsafe {
			let inner = &mut *this.0.get();
			inner.write(val);
			inner.assume_init_ref()
		}
	}
}

impl<T> Deref for OnceInit<T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		unsafe { (*self.0.get()).assume_init_ref() }
	}
}

unsafe impl<T> Sync for OnceInit<T> {}
