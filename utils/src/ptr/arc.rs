//! Fallible, reference-counted smart pointer.
//!
//! The kernel never panics on allocation failure, so `alloc::sync::Arc`
//! cannot be used directly (its constructor is infallible). This is a
//! minimal reimplementation whose constructor returns `AllocResult<Self>`,
//! along with a [`Weak`] counterpart used to break the owner/child cycles
//! that show up throughout the process and memory-object graphs (a process's
//! threads point back at their process, a shadow object's children point at
//! their parent, a vnode's open files point at the vnode).

use crate::errno::AllocError;
use alloc::alloc::{alloc, dealloc};
use core::{
	alloc::Layout,
	cell::UnsafeCell,
	fmt,
	marker::Unsize,
	ops::{CoerceUnsized, Deref},
	ptr::{self, NonNull},
	sync::atomic::{AtomicUsize, Ordering},
};

struct ArcInner<T: ?Sized> {
	strong: AtomicUsize,
	weak: AtomicUsize,
	value: UnsafeCell<T>,
}

/// A fallible, atomically reference-counted pointer.
pub struct Arc<T: ?Sized> {
	ptr: NonNull<ArcInner<T>>,
}

unsafe impl<T: ?Sized + Sync + Send> Send for Arc<T> {}
unsafe impl<T: ?Sized + Sync + Send> Sync for Arc<T> {}

impl<T> Arc<T> {
	/// Allocates a new reference-counted value, failing if memory is exhausted.
	pub fn new(value: T) -> Result<Self, AllocError> {
		let layout = Layout::new::<ArcInner<T>>();
		let raw = unsafe { alloc(layout) };
		let Some(ptr) = NonNull::new(raw as *mut ArcInner<T>) else {
			return Err(AllocError);
		};
		unsafe {
			ptr::write(
				ptr.as_ptr(),
				ArcInner {
					strong: AtomicUsize::new(1),
					weak: AtomicUsize::new(1),
					value: UnsafeCell::new(value),
				},
			);
		}
		Ok(Self { ptr })
	}
}

impl<T: ?Sized> Arc<T> {
	fn inner(&self) -> &ArcInner<T> {
		unsafe { self.ptr.as_ref() }
	}

	/// Returns the number of strong references to this value.
	pub fn strong_count(this: &Self) -> usize {
		this.inner().strong.load(Ordering::Acquire)
	}

	/// Returns whether `a` and `b` point to the same allocation.
	pub fn ptr_eq(a: &Self, b: &Self) -> bool {
		ptr::eq(a.ptr.as_ptr(), b.ptr.as_ptr())
	}

	/// Returns a raw pointer to the value, stable for the allocation's lifetime. Useful as an
	/// identity key; dereferencing it requires the `Arc` (or a clone) to still be alive.
	pub fn as_ptr(this: &Self) -> *const T {
		unsafe { UnsafeCell::raw_get(ptr::addr_of!((*this.ptr.as_ptr()).value)) }
	}

	/// Creates a new [`Weak`] pointer to this value.
	pub fn downgrade(this: &Self) -> Weak<T> {
		this.inner().weak.fetch_add(1, Ordering::AcqRel);
		Weak { ptr: this.ptr }
	}

	/// Returns a mutable reference if this is the only strong reference and there are no
	/// outstanding weak references, `None` otherwise.
	pub fn get_mut(this: &mut Self) -> Option<&mut T> {
		let inner = this.inner();
		if inner.strong.load(Ordering::Acquire) == 1 && inner.weak.load(Ordering::Acquire) == 1 {
			Some(unsafe { &mut *inner.value.get() })
		} else {
			None
		}
	}
}

impl<T: ?Sized> Deref for Arc<T> {
	type Target = T;

	fn deref(&self) -> &T {
		unsafe { &*self.inner().value.get() }
	}
}

impl<T: ?Sized> Clone for Arc<T> {
	fn clone(&self) -> Self {
		let prev = self.inner().strong.fetch_add(1, Ordering::AcqRel);
		debug_assert!(prev != 0, "cloned a dropped Arc");
		Self { ptr: self.ptr }
	}
}

impl<T: ?Sized> Drop for Arc<T> {
	fn drop(&mut self) {
		if self.inner().strong.fetch_sub(1, Ordering::AcqRel) != 1 {
			return;
		}
		core::sync::atomic::fence(Ordering::Acquire);
		unsafe {
			ptr::drop_in_place(self.inner().value.get());
		}
		drop_weak_ref(self.ptr);
	}
}

fn drop_weak_ref<T: ?Sized>(ptr: NonNull<ArcInner<T>>) {
	let inner = unsafe { ptr.as_ref() };
	if inner.weak.fetch_sub(1, Ordering::AcqRel) != 1 {
		return;
	}
	core::sync::atomic::fence(Ordering::Acquire);
	let layout = Layout::for_value(inner);
	unsafe {
		dealloc(ptr.as_ptr() as *mut u8, layout);
	}
}

impl<T: ?Sized + Unsize<U>, U: ?Sized> CoerceUnsized<Arc<U>> for Arc<T> {}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Arc<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&**self, f)
	}
}

/// A non-owning reference to an [`Arc`]'s value, upgradeable while at least one strong
/// reference remains alive.
pub struct Weak<T: ?Sized> {
	ptr: NonNull<ArcInner<T>>,
}

unsafe impl<T: ?Sized + Sync + Send> Send for Weak<T> {}
unsafe impl<T: ?Sized + Sync + Send> Sync for Weak<T> {}

impl<T: ?Sized> Weak<T> {
	/// Attempts to upgrade to a strong reference, returning `None` once the last
	/// [`Arc`] has been dropped.
	pub fn upgrade(&self) -> Option<Arc<T>> {
		let inner = unsafe { self.ptr.as_ref() };
		let mut cur = inner.strong.load(Ordering::Acquire);
		loop {
			if cur == 0 {
				return None;
			}
			match inner.strong.compare_exchange_weak(
				cur,
				cur + 1,
				Ordering::AcqRel,
				Ordering::Acquire,
			) {
				Ok(_) => return Some(Arc { ptr: self.ptr }),
				Err(observed) => cur = observed,
			}
		}
	}
}

impl<T: ?Sized> Clone for Weak<T> {
	fn clone(&self) -> Self {
		let inner = unsafe { self.ptr.as_ref() };
		inner.weak.fetch_add(1, Ordering::AcqRel);
		Self { ptr: self.ptr }
	}
}

impl<T: ?Sized> Drop for Weak<T> {
	fn drop(&mut self) {
		drop_weak_ref(self.ptr);
	}
}
