//! Shared, allocation-aware primitives used throughout the kernel.
//!
//! Everything here exists because the kernel cannot tolerate an allocation failure turning into
//! a panic or an abort: the standard library's `Vec`, `String`, `Arc`, etc. assume an infallible
//! global allocator, so this crate re-implements the subset the kernel actually needs with
//! fallible constructors and mutators instead.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![feature(allocator_api)]
#![feature(coerce_unsized)]
#![feature(negative_impls)]
#![feature(unsize)]

extern crate alloc;

pub mod boxed;
pub mod bytes;
pub mod collections;
pub mod errno;
pub mod interrupt;
pub mod limits;
pub mod lock;
pub mod ptr;

use core::fmt;

use errno::AllocResult;

/// Fallible equivalent of [`Clone`].
///
/// Implemented by every collection in this crate instead of `Clone`, so that duplicating a
/// value (forking a process's file descriptor table, copying a vnode's path) can report
/// allocation failure instead of aborting.
pub trait TryClone: Sized {
	/// Clones `self`, or fails if memory is exhausted.
	fn try_clone(&self) -> AllocResult<Self>;
}

macro_rules! try_clone_via_copy {
	($($t:ty),*) => {
		$(
			impl TryClone for $t {
				fn try_clone(&self) -> AllocResult<Self> {
					Ok(*self)
				}
			}
		)*
	};
}

try_clone_via_copy!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, bool, char);

/// Wraps a byte slice to implement [`fmt::Display`]/[`fmt::Debug`] by lossily decoding it as
/// UTF-8, for printing filenames and other kernel byte strings that are not guaranteed to be
/// valid UTF-8.
pub struct DisplayableStr<'s>(pub &'s [u8]);

impl fmt::Display for DisplayableStr<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for chunk in self.0.utf8_chunks() {
			f.write_str(chunk.valid())?;
			if !chunk.invalid().is_empty() {
				f.write_str("\u{fffd}")?;
			}
		}
		Ok(())
	}
}

impl fmt::Debug for DisplayableStr<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "\"{self}\"")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn displayable_str_renders_ascii() {
		assert_eq!(alloc::format!("{}", DisplayableStr(b"etc")), "etc");
	}

	#[test]
	fn try_clone_on_primitives() {
		assert_eq!(42u32.try_clone().unwrap(), 42);
	}
}
