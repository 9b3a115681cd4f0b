//! Kernel-wide error codes.
//!
//! Every fallible operation below the system call boundary returns an
//! [`Errno`] through [`EResult`]. The syscall dispatcher is the only place
//! that turns an [`Errno`] into the negative integer handed back to
//! userspace.

use core::fmt;

/// A kernel error code, one variant per POSIX errno the core subsystems use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum Errno {
	/// Argument list too long / invalid argument.
	EINVAL = 1,
	/// Bad file descriptor.
	EBADF,
	/// Too many open files (per-process table full).
	EMFILE,
	/// Too many open files system-wide.
	ENFILE,
	/// No such file or directory.
	ENOENT,
	/// Is a directory.
	EISDIR,
	/// Not a directory.
	ENOTDIR,
	/// File exists.
	EEXIST,
	/// File name too long.
	ENAMETOOLONG,
	/// Directory not empty.
	ENOTEMPTY,
	/// No space left on device.
	ENOSPC,
	/// Out of memory.
	ENOMEM,
	/// No child processes.
	ECHILD,
	/// Bad address.
	EFAULT,
	/// Permission denied.
	EACCES,
	/// Operation not permitted.
	EPERM,
	/// Interrupted system call.
	EINTR,
	/// No such process.
	ESRCH,
	/// Inappropriate ioctl / not supported.
	ENOTTY,
	/// Resource deadlock / recursive lock acquisition.
	EDEADLK,
	/// Read-only filesystem.
	EROFS,
	/// No such device.
	ENXIO,
	/// Cross-device link.
	EXDEV,
	/// File too large.
	EFBIG,
}

impl Errno {
	/// Returns the value to hand back to userspace: the negated errno.
	pub fn to_return_value(self) -> isize {
		-(self as i32 as isize)
	}
}

impl fmt::Display for Errno {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{self:?}")
	}
}

/// Out-of-memory marker for allocation-only fallible paths.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AllocError;

impl From<core::alloc::AllocError> for AllocError {
	fn from(_: core::alloc::AllocError) -> Self {
		AllocError
	}
}

impl From<AllocError> for Errno {
	fn from(_: AllocError) -> Self {
		Errno::ENOMEM
	}
}

impl From<core::alloc::AllocError> for Errno {
	fn from(_: core::alloc::AllocError) -> Self {
		Errno::ENOMEM
	}
}

impl From<core::alloc::LayoutError> for Errno {
	fn from(_: core::alloc::LayoutError) -> Self {
		Errno::ENOMEM
	}
}

/// Result type for allocation-only fallible paths.
pub type AllocResult<T> = Result<T, AllocError>;

/// Result type for any other kernel-internal fallible path.
pub type EResult<T> = Result<T, Errno>;

/// Builds an [`Errno`] value by its bare variant name.
///
/// ```ignore
/// return Err(errno!(ENOENT));
/// ```
#[macro_export]
macro_rules! errno {
	($variant:ident) => {
		$crate::errno::Errno::$variant
	};
}

/// Helper for folding a [`Vec`](alloc::vec::Vec) of fallible results collected via
/// `.collect::<CollectResult<_>>()`.
///
/// Mirrors the teacher's `CollectResult` newtype: collecting an iterator of
/// `Result<T, E>` into `CollectResult<C>` short-circuits on the first error
/// while still building the container with a single pass.
pub struct CollectResult<C>(pub Result<C, AllocError>);

impl<C: Default + Extend<T>, T> FromIterator<AllocResult<T>> for CollectResult<C> {
	fn from_iter<I: IntoIterator<Item = AllocResult<T>>>(iter: I) -> Self {
		let mut out = C::default();
		for item in iter {
			match item {
				Ok(v) => out.extend(core::iter::once(v)),
				Err(e) => return CollectResult(Err(e)),
			}
		}
		CollectResult(Ok(out))
	}
}
