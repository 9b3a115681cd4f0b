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

//! System calls: the boundary between a process and the kernel.
//!
//! Each syscall lives in its own submodule and is implemented with the [`macros::syscall`]
//! attribute, which rewrites a plain function taking typed parameters into one taking the raw
//! [`SyscallArgs`] register bundle and returning the `isize` a caller expects back. Parameters
//! whose type name starts with `Syscall` (see [`SyscallPtr`], [`SyscallSlice`], [`SyscallString`])
//! are built from the raw register value with `From<usize>`; every other parameter is a plain
//! `as` cast, so most syscalls read like ordinary, safely-typed Rust functions.
//!
//! There is no ring transition in this simulated architecture: a syscall runs on the calling
//! thread's own stack with the calling process's address space already current, so "copying"
//! to/from user memory does not need a page-table walk through [`crate::arch::AddressSpace`] the
//! way [`crate::memory::fault::handle_page_fault`] does for an instruction fetch/store. It only
//! needs to find which [`VmArea`] backs a virtual page and read/write the frame behind it,
//! exactly the way [`VNode::read_at`](crate::file::vfs::VNode::read_at) and
//! [`write_at`](crate::file::vfs::VNode::write_at) already do for file content.

pub mod _exit;
pub mod _llseek;
pub mod brk;
pub mod chdir;
pub mod close;
pub mod dup;
pub mod dup2;
pub mod execve;
pub mod fork;
pub mod getdents;
pub mod getpid;
pub mod kill;
pub mod link;
pub mod mkdir;
pub mod mknod;
pub mod mmap;
pub mod munmap;
pub mod open;
pub mod read;
pub mod rename;
pub mod rmdir;
pub mod stat;
pub mod unlink;
pub mod waitpid;
pub mod write;

use crate::{
	file::path::Path,
	memory::vmmap::VmMap,
};
use core::{ffi::c_void, fmt, marker::PhantomData, ptr::NonNull};
use utils::{
	collections::vec::Vec,
	errno,
	errno::{EResult, Errno},
	limits,
};

/// The raw argument registers a syscall is invoked with, in calling-convention order.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyscallArgs {
	pub arg0: usize,
	pub arg1: usize,
	pub arg2: usize,
	pub arg3: usize,
	pub arg4: usize,
	pub arg5: usize,
}

/// Dispatches `num` with `args` to the matching syscall handler, converting an error result to
/// the negated-errno convention `read(2)`/`write(2)`/etc. return it in.
pub fn dispatch(num: usize, args: &SyscallArgs) -> isize {
	let result = match num {
		SYS_EXIT => _exit::_exit(args),
		SYS_FORK => fork::fork(args),
		SYS_READ => read::read(args),
		SYS_WRITE => write::write(args),
		SYS_OPEN => open::open(args),
		SYS_CLOSE => close::close(args),
		SYS_WAITPID => waitpid::waitpid(args),
		SYS_LINK => link::link(args),
		SYS_UNLINK => unlink::unlink(args),
		SYS_EXECVE => execve::execve(args),
		SYS_CHDIR => chdir::chdir(args),
		SYS_MKNOD => mknod::mknod(args),
		SYS_STAT => stat::stat(args),
		SYS_LSEEK => _llseek::_llseek(args),
		SYS_GETPID => getpid::getpid(args),
		SYS_KILL => kill::kill(args),
		SYS_RENAME => rename::rename(args),
		SYS_MKDIR => mkdir::mkdir(args),
		SYS_RMDIR => rmdir::rmdir(args),
		SYS_DUP => dup::dup(args),
		SYS_BRK => brk::brk(args),
		SYS_DUP2 => dup2::dup2(args),
		SYS_GETDENTS => getdents::getdents(args),
		SYS_MMAP => mmap::mmap(args),
		SYS_MUNMAP => munmap::munmap(args),
		_ => Err(errno!(EINVAL)),
	};
	result.unwrap_or_else(|e: Errno| e.to_return_value())
}

macro_rules! syscall_numbers {
	($($name:ident = $val:expr,)*) => {
		$(pub const $name: usize = $val;)*
	};
}

syscall_numbers! {
	SYS_EXIT = 1,
	SYS_FORK = 2,
	SYS_READ = 3,
	SYS_WRITE = 4,
	SYS_OPEN = 5,
	SYS_CLOSE = 6,
	SYS_WAITPID = 7,
	SYS_LINK = 9,
	SYS_UNLINK = 10,
	SYS_EXECVE = 11,
	SYS_CHDIR = 12,
	SYS_MKNOD = 14,
	SYS_STAT = 18,
	SYS_LSEEK = 19,
	SYS_GETPID = 20,
	SYS_KILL = 37,
	SYS_RENAME = 38,
	SYS_MKDIR = 39,
	SYS_RMDIR = 40,
	SYS_DUP = 41,
	SYS_BRK = 45,
	SYS_DUP2 = 63,
	SYS_GETDENTS = 141,
	SYS_MMAP = 192,
	SYS_MUNMAP = 91,
}

/// `open(2)` flag: open for reading only.
pub const O_RDONLY: i32 = 0o0;
/// `open(2)` flag: open for writing only.
pub const O_WRONLY: i32 = 0o1;
/// `open(2)` flag: open for reading and writing.
pub const O_RDWR: i32 = 0o2;
/// `open(2)` flag: create the file if it doesn't exist.
pub const O_CREAT: i32 = 0o100;
/// `open(2)` flag: fail if the file already exists (with `O_CREAT`).
pub const O_EXCL: i32 = 0o200;
/// `open(2)` flag: truncate an existing regular file to length 0.
pub const O_TRUNC: i32 = 0o1000;
/// `open(2)` flag: writes always land at the current end of file.
pub const O_APPEND: i32 = 0o2000;
/// `open(2)` flag: fail unless the resolved path is a directory.
pub const O_DIRECTORY: i32 = 0o200000;
/// `open(2)` flag: set `FD_CLOEXEC` on the returned descriptor.
pub const O_CLOEXEC: i32 = 0o2000000;

/// `mmap(2)` flag: the mapping is not backed by any file.
pub const MAP_ANONYMOUS: i32 = 0x20;
/// `mmap(2)` flag: place the mapping at exactly `addr`, failing instead of picking a nearby one.
pub const MAP_FIXED: i32 = 0x10;
/// `mmap(2)` flag: the mapping is private to the calling process (copy-on-write).
pub const MAP_PRIVATE: i32 = 0x02;
/// `mmap(2)` flag: the mapping is shared with other mappers of the same object.
pub const MAP_SHARED: i32 = 0x01;

/// `mmap(2)` protection: page is readable.
pub const PROT_READ: i32 = 0x1;
/// `mmap(2)` protection: page is writable.
pub const PROT_WRITE: i32 = 0x2;
/// `mmap(2)` protection: page is executable.
pub const PROT_EXEC: i32 = 0x4;

/// Copies `buf.len()` bytes out of the pages `map` has mapped at `addr`, which must lie entirely
/// within one or more readable areas.
///
/// Mirrors [`VNode::read_at`](crate::file::vfs::VNode::read_at)'s page walk: content lives behind
/// an [`MmObj`](crate::memory::mmobj::MmObj), so reading it back out is a matter of resolving the
/// owning area and calling [`fill_page`](crate::memory::mmobj::MmObj::fill_page), never a raw
/// pointer dereference.
pub fn copy_in_bytes(map: &VmMap, addr: usize, buf: &mut [u8]) -> EResult<()> {
	let mut done = 0;
	while done < buf.len() {
		let pos = addr + done;
		let vpn = pos / limits::PAGE_SIZE;
		let page_off = pos % limits::PAGE_SIZE;
		let area = map.lookup(vpn).ok_or(errno::Errno::EFAULT)?;
		if !area.prot.user {
			return Err(errno::Errno::EFAULT);
		}
		let chunk = (limits::PAGE_SIZE - page_off).min(buf.len() - done);
		let frame = area.obj.fill_page(area.obj_pagenum(vpn))?;
		frame.with_data(|d| buf[done..done + chunk].copy_from_slice(&d[page_off..page_off + chunk]));
		done += chunk;
	}
	Ok(())
}

/// Copies `buf` into the pages `map` has mapped at `addr`, which must lie entirely within one or
/// more writable areas.
pub fn copy_out_bytes(map: &VmMap, addr: usize, buf: &[u8]) -> EResult<()> {
	let mut done = 0;
	while done < buf.len() {
		let pos = addr + done;
		let vpn = pos / limits::PAGE_SIZE;
		let page_off = pos % limits::PAGE_SIZE;
		let area = map.lookup(vpn).ok_or(errno::Errno::EFAULT)?;
		if !area.prot.user || !area.prot.writable {
			return Err(errno::Errno::EFAULT);
		}
		let chunk = (limits::PAGE_SIZE - page_off).min(buf.len() - done);
		let frame = area.obj.dirty_page(area.obj_pagenum(vpn))?;
		frame.with_data_mut(|d| d[page_off..page_off + chunk].copy_from_slice(&buf[done..done + chunk]));
		done += chunk;
	}
	Ok(())
}

/// Reads a NUL-terminated string out of `map` starting at `addr`, up to `limits::PATH_MAX` bytes
/// including the terminator. Used for path and `execve` string arguments.
pub fn read_c_string(map: &VmMap, addr: usize) -> EResult<Vec<u8>> {
	let mut out = Vec::new();
	let mut pos = addr;
	loop {
		if out.len() >= limits::PATH_MAX {
			return Err(errno::Errno::ENAMETOOLONG);
		}
		let mut byte = [0u8; 1];
		copy_in_bytes(map, pos, &mut byte)?;
		if byte[0] == 0 {
			return Ok(out);
		}
		out.push(byte[0])?;
		pos += 1;
	}
}

/// A possibly-null user-space pointer to a single `T`, passed by raw register value.
///
/// Grounded on the teacher's `process::mem_space::copy::SyscallPtr`: same role (a typed, checked
/// handle to one user-space value), but copying here walks the calling process's [`VmMap`] rather
/// than dereferencing a pointer mapped live in the kernel's own address space, since there is no
/// such live mapping to dereference in this simulated architecture.
pub struct SyscallPtr<T>(Option<NonNull<c_void>>, PhantomData<T>);

impl<T> From<usize> for SyscallPtr<T> {
	fn from(val: usize) -> Self {
		Self(NonNull::new(val as *mut c_void), PhantomData)
	}
}

impl<T> fmt::Debug for SyscallPtr<T> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.0 {
			Some(ptr) => write!(f, "{:#x}", ptr.as_ptr() as usize),
			None => write!(f, "NULL"),
		}
	}
}

impl<T: Copy> SyscallPtr<T> {
	/// Returns the raw address, or `None` if the pointer is null.
	pub fn addr(&self) -> Option<usize> {
		self.0.map(|p| p.as_ptr() as usize)
	}

	/// Copies the pointee out of `map`. Fails with `EFAULT` on a null pointer.
	pub fn copy_from_user(&self, map: &VmMap) -> EResult<T> {
		let addr = self.addr().ok_or(errno::Errno::EFAULT)?;
		let mut buf = [0u8; core::mem::size_of::<T>()];
		copy_in_bytes(map, addr, &mut buf)?;
		// SAFETY: `buf` holds exactly `size_of::<T>()` freshly-copied bytes; `T: Copy` rules out
		// any drop glue or validity invariant this read could violate beyond plain bit patterns.
		Ok(unsafe { buf.as_ptr().cast::<T>().read_unaligned() })
	}

	/// Writes `val` into the pointee in `map`. Fails with `EFAULT` on a null pointer.
	pub fn copy_to_user(&self, map: &VmMap, val: T) -> EResult<()> {
		let addr = self.addr().ok_or(errno::Errno::EFAULT)?;
		// SAFETY: reading `size_of::<T>()` bytes out of a `T` we were just given by value.
		let buf = unsafe {
			core::slice::from_raw_parts((&val as *const T).cast::<u8>(), core::mem::size_of::<T>())
		};
		copy_out_bytes(map, addr, buf)
	}
}

/// A possibly-null user-space pointer to `len` contiguous `T`s.
pub struct SyscallSlice<T> {
	ptr: Option<NonNull<c_void>>,
	_marker: PhantomData<T>,
}

impl<T> From<usize> for SyscallSlice<T> {
	fn from(val: usize) -> Self {
		Self {
			ptr: NonNull::new(val as *mut c_void),
			_marker: PhantomData,
		}
	}
}

impl<T> fmt::Debug for SyscallSlice<T> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.ptr {
			Some(ptr) => write!(f, "{:#x}", ptr.as_ptr() as usize),
			None => write!(f, "NULL"),
		}
	}
}

impl SyscallSlice<u8> {
	fn addr(&self) -> Option<usize> {
		self.ptr.map(|p| p.as_ptr() as usize)
	}

	/// Copies `len` bytes out of the user-space slice into `buf`. Fails with `EFAULT` on a null
	/// pointer.
	pub fn copy_from_user(&self, map: &VmMap, buf: &mut [u8]) -> EResult<()> {
		let addr = self.addr().ok_or(errno::Errno::EFAULT)?;
		copy_in_bytes(map, addr, buf)
	}

	/// Copies `buf` into the user-space slice. Fails with `EFAULT` on a null pointer.
	pub fn copy_to_user(&self, map: &VmMap, buf: &[u8]) -> EResult<()> {
		let addr = self.addr().ok_or(errno::Errno::EFAULT)?;
		copy_out_bytes(map, addr, buf)
	}
}

/// A possibly-null user-space NUL-terminated path or string argument.
pub struct SyscallString(Option<NonNull<c_void>>);

impl From<usize> for SyscallString {
	fn from(val: usize) -> Self {
		Self(NonNull::new(val as *mut c_void))
	}
}

impl fmt::Debug for SyscallString {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.0 {
			Some(ptr) => write!(f, "{:#x}", ptr.as_ptr() as usize),
			None => write!(f, "NULL"),
		}
	}
}

impl SyscallString {
	/// Copies the string out of `map` and returns it as an owned byte buffer. Fails with
	/// `EFAULT` on a null pointer.
	pub fn copy_from_user(&self, map: &VmMap) -> EResult<Vec<u8>> {
		let addr = self.0.ok_or(errno::Errno::EFAULT)?.as_ptr() as usize;
		read_c_string(map, addr)
	}

	/// Copies the string out of `map` and resolves it as a [`Path`], handing both back to the
	/// caller so the owning buffer outlives the borrow.
	pub fn copy_path_from_user(&self, map: &VmMap) -> EResult<Vec<u8>> {
		let bytes = self.copy_from_user(map)?;
		// Validated eagerly so callers get EINVAL up front rather than after resolving it.
		Path::new(&bytes)?;
		Ok(bytes)
	}
}
