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

//! File status system calls.

use crate::{
	file,
	file::{path::Path, vfs::VNode},
	process::proc::Process,
	syscall::{SyscallPtr, SyscallString},
};
use core::ffi::c_int;
use macros::syscall;
use utils::{errno::Errno, ptr::arc::Arc};

/// A minimal snapshot of an inode's metadata, as reported by `stat`/`fstat`/`lstat`.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Stat {
	pub ino: u64,
	pub mode: u32,
	pub nlink: u32,
	pub size: u64,
	pub devid: u32,
}

fn vnode_stat(vnode: &Arc<VNode>) -> Stat {
	Stat {
		ino: vnode.ino as u64,
		mode: vnode.mode(),
		nlink: vnode.nlink(),
		size: vnode.size(),
		devid: vnode.devid(),
	}
}

#[syscall]
pub fn stat(pathname: SyscallString, statbuf: SyscallPtr<Stat>) -> Result<isize, Errno> {
	let proc = Process::current();
	let map = proc.vmmap().lock();
	let path = pathname.copy_path_from_user(&map)?;
	let path = Path::new(&path)?;

	let vnode = file::vfs::resolve(&file::root(), &proc.cwd(), path)?;
	statbuf.copy_to_user(&map, vnode_stat(&vnode))?;
	Ok(0)
}

// This filesystem has no symbolic links, so `lstat` behaves exactly like `stat`.
#[syscall]
pub fn lstat(pathname: SyscallString, statbuf: SyscallPtr<Stat>) -> Result<isize, Errno> {
	let proc = Process::current();
	let map = proc.vmmap().lock();
	let path = pathname.copy_path_from_user(&map)?;
	let path = Path::new(&path)?;

	let vnode = file::vfs::resolve(&file::root(), &proc.cwd(), path)?;
	statbuf.copy_to_user(&map, vnode_stat(&vnode))?;
	Ok(0)
}

#[syscall]
pub fn fstat(fd: c_int, statbuf: SyscallPtr<Stat>) -> Result<isize, Errno> {
	let proc = Process::current();
	let open_file = proc.fds().lock().get_fd(fd)?.get_file().clone();
	let map = proc.vmmap().lock();
	statbuf.copy_to_user(&map, vnode_stat(open_file.vnode()))?;
	Ok(0)
}
