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

//! The `read` system call reads from an open file descriptor.
//!
//! A character device node is read straight from its driver, bypassing the page-cache path
//! [`crate::file::fd::OpenFile::read`] otherwise takes: a device has no backing
//! [`crate::memory::mmobj::MmObj`] content to fault in, only a live stream.

use crate::{device, file::perm, process::proc::Process, syscall::SyscallSlice};
use core::{cmp::min, ffi::c_int};
use macros::syscall;
use utils::{collections::vec::Vec, errno::Errno, limits, vec};

#[syscall]
pub fn read(fd: c_int, buf: SyscallSlice<u8>, count: usize) -> Result<isize, Errno> {
	let len = min(count, limits::PAGE_SIZE * 16);
	if len == 0 {
		return Ok(0);
	}
	let proc = Process::current();
	let open_file = proc.fds().lock().get_fd(fd)?.get_file().clone();
	let vnode = open_file.vnode().clone();

	let mut data: Vec<u8> = vec![0u8; len]?;
	let n = if perm::is_device(vnode.mode()) && vnode.mode() & perm::S_IFMT == perm::S_IFCHR {
		device::char_device(vnode.devid())?.read(&mut data)?
	} else {
		open_file.read(&mut data)?
	};

	let map = proc.vmmap().lock();
	buf.copy_to_user(&map, &data[..n])?;
	Ok(n as isize)
}
