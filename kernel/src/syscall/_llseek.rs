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

//! The `_llseek` system call repositions the offset of a file descriptor.

use crate::{process::proc::Process, syscall::SyscallPtr};
use core::ffi::{c_int, c_uint, c_ulong};
use macros::syscall;
use utils::errno::{self, Errno};

/// Sets the offset from the given value.
const SEEK_SET: u32 = 0;
/// Sets the offset relative to the current offset.
const SEEK_CUR: u32 = 1;
/// Sets the offset relative to the end of the file.
const SEEK_END: u32 = 2;

#[syscall]
pub fn _llseek(
	fd: c_int,
	offset_high: c_ulong,
	offset_low: c_ulong,
	result: SyscallPtr<u64>,
	whence: c_uint,
) -> Result<isize, Errno> {
	let proc = Process::current();
	let open_file = proc.fds().lock().get_fd(fd)?.get_file().clone();

	let off = ((offset_high as u64) << 32) | (offset_low as u64);
	let off = match whence {
		SEEK_SET => off,
		SEEK_CUR => open_file
			.offset()
			.checked_add(off)
			.ok_or_else(|| errno!(EINVAL))?,
		SEEK_END => open_file
			.vnode()
			.size()
			.checked_add(off)
			.ok_or_else(|| errno!(EINVAL))?,
		_ => return Err(errno!(EINVAL)),
	};

	if result.addr().is_some() {
		let map = proc.vmmap().lock();
		result.copy_to_user(&map, off)?;
	}
	open_file.set_offset(off);
	Ok(0)
}
