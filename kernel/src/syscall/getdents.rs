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

//! The `getdents` system call reads a directory's entries into a caller-supplied buffer.

use crate::{process::proc::Process, syscall::copy_out_bytes};
use core::{ffi::c_int, mem::size_of};
use macros::syscall;
use utils::{bytes::as_bytes, collections::vec::Vec, errno, errno::Errno};

/// A directory entry record, as written into the caller's buffer.
///
/// Followed immediately by `name_len` bytes of the entry's name, not NUL-terminated. `reclen` is
/// the total size of the record including the name, rounded up to 8 bytes.
#[derive(Debug)]
#[repr(C)]
struct DirRecord {
	ino: u64,
	reclen: u16,
	is_dir: u8,
	name_len: u8,
}

#[syscall]
pub fn getdents(fd: c_int, dirp: usize, count: usize) -> Result<isize, Errno> {
	let proc = Process::current();
	let open_file = proc.fds().lock().get_fd(fd)?.get_file().clone();
	let vnode = open_file.vnode().clone();
	if !vnode.is_dir() {
		return Err(errno!(ENOTDIR));
	}

	let mut entries = Vec::new();
	let next = vnode.readdir(open_file.offset(), &mut entries)?;

	// `readdir` hands back every entry from the current offset to the end of the directory in one
	// shot, so a buffer too small to hold all of them would otherwise force us to either drop
	// entries or fabricate a resume point finer than this filesystem's directory offsets support.
	// Require the caller to retry with a bigger buffer instead.
	let total: usize = entries
		.iter()
		.map(|e| (size_of::<DirRecord>() + e.name.len()).next_multiple_of(8))
		.sum();
	if total > count {
		return Err(errno!(EINVAL));
	}

	let map = proc.vmmap().lock();
	let mut buf_off = 0;
	for entry in entries.iter() {
		let reclen = (size_of::<DirRecord>() + entry.name.len()).next_multiple_of(8);
		let record = DirRecord {
			ino: entry.ino,
			reclen: reclen as u16,
			is_dir: entry.is_dir as u8,
			name_len: entry.name.len() as u8,
		};
		copy_out_bytes(&map, dirp + buf_off, as_bytes(&record))?;
		copy_out_bytes(
			&map,
			dirp + buf_off + size_of::<DirRecord>(),
			entry.name.as_bytes(),
		)?;
		buf_off += reclen;
	}
	drop(map);

	open_file.set_offset(next);
	Ok(buf_off as isize)
}
