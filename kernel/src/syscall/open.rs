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

//! The `open` system call opens a file, creating it first if requested, and installs a file
//! descriptor pointing to it in the calling process's table.

use crate::{
	file,
	file::{
		fd::{FileDescriptor, OpenFile, FD_CLOEXEC},
		path::Path,
		perm, vfs,
	},
	process::proc::Process,
	syscall::{SyscallString, O_CLOEXEC, O_CREAT, O_DIRECTORY, O_EXCL, O_TRUNC},
};
use core::ffi::c_int;
use macros::syscall;
use utils::errno::{self, Errno};

#[syscall]
pub fn open(pathname: SyscallString, flags: c_int, mode: u32) -> Result<isize, Errno> {
	let proc = Process::current();
	let map = proc.vmmap().lock();
	let path = pathname.copy_path_from_user(&map)?;
	drop(map);
	let path = Path::new(&path)?;

	let root = file::root();
	let cwd = proc.cwd();
	let resolved = vfs::resolve(&root, &cwd, path);
	let vnode = match resolved {
		Ok(vn) => {
			if flags & O_CREAT != 0 && flags & O_EXCL != 0 {
				return Err(errno!(EEXIST));
			}
			vn
		}
		Err(errno::Errno::ENOENT) if flags & O_CREAT != 0 => {
			let (parent, name) = vfs::resolve_parent(&root, &cwd, path)?;
			let file_mode = (mode & 0o7777) | perm::S_IFREG;
			parent.create(name, file_mode)?
		}
		Err(e) => return Err(e),
	};
	if flags & O_DIRECTORY != 0 && !vnode.is_dir() {
		return Err(errno!(ENOTDIR));
	}
	if flags & O_TRUNC != 0 && perm::is_regular(vnode.mode()) {
		vnode.truncate(0)?;
	}
	let status_flags = flags & !(O_CREAT | O_EXCL | O_DIRECTORY | O_CLOEXEC);
	let open_file = OpenFile::new(vnode, status_flags)?;
	let fd_flags = if flags & O_CLOEXEC != 0 { FD_CLOEXEC } else { 0 };
	let (fd, _) = proc.fds().lock().create_fd(fd_flags, open_file)?;
	Ok(fd as isize)
}
