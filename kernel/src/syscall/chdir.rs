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

//! The `chdir` system call changes the current working directory of the calling process.

use crate::{file, file::path::Path, process::proc::Process, syscall::SyscallString};
use macros::syscall;
use utils::errno::{self, Errno};

#[syscall]
pub fn chdir(path: SyscallString) -> Result<isize, Errno> {
	let proc = Process::current();
	let map = proc.vmmap().lock();
	let path = path.copy_path_from_user(&map)?;
	drop(map);
	let path = Path::new(&path)?;

	let vnode = file::vfs::resolve(&file::root(), &proc.cwd(), path)?;
	if !vnode.is_dir() {
		return Err(errno!(ENOTDIR));
	}
	proc.set_cwd(vnode);
	Ok(0)
}
