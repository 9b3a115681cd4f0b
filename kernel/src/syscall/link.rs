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

//! The `link` system call creates a new hard link to an existing file.

use crate::{file, file::path::Path, process::proc::Process, syscall::SyscallString};
use macros::syscall;
use utils::errno::Errno;

#[syscall]
pub fn link(oldpath: SyscallString, newpath: SyscallString) -> Result<isize, Errno> {
	let proc = Process::current();
	let map = proc.vmmap().lock();
	let old = oldpath.copy_path_from_user(&map)?;
	let new = newpath.copy_path_from_user(&map)?;
	drop(map);
	let old = Path::new(&old)?;
	let new = Path::new(&new)?;

	let root = file::root();
	let cwd = proc.cwd();
	let target = file::vfs::resolve(&root, &cwd, old)?;
	let (parent, name) = file::vfs::resolve_parent(&root, &cwd, new)?;
	parent.link(name, &target)?;
	Ok(0)
}
