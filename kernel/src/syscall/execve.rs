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

//! The `exec` system call replaces the calling process's image with a new program.
//!
//! There is no ELF loader or user-mode instruction stream in this simulated architecture: a
//! "program" is just a regular, executable file on disk, and nothing actually decodes its bytes
//! into code. What `exec` models here is everything else a real `execve` does to the calling
//! process around the code swap: resetting its address space to empty, dropping its
//! close-on-exec descriptors, and handing back control to the same thread.

use crate::{
	arch::AddressSpace,
	file,
	file::{path::Path, perm},
	memory::vmmap::VmMap,
	process::proc::{HEAP_BASE, Process, USER_VPN_LIMIT},
	syscall::SyscallString,
};
use macros::syscall;
use utils::errno::Errno;

#[syscall]
pub fn execve(pathname: SyscallString, _argv: usize, _envp: usize) -> Result<isize, Errno> {
	let proc = Process::current();
	let map = proc.vmmap().lock();
	let path = pathname.copy_path_from_user(&map)?;
	drop(map);
	let path = Path::new(&path)?;

	let vnode = file::vfs::resolve(&file::root(), &proc.cwd(), path)?;
	if vnode.is_dir() {
		return Err(errno!(EISDIR));
	}
	if vnode.mode() & perm::S_IXUSR == 0 {
		return Err(errno!(EACCES));
	}

	*proc.vmmap().lock() = VmMap::new(USER_VPN_LIMIT);
	*proc.address_space().lock() = AddressSpace::new();
	*proc.brk().lock() = HEAP_BASE;
	let new_fds = proc.fds().lock().duplicate(true)?;
	*proc.fds().lock() = new_fds;
	Ok(0)
}
