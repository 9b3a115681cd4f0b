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

//! The `waitpid` system call blocks until a child process becomes a zombie, then reaps it.

use crate::{
	process::proc::{Process, do_waitpid},
	syscall::SyscallPtr,
};
use core::ffi::c_int;
use macros::syscall;
use utils::errno::Errno;

#[syscall]
pub fn waitpid(pid: c_int, wstatus: SyscallPtr<c_int>, _options: c_int) -> Result<isize, Errno> {
	let proc = Process::current();
	let (child_pid, status) = do_waitpid(&proc, pid)?;
	if wstatus.addr().is_some() {
		let map = proc.vmmap().lock();
		wstatus.copy_to_user(&map, status.to_wait_status())?;
	}
	Ok(child_pid as _)
}
