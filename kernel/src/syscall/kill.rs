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

//! The `kill` system call terminates another process.
//!
//! There is no general signal-delivery mechanism here: rather than queuing a signal for the
//! target to handle on its own schedule, `kill` marks the target a zombie immediately, the way
//! `SIGKILL` behaves on a real kernel. `sig` is kept purely for the caller's own bookkeeping
//! ([`ExitStatus::Killed`] records it) and is not validated against a signal set.

use crate::process::proc::{ExitStatus, Process, init_process};
use core::ffi::c_int;
use macros::syscall;
use utils::{errno, errno::Errno};

#[syscall]
pub fn kill(pid: c_int, sig: c_int) -> Result<isize, Errno> {
	let proc = Process::current();
	let pid: u16 = pid.try_into().map_err(|_| errno!(ESRCH))?;
	let target = if pid == proc.pid() {
		proc.clone()
	} else {
		init_process()
			.find_by_pid(pid)
			.ok_or_else(|| errno!(ESRCH))?
	};
	let init = init_process();
	target.do_exit(ExitStatus::Killed(sig), &init);
	Ok(0)
}
