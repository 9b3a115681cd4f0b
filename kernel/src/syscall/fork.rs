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

//! The `fork` system call duplicates the calling process into a new child.

use crate::process::{kthread, proc::Process};
use macros::syscall;
use utils::errno::Errno;

#[syscall]
pub fn fork() -> Result<isize, Errno> {
	let proc = Process::current();
	let child = proc.fork()?;
	let cur_thread = kthread::current();
	let child_thread = kthread::fork(&child, &cur_thread)?;
	child.add_thread(child_thread)?;
	Ok(child.pid() as isize)
}
