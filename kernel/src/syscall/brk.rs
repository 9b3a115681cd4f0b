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

//! The `brk` system call grows or shrinks the calling process's heap.
//!
//! The heap is modeled as a single anonymous [`VmArea`](crate::memory::vmmap::VmArea) starting
//! at [`HEAP_BASE`], whose page count is adjusted to match the requested break address. Passing
//! `0` queries the current break without changing anything, same as the raw Linux syscall.

use crate::{
	arch::PageFlags,
	memory::mmobj::MmObj,
	process::proc::{HEAP_BASE, HEAP_BASE_VPN, USER_VPN_LIMIT, Process},
};
use macros::syscall;
use utils::{errno::Errno, limits};

#[syscall]
pub fn brk(addr: usize) -> Result<isize, Errno> {
	let proc = Process::current();
	let mut brk = proc.brk().lock();

	if addr == 0 {
		return Ok(*brk as isize);
	}
	let new_addr = addr.clamp(HEAP_BASE, USER_VPN_LIMIT * limits::PAGE_SIZE);

	let old_pages = (*brk - HEAP_BASE).div_ceil(limits::PAGE_SIZE);
	let new_pages = (new_addr - HEAP_BASE).div_ceil(limits::PAGE_SIZE);
	let mut map = proc.vmmap().lock();
	if new_pages > old_pages {
		let obj = MmObj::new_anonymous()?;
		let flags = PageFlags {
			writable: true,
			executable: false,
			user: true,
		};
		if map
			.map(Some(HEAP_BASE_VPN + old_pages), new_pages - old_pages, flags, obj, 0, true)
			.is_err()
		{
			return Ok(*brk as isize);
		}
	} else if new_pages < old_pages {
		map.remove(HEAP_BASE_VPN + new_pages, old_pages - new_pages)?;
	}
	drop(map);

	*brk = new_addr;
	Ok(new_addr as isize)
}
