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

//! PID allocation.
//!
//! Every process has a unique PID, allocated from a bitfield-backed pool.

use crate::sync::Spin;
use core::ops::Deref;
use utils::{collections::id_allocator::IDAllocator, errno::AllocResult};

/// A process identifier.
pub type Pid = u16;

/// The maximum possible PID.
const MAX_PID: Pid = 32768;
/// Reserved PID for the idle task.
pub const IDLE_PID: Pid = 0;
/// PID of the init process, the root of the process tree and the reparenting target for
/// orphaned children.
pub const INIT_PID: Pid = 1;

static ALLOCATOR: Spin<Option<IDAllocator>> = Spin::new(None);

fn allocator_do<T, F: FnOnce(&mut IDAllocator) -> AllocResult<T>>(f: F) -> AllocResult<T> {
	let mut allocator = ALLOCATOR.lock();
	let allocator = match &mut *allocator {
		Some(a) => a,
		None => allocator.insert(IDAllocator::new(MAX_PID as usize)?),
	};
	f(allocator)
}

/// An allocated PID, returned to the pool on drop.
#[derive(Debug)]
pub struct PidHandle(Pid);

impl PidHandle {
	/// Allocates and marks `pid` used specifically (for the idle task and init, whose PIDs are
	/// fixed rather than chosen by the allocator).
	pub fn reserve(pid: Pid) -> AllocResult<Self> {
		let Some(id) = pid.checked_sub(1) else {
			// PID 0 (idle) is never tracked by the allocator.
			return Ok(Self(pid));
		};
		allocator_do(|a| {
			if a.is_used(id as usize) {
				Err(utils::errno::AllocError)
			} else {
				a.set_used(id as usize);
				Ok(Self(pid))
			}
		})
	}

	/// Allocates the next free PID.
	pub fn unique() -> AllocResult<Self> {
		allocator_do(|a| a.alloc(None)).map(|id| Self((id + 1) as Pid))
	}
}

impl Deref for PidHandle {
	type Target = Pid;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl Drop for PidHandle {
	fn drop(&mut self) {
		let Some(id) = self.0.checked_sub(1) else {
			return;
		};
		let _ = allocator_do(|a| {
			a.free(id as usize);
			Ok(())
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unique_pids_differ() {
		let a = PidHandle::unique().unwrap();
		let b = PidHandle::unique().unwrap();
		assert_ne!(*a, *b);
	}
}
