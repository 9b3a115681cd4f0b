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

//! The cooperative, non-preemptive scheduler.
//!
//! There is exactly one CPU and no timer interrupt: a thread runs until it blocks on a wait
//! channel or calls [`crate::process::kthread::schedule`] explicitly. The run queue is a plain
//! FIFO, matching [`crate::sync::wait_queue::WaitQueue`]'s ordering guarantee.

use crate::{
	arch::{Arch, CurrentArch},
	process::kthread::{Thread, ThreadState},
	sync::IntSpin,
};
use utils::{collections::vec::Vec, ptr::arc::Arc};

struct State {
	run_queue: Vec<Arc<Thread>>,
	current: Option<Arc<Thread>>,
}

static STATE: IntSpin<Option<State>> = IntSpin::new(None);

fn with_state<F: FnOnce(&mut State) -> R, R>(f: F) -> R {
	let mut guard = STATE.lock();
	let state = guard.get_or_insert_with(|| State {
		run_queue: Vec::new(),
		current: None,
	});
	f(state)
}

/// Adds `thr` to the back of the run queue. `thr` must already be in the
/// [`ThreadState::Runnable`] state.
pub fn enqueue(thr: Arc<Thread>) {
	with_state(|s| s.run_queue.push(thr).ok());
}

/// Returns the thread currently executing on the CPU.
///
/// # Panics
///
/// Panics if called before any thread has been scheduled.
pub fn current() -> Arc<Thread> {
	with_state(|s| s.current.clone()).expect("no thread is currently running")
}

/// Picks the next runnable thread and switches the CPU to it.
///
/// If the calling thread is still [`ThreadState::Running`] (i.e. it yielded voluntarily rather
/// than going to sleep), it is moved back to [`ThreadState::Runnable`] and re-enqueued at the
/// back of the run queue, preserving FIFO fairness. If the run queue is empty, control returns
/// to the caller immediately (there is always at least the calling thread to resume, since a
/// hosted/simulated architecture's `context_switch` is a direct call rather than a true
/// suspension).
pub fn schedule() {
	let prev = with_state(|s| s.current.clone());
	if let Some(prev) = &prev {
		if prev.state() == ThreadState::Running {
			crate::process::kthread::set_state(prev, ThreadState::Runnable);
			enqueue(prev.clone());
		}
	}
	let next = with_state(|s| {
		if s.run_queue.is_empty() {
			None
		} else {
			Some(s.run_queue.remove(0))
		}
	});
	let Some(next) = next else {
		return;
	};
	crate::process::kthread::set_state(&next, ThreadState::Running);
	with_state(|s| s.current = Some(next));
	// A real architecture would save `prev`'s register file and restore `next`'s here. `SimArch`
	// has no separate register file to save: the bookkeeping above already models the effect of
	// the switch (the next iteration of `with_state` sees `next` as current).
	let _ = CurrentArch::tlb_flush_all;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		file::{perm, vfs::VNode},
		process::proc::Process,
	};

	struct NoOps;

	impl crate::file::vfs::VnodeOps for NoOps {
		fn lookup(&self, _: &VNode, _: &[u8]) -> utils::errno::EResult<Arc<VNode>> {
			Err(utils::errno!(ENOENT))
		}
		fn create(&self, _: &VNode, _: &[u8], _: u32) -> utils::errno::EResult<Arc<VNode>> {
			Err(utils::errno!(EROFS))
		}
		fn mkdir(&self, _: &VNode, _: &[u8], _: u32) -> utils::errno::EResult<Arc<VNode>> {
			Err(utils::errno!(EROFS))
		}
		fn mknod(&self, _: &VNode, _: &[u8], _: u32, _: u32) -> utils::errno::EResult<Arc<VNode>> {
			Err(utils::errno!(EROFS))
		}
		fn unlink(&self, _: &VNode, _: &[u8]) -> utils::errno::EResult<()> {
			Err(utils::errno!(EROFS))
		}
		fn rmdir(&self, _: &VNode, _: &[u8]) -> utils::errno::EResult<()> {
			Err(utils::errno!(EROFS))
		}
		fn link(&self, _: &VNode, _: &[u8], _: &VNode) -> utils::errno::EResult<()> {
			Err(utils::errno!(EROFS))
		}
		fn rename(&self, _: &VNode, _: &[u8], _: &VNode, _: &[u8]) -> utils::errno::EResult<()> {
			Err(utils::errno!(EROFS))
		}
		fn readdir(
			&self,
			_: &VNode,
			_: u64,
			_: &mut Vec<crate::file::vfs::Dirent>,
		) -> utils::errno::EResult<u64> {
			Ok(0)
		}
		fn truncate(&self, _: &VNode, _: u64) -> utils::errno::EResult<()> {
			Ok(())
		}
	}

	fn dummy_root() -> Arc<VNode> {
		VNode::new(
			1,
			perm::DEFAULT_DIR_MODE,
			0,
			2,
			crate::memory::mmobj::MmObj::new_anonymous().unwrap(),
			Arc::new(NoOps).unwrap(),
		)
		.unwrap()
	}

	fn reset() {
		*STATE.lock() = None;
	}

	#[test]
	fn run_queue_is_fifo() {
		reset();
		let proc = Process::init(dummy_root()).unwrap();
		let a = crate::process::kthread::create(&proc, |_| 0, 0).unwrap();
		let b = crate::process::kthread::create(&proc, |_| 0, 0).unwrap();
		schedule();
		assert!(Arc::ptr_eq(&current(), &a));
		schedule();
		assert!(Arc::ptr_eq(&current(), &b));
	}
}
