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

//! Kernel threads: the unit the scheduler actually runs.
//!
//! A thread owns a kernel stack and a saved context, belongs to exactly one [`Process`], and is
//! a member of at most one wait channel at a time. This module also exposes the free functions
//! [`sync::wait_queue`](crate::sync::wait_queue) and [`sync::mutex`](crate::sync::mutex) call into
//! to enqueue, sleep, and wake the calling thread.

use crate::{
	arch::{Arch, CurrentArch, SavedContext},
	process::{proc::Process, sched},
	sync::IntSpin,
};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use utils::{
	collections::vec::Vec,
	errno::AllocResult,
	ptr::arc::{Arc, Weak},
};

/// Thread identifier, unique for the lifetime of the kernel (not reused, unlike [`Pid`]s).
pub type Tid = u32;

/// The default size, in bytes, of a kernel thread's stack.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// The lifecycle state of a [`Thread`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThreadState {
	/// Enqueued on the run queue, waiting for its turn.
	Runnable,
	/// Currently executing on the (single) CPU.
	Running,
	/// Blocked on a [`crate::sync::wait_queue::WaitQueue`], not cancellable.
	Sleeping,
	/// Blocked on a [`crate::sync::wait_queue::WaitQueue`], cancellable by `kthread_cancel`.
	SleepingCancellable,
	/// Terminated; its kernel stack has not necessarily been reclaimed yet (`kthread_join`
	/// reclaims it).
	Exited,
}

/// A kernel thread.
pub struct Thread {
	tid: Tid,
	/// The process this thread belongs to. A process outlives none of its threads, but a thread
	/// only ever needs to look its process up, never to keep it alive, hence `Weak`.
	process: Weak<Process>,
	state: IntSpin<ThreadState>,
	/// Set by `kthread_cancel`/[`crate::sync::wait_queue::WaitQueue::cancel_one`], consumed by
	/// the sleeper on wakeup to distinguish a normal wake from a cancellation.
	cancelled: AtomicBool,
	context: IntSpin<SavedContext>,
	/// The thread's exit value, set by `kthread_exit`, read by `kthread_join`.
	exit_value: IntSpin<Option<usize>>,
	/// Backing storage for the kernel stack. Never read directly by Rust code; its address is
	/// handed to [`Arch::context_setup`].
	_stack: Vec<u8>,
}

impl Thread {
	/// Returns this thread's identifier.
	pub fn tid(&self) -> Tid {
		self.tid
	}

	/// Returns the process this thread belongs to, or `None` if it has already been dropped.
	pub fn process(&self) -> Option<Arc<Process>> {
		self.process.upgrade()
	}

	/// Returns the thread's current state.
	pub fn state(&self) -> ThreadState {
		*self.state.lock()
	}
}

static NEXT_TID: AtomicU32 = AtomicU32::new(1);

/// Allocates a kernel stack and creates a new thread belonging to `process`, ready to run
/// `entry(arg)` once scheduled. The thread starts in the [`ThreadState::Runnable`] state and is
/// enqueued on the run queue.
pub fn create(
	process: &Arc<Process>,
	entry: fn(usize) -> usize,
	arg: usize,
) -> AllocResult<Arc<Thread>> {
	let mut stack = Vec::with_capacity(DEFAULT_STACK_SIZE)?;
	for _ in 0..DEFAULT_STACK_SIZE {
		stack.push(0u8)?;
	}
	let context = CurrentArch::context_setup(&mut stack, entry as usize, arg, 0);
	let thread = Arc::new(Thread {
		tid: NEXT_TID.fetch_add(1, Ordering::Relaxed),
		process: Arc::downgrade(process),
		state: IntSpin::new(ThreadState::Runnable),
		cancelled: AtomicBool::new(false),
		context: IntSpin::new(context),
		exit_value: IntSpin::new(None),
		_stack: stack,
	})?;
	sched::enqueue(thread.clone());
	Ok(thread)
}

/// Creates a new thread belonging to `process` that resumes at the same entry point and argument
/// as `like`'s saved context, the way a forked child resumes from its parent's saved register
/// state on a real architecture. `SimArch` has no call stack to duplicate, so "resuming" here means
/// replaying the same `entry(arg)` the parent thread was itself created with.
pub fn fork(process: &Arc<Process>, like: &Arc<Thread>) -> AllocResult<Arc<Thread>> {
	let ctx = *like.context.lock();
	let entry: fn(usize) -> usize = unsafe { core::mem::transmute(ctx.entry) };
	create(process, entry, ctx.arg1)
}

/// Returns the thread currently executing on this (the only) CPU.
///
/// # Panics
///
/// Panics if called outside of any thread's context (e.g. before the scheduler has started).
pub fn current() -> Arc<Thread> {
	sched::current()
}

/// Sets `thr`'s state. Does not by itself move it on or off any run/wait queue.
pub fn set_state(thr: &Arc<Thread>, state: ThreadState) {
	*thr.state.lock() = state;
}

/// Marks `thr` as cancelled; consumed by [`take_cancelled`] the next time it wakes up.
pub fn mark_cancelled(thr: &Arc<Thread>) {
	thr.cancelled.store(true, Ordering::Release);
}

/// Reads and clears `thr`'s cancelled flag.
pub fn take_cancelled(thr: &Arc<Thread>) -> bool {
	thr.cancelled.swap(false, Ordering::AcqRel)
}

/// Moves `thr` from `Sleeping`/`SleepingCancellable` back to `Runnable` and re-enqueues it on the
/// run queue. A no-op if `thr` was not asleep (guards against a lost wakeup racing a spurious
/// wake).
pub fn wake(thr: &Arc<Thread>) {
	let mut state = thr.state.lock();
	if matches!(*state, ThreadState::Sleeping | ThreadState::SleepingCancellable) {
		*state = ThreadState::Runnable;
		drop(state);
		sched::enqueue(thr.clone());
	}
}

/// Yields the CPU to the scheduler, which picks the next runnable thread and context-switches
/// into it. Returns once this thread is scheduled again.
pub fn schedule() {
	sched::schedule();
}

/// Requests cancellation of `thr`: if it is currently in a cancellable sleep, wakes it
/// immediately with [`crate::sync::wait_queue::WakeReason::Cancelled`]; otherwise the flag is
/// left set and observed by the next cancellable sleep the thread enters.
pub fn cancel(thr: &Arc<Thread>) {
	mark_cancelled(thr);
	let mut state = thr.state.lock();
	if *state == ThreadState::SleepingCancellable {
		*state = ThreadState::Runnable;
		drop(state);
		sched::enqueue(thr.clone());
	}
}

/// Terminates the calling thread with the given exit value and yields the CPU for the last time.
///
/// Does not return.
pub fn exit(value: usize) -> ! {
	let cur = current();
	*cur.exit_value.lock() = Some(value);
	set_state(&cur, ThreadState::Exited);
	loop {
		schedule();
	}
}

/// Blocks until `thr` has exited, then returns its exit value.
///
/// Since this kernel has no preemptive timer, the caller must itself yield repeatedly; real
/// callers park on the owning process's wait queue instead of spinning (see
/// [`crate::process::proc::do_waitpid`] for the analogous process-level join).
pub fn join(thr: &Arc<Thread>) -> usize {
	loop {
		if let Some(v) = *thr.exit_value.lock() {
			return v;
		}
		schedule();
	}
}
