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

//! Processes: the unit of resource ownership (address space, file descriptors, children).
//!
//! A process is a container for one or more [`Thread`]s plus the state a `fork`/`waitpid` pair
//! needs: a parent link, a list of children, and a wait queue children's exits are reported
//! through. Orphaned children are reparented to [`INIT_PID`] on their parent's exit, same as the
//! teacher's process tree. Beyond the thread list, every process also owns the resources
//! `fork`/`exec`/`exit` must account for: a virtual address-space map, the page-table stand-in
//! it is kept in sync with by the fault handler, a file descriptor table and a current working
//! directory.

use crate::{
	arch::{AddressSpace, Vpn},
	file::{fd::FileDescriptorTable, vfs::VNode},
	memory::vmmap::VmMap,
	process::{
		kthread::{self, Thread},
		pid::{INIT_PID, Pid, PidHandle},
	},
	sync::{IntSpin, wait_queue::WaitQueue},
};
use utils::{
	errno,
	errno::{AllocResult, EResult},
	ptr::arc::{Arc, Weak},
};

/// Size, in pages, of the user portion of every process's address space. Modeled on the
/// classic 3GB/1GB x86 split: everything below `0xC000_0000` is user-mappable.
pub const USER_VPN_LIMIT: Vpn = 0xC000_0000 / utils::limits::PAGE_SIZE;

/// First page number of the heap `brk` grows into. Left well above the null page and any
/// low fixed mappings a test might install.
pub const HEAP_BASE_VPN: Vpn = 0x1000;

/// The initial value of `brk`, one page number's worth of bytes in.
pub const HEAP_BASE: usize = HEAP_BASE_VPN * utils::limits::PAGE_SIZE;

/// The kernel-wide init process, set once by [`Process::init`].
static INIT: IntSpin<Option<Arc<Process>>> = IntSpin::new(None);

/// Returns the init process (PID 1), the reparenting target for every orphaned child.
///
/// # Panics
///
/// Panics if called before [`Process::init`] has run.
pub fn init_process() -> Arc<Process> {
	INIT.lock().clone().expect("init process not yet created")
}

/// The outcome reported to a reaping `waitpid`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitStatus {
	/// The process called `_exit` (or fell off `main`) with this status code.
	Exited(i32),
	/// The process was killed by the given signal number.
	Killed(i32),
}

impl ExitStatus {
	/// Encodes the status the way the `wait(2)` family reports it: low byte for a signal number,
	/// or the exit code shifted up by 8, matching glibc's `WIFEXITED`/`WEXITSTATUS` encoding.
	pub fn to_wait_status(self) -> i32 {
		match self {
			ExitStatus::Exited(code) => (code & 0xff) << 8,
			ExitStatus::Killed(sig) => sig & 0x7f,
		}
	}
}

/// A process's lifecycle state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcState {
	/// At least one thread is runnable or running.
	Running,
	/// Every thread has exited; the exit status is available but the process has not yet been
	/// reaped by its parent's `waitpid`.
	Zombie,
}

struct Inner {
	state: ProcState,
	exit_status: Option<ExitStatus>,
	parent: Option<Weak<Process>>,
	children: utils::collections::vec::Vec<Arc<Process>>,
	threads: utils::collections::vec::Vec<Arc<Thread>>,
}

/// A process.
pub struct Process {
	pid: PidHandle,
	inner: IntSpin<Inner>,
	/// This process's virtual address space.
	vmmap: IntSpin<VmMap>,
	/// The page-table stand-in `vmmap` is projected into; [`crate::memory::fault`] is what keeps
	/// the two in sync.
	address_space: IntSpin<AddressSpace>,
	fds: IntSpin<FileDescriptorTable>,
	cwd: IntSpin<Arc<VNode>>,
	/// Current end of the heap, as tracked by `brk(2)`. The pages between [`HEAP_BASE`] and this
	/// address are mapped into `vmmap` as a single anonymous, growable area.
	brk: IntSpin<usize>,
	/// Signaled once when this process becomes a zombie; `waitpid` callers on the parent sleep
	/// here.
	child_exit: WaitQueue,
}

impl Process {
	/// Returns this process's PID.
	pub fn pid(&self) -> Pid {
		*self.pid
	}

	/// Returns the current lifecycle state.
	pub fn state(&self) -> ProcState {
		self.inner.lock().state
	}

	/// Returns the parent process, or `None` for the init process (or if the parent has already
	/// exited and been reaped).
	pub fn parent(&self) -> Option<Arc<Process>> {
		self.inner.lock().parent.as_ref().and_then(Weak::upgrade)
	}

	/// Returns the process the calling thread belongs to.
	///
	/// # Panics
	///
	/// Panics outside of any thread's context, same as [`kthread::current`].
	pub fn current() -> Arc<Process> {
		kthread::current()
			.process()
			.expect("thread outlived its process")
	}

	/// Locks and returns this process's address-space map.
	pub fn vmmap(&self) -> &IntSpin<VmMap> {
		&self.vmmap
	}

	/// Locks and returns this process's page-table stand-in.
	pub fn address_space(&self) -> &IntSpin<AddressSpace> {
		&self.address_space
	}

	/// Locks and returns this process's file descriptor table.
	pub fn fds(&self) -> &IntSpin<FileDescriptorTable> {
		&self.fds
	}

	/// Returns the vnode this process currently resolves relative paths against.
	pub fn cwd(&self) -> Arc<VNode> {
		self.cwd.lock().clone()
	}

	/// Sets this process's current working directory, as `chdir(2)` does.
	pub fn set_cwd(&self, vnode: Arc<VNode>) {
		*self.cwd.lock() = vnode;
	}

	/// Locks and returns this process's current heap break, in bytes (see [`HEAP_BASE`]).
	pub fn brk(&self) -> &IntSpin<usize> {
		&self.brk
	}

	fn new(
		pid: PidHandle,
		parent: Option<Weak<Process>>,
		cwd: Arc<VNode>,
		vmmap: VmMap,
		fds: FileDescriptorTable,
	) -> AllocResult<Arc<Self>> {
		Arc::new(Self {
			pid,
			inner: IntSpin::new(Inner {
				state: ProcState::Running,
				exit_status: None,
				parent,
				children: utils::collections::vec::Vec::new(),
				threads: utils::collections::vec::Vec::new(),
			}),
			vmmap: IntSpin::new(vmmap),
			address_space: IntSpin::new(AddressSpace::new()),
			fds: IntSpin::new(fds),
			cwd: IntSpin::new(cwd),
			brk: IntSpin::new(HEAP_BASE),
			child_exit: WaitQueue::new(),
		})
	}

	/// Creates the init process (PID 1), the root of the process tree. `root` becomes both its
	/// filesystem root and its initial working directory.
	///
	/// Also registers it as the kernel-wide init process (see [`init_process`]), the reparenting
	/// target [`do_exit`](Self::do_exit) hands orphaned children off to.
	pub fn init(root: Arc<VNode>) -> AllocResult<Arc<Self>> {
		let pid = PidHandle::reserve(INIT_PID)?;
		let proc = Self::new(
			pid,
			None,
			root,
			VmMap::new(USER_VPN_LIMIT),
			FileDescriptorTable::default(),
		)?;
		*INIT.lock() = Some(proc.clone());
		Ok(proc)
	}

	/// Creates a new process that is a child of `self`, as `fork(2)` would: the child gets its
	/// own copy-on-write address-space map (see [`VmMap::fork_cow`]), a duplicate of the file
	/// descriptor table, and the same working directory. Does not copy any threads; callers build
	/// those separately (see `syscall::fork`), then call [`add_thread`](Self::add_thread).
	///
	/// Neither process keeps a hardware mapping behind its private areas afterwards: both address
	/// spaces are reset empty, so the next access on either side re-establishes its mapping
	/// through [`crate::memory::fault::handle_page_fault`], which is what actually enforces
	/// copy-on-write.
	pub fn fork(self: &Arc<Self>) -> EResult<Arc<Self>> {
		let pid = PidHandle::unique()?;
		let cwd = self.cwd();
		let child_vmmap = {
			let mut vmmap = self.vmmap.lock();
			vmmap.fork_cow()?
		};
		*self.address_space.lock() = AddressSpace::new();
		let child_fds = self.fds.lock().duplicate(false)?;
		let child = Self::new(
			pid,
			Some(Arc::downgrade(self)),
			cwd,
			child_vmmap,
			child_fds,
		)?;
		*child.brk.lock() = *self.brk.lock();
		self.inner.lock().children.push(child.clone())?;
		Ok(child)
	}

	/// Registers `thr` as belonging to this process.
	pub fn add_thread(&self, thr: Arc<Thread>) -> AllocResult<()> {
		self.inner.lock().threads.push(thr)
	}

	/// Searches `self` and its descendants (depth-first) for the process with the given PID.
	///
	/// Every live process is reachable this way starting from the init process: `do_exit`
	/// reparents orphans to init rather than ever dropping them from the tree, so a zombie is
	/// only unreachable once its parent's `waitpid` has actually reaped it.
	pub fn find_by_pid(self: &Arc<Self>, pid: Pid) -> Option<Arc<Process>> {
		if self.pid() == pid {
			return Some(self.clone());
		}
		let mut children = utils::collections::vec::Vec::new();
		for c in self.inner.lock().children.iter() {
			children.push(c.clone()).ok()?;
		}
		children.iter().find_map(|c| c.find_by_pid(pid))
	}

	/// Returns the number of threads still attached to this process.
	pub fn thread_count(&self) -> usize {
		self.inner.lock().threads.len()
	}

	/// Marks the process as exited with the given status, reparents its children to the init
	/// process, and wakes anyone in its parent's `waitpid`.
	///
	/// Mirrors the teacher's `proc_cleanup`: children never become unreachable, they just move up
	/// to PID 1.
	pub fn do_exit(self: &Arc<Self>, status: ExitStatus, init: &Arc<Process>) {
		let mut inner = self.inner.lock();
		inner.state = ProcState::Zombie;
		inner.exit_status = Some(status);
		let orphans = core::mem::take(&mut inner.children);
		drop(inner);
		let mut init_inner = init.inner.lock();
		for child in orphans {
			child.inner.lock().parent = Some(Arc::downgrade(init));
			init_inner.children.push(child).ok();
		}
		drop(init_inner);
		if let Some(parent) = self.parent() {
			parent.child_exit.wake_all();
		}
	}

	/// Finds a zombie child matching `pid` (`-1` for any child), removes it from the child list
	/// and returns `(pid, status)`.
	fn reap_zombie(&self, pid: i32) -> Option<(Pid, ExitStatus)> {
		let mut inner = self.inner.lock();
		let idx = inner.children.iter().position(|c| {
			let matches_pid = pid == -1 || c.pid() as i32 == pid;
			matches_pid && c.state() == ProcState::Zombie
		})?;
		let child = inner.children.swap_remove(idx);
		let status = child.inner.lock().exit_status.unwrap();
		Some((child.pid(), status))
	}

	/// Returns whether `self` has at least one living (non-zombie) child matching `pid`.
	fn has_waitable_child(&self, pid: i32) -> bool {
		self.inner
			.lock()
			.children
			.iter()
			.any(|c| pid == -1 || c.pid() as i32 == pid)
	}
}

/// Implements `waitpid(2)`'s core semantics: `pid == -1` waits for any child, `pid > 0` waits for
/// that specific child. Blocks until a matching child becomes a zombie, then reaps it.
///
/// Returns `ECHILD` if `self` has no child matching `pid` at all (living or zombie).
pub fn do_waitpid(proc: &Arc<Process>, pid: i32) -> EResult<(Pid, ExitStatus)> {
	loop {
		if let Some(result) = proc.reap_zombie(pid) {
			return Ok(result);
		}
		if !proc.has_waitable_child(pid) {
			return Err(errno::Errno::ECHILD);
		}
		proc.child_exit.sleep();
	}
}

/// Spawns the very first thread of a freshly created process, as `fork`/process-creation
/// syscalls do once the child's address space and file table are set up.
pub fn spawn_thread(proc: &Arc<Process>, entry: fn(usize) -> usize, arg: usize) -> AllocResult<()> {
	let thr = kthread::create(proc, entry, arg)?;
	proc.add_thread(thr)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::file::{perm, vfs::Dirent};
	use utils::collections::vec::Vec;

	struct NoOps;

	impl crate::file::vfs::VnodeOps for NoOps {
		fn lookup(&self, _: &VNode, _: &[u8]) -> EResult<Arc<VNode>> {
			Err(errno!(ENOENT))
		}
		fn create(&self, _: &VNode, _: &[u8], _: u32) -> EResult<Arc<VNode>> {
			Err(errno!(EROFS))
		}
		fn mkdir(&self, _: &VNode, _: &[u8], _: u32) -> EResult<Arc<VNode>> {
			Err(errno!(EROFS))
		}
		fn mknod(&self, _: &VNode, _: &[u8], _: u32, _: u32) -> EResult<Arc<VNode>> {
			Err(errno!(EROFS))
		}
		fn unlink(&self, _: &VNode, _: &[u8]) -> EResult<()> {
			Err(errno!(EROFS))
		}
		fn rmdir(&self, _: &VNode, _: &[u8]) -> EResult<()> {
			Err(errno!(EROFS))
		}
		fn link(&self, _: &VNode, _: &[u8], _: &VNode) -> EResult<()> {
			Err(errno!(EROFS))
		}
		fn rename(&self, _: &VNode, _: &[u8], _: &VNode, _: &[u8]) -> EResult<()> {
			Err(errno!(EROFS))
		}
		fn readdir(&self, _: &VNode, _: u64, _: &mut Vec<Dirent>) -> EResult<u64> {
			Ok(0)
		}
		fn truncate(&self, _: &VNode, _: u64) -> EResult<()> {
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

	#[test]
	fn fork_registers_child() {
		let init = Process::init(dummy_root()).unwrap();
		let child = init.fork().unwrap();
		assert_eq!(init.inner.lock().children.len(), 1);
		assert!(Arc::ptr_eq(&child.parent().unwrap(), &init));
		assert!(Arc::ptr_eq(&child.cwd(), &init.cwd()));
	}

	#[test]
	fn waitpid_any_reaps_zombie() {
		let init = Process::init(dummy_root()).unwrap();
		let child = init.fork().unwrap();
		child.do_exit(ExitStatus::Exited(7), &init);
		let (pid, status) = do_waitpid(&init, -1).unwrap();
		assert_eq!(pid, child.pid());
		assert_eq!(status, ExitStatus::Exited(7));
	}

	#[test]
	fn waitpid_no_children_is_echild() {
		let init = Process::init(dummy_root()).unwrap();
		assert_eq!(do_waitpid(&init, -1).unwrap_err(), errno::Errno::ECHILD);
	}
}
