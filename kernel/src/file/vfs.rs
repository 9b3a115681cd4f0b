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

//! The VFS is the entity that unifies the single mounted filesystem's inodes into a tree of
//! live [`VNode`]s, each backed by a page-cache-resident [`MmObj`] for its content.
//!
//! A general mount-point tree with several simultaneously mounted filesystems is out of scope;
//! there is exactly one root filesystem.

use crate::{
	file::{Mode, path::{Component, Path}, perm},
	memory::mmobj::MmObj,
	sync::IntSpin,
};
use utils::{
	collections::{string::String, vec::Vec},
	errno,
	errno::{AllocResult, EResult},
	ptr::arc::Arc,
};

/// An inode number, unique within the mounted filesystem.
pub type Ino = u64;

/// One entry of a directory listing, as returned by `getdents(2)`.
#[derive(Clone)]
pub struct Dirent {
	pub ino: Ino,
	pub name: String,
	pub is_dir: bool,
}

/// Filesystem-specific vnode operations. A filesystem implements this once; every [`VNode`] it
/// backs dispatches through the same `Arc<dyn VnodeOps>`.
pub trait VnodeOps: Send + Sync {
	/// Looks up `name` in directory `dir`.
	fn lookup(&self, dir: &VNode, name: &[u8]) -> EResult<Arc<VNode>>;
	/// Creates a regular file named `name` in `dir`.
	fn create(&self, dir: &VNode, name: &[u8], mode: Mode) -> EResult<Arc<VNode>>;
	/// Creates a directory named `name` in `dir`.
	fn mkdir(&self, dir: &VNode, name: &[u8], mode: Mode) -> EResult<Arc<VNode>>;
	/// Creates a device node named `name` in `dir`. `mode`'s type bits select character vs.
	/// block, `devid` packs the 8-bit major/minor pair the node refers to.
	fn mknod(&self, dir: &VNode, name: &[u8], mode: Mode, devid: u32) -> EResult<Arc<VNode>>;
	/// Removes the non-directory entry `name` from `dir`.
	fn unlink(&self, dir: &VNode, name: &[u8]) -> EResult<()>;
	/// Removes the empty directory entry `name` from `dir`.
	fn rmdir(&self, dir: &VNode, name: &[u8]) -> EResult<()>;
	/// Adds a new directory entry `name` in `dir` pointing at the existing inode `target`.
	fn link(&self, dir: &VNode, name: &[u8], target: &VNode) -> EResult<()>;
	/// Moves/renames `old_name` in `old_dir` to `new_name` in `new_dir`.
	fn rename(&self, old_dir: &VNode, old_name: &[u8], new_dir: &VNode, new_name: &[u8]) -> EResult<()>;
	/// Lists `dir`'s entries starting at byte `offset` into the directory's own content,
	/// appending to `out`; returns the offset to resume from on the next call.
	fn readdir(&self, dir: &VNode, offset: u64, out: &mut Vec<Dirent>) -> EResult<u64>;
	/// Truncates (or, growing, zero-extends) `vn` to `len` bytes.
	fn truncate(&self, vn: &VNode, len: u64) -> EResult<()>;
}

/// An active inode: cached metadata plus a page-cache-backed content object.
pub struct VNode {
	pub ino: Ino,
	mode: IntSpin<Mode>,
	size: IntSpin<u64>,
	nlink: IntSpin<u32>,
	/// Major/minor pair for a character or block device node; meaningless otherwise.
	devid: u32,
	/// Content: for a directory, the serialized dirent stream; for a regular file, its bytes.
	/// Either way, reads and writes go through the page-frame cache like any other mmobj.
	pub mmobj: Arc<MmObj>,
	ops: Arc<dyn VnodeOps>,
}

impl VNode {
	/// Wraps a freshly looked-up or created inode.
	pub fn new(
		ino: Ino,
		mode: Mode,
		size: u64,
		nlink: u32,
		mmobj: Arc<MmObj>,
		ops: Arc<dyn VnodeOps>,
	) -> AllocResult<Arc<Self>> {
		Self::new_device(ino, mode, size, nlink, 0, mmobj, ops)
	}

	/// Wraps a freshly looked-up or created device-node inode.
	pub fn new_device(
		ino: Ino,
		mode: Mode,
		size: u64,
		nlink: u32,
		devid: u32,
		mmobj: Arc<MmObj>,
		ops: Arc<dyn VnodeOps>,
	) -> AllocResult<Arc<Self>> {
		Arc::new(Self {
			ino,
			mode: IntSpin::new(mode),
			size: IntSpin::new(size),
			nlink: IntSpin::new(nlink),
			devid,
			mmobj,
			ops,
		})
	}

	pub fn devid(&self) -> u32 {
		self.devid
	}

	pub fn mode(&self) -> Mode {
		*self.mode.lock()
	}

	pub fn set_mode(&self, mode: Mode) {
		*self.mode.lock() = mode;
	}

	pub fn size(&self) -> u64 {
		*self.size.lock()
	}

	pub fn set_size(&self, size: u64) {
		*self.size.lock() = size;
	}

	/// Returns the number of directory entries pointing at this inode, as `stat(2)` reports it.
	/// `.` entries never count towards this by convention, so a childless directory's count is
	/// exactly 1 (its parent's entry).
	pub fn nlink(&self) -> u32 {
		*self.nlink.lock()
	}

	pub fn set_nlink(&self, n: u32) {
		*self.nlink.lock() = n;
	}

	pub fn is_dir(&self) -> bool {
		perm::is_dir(self.mode())
	}

	pub fn lookup(&self, name: &[u8]) -> EResult<Arc<VNode>> {
		self.ops.clone().lookup(self, name)
	}

	pub fn create(&self, name: &[u8], mode: Mode) -> EResult<Arc<VNode>> {
		self.ops.clone().create(self, name, mode)
	}

	pub fn mkdir(&self, name: &[u8], mode: Mode) -> EResult<Arc<VNode>> {
		self.ops.clone().mkdir(self, name, mode)
	}

	pub fn mknod(&self, name: &[u8], mode: Mode, devid: u32) -> EResult<Arc<VNode>> {
		self.ops.clone().mknod(self, name, mode, devid)
	}

	pub fn unlink(&self, name: &[u8]) -> EResult<()> {
		self.ops.clone().unlink(self, name)
	}

	pub fn rmdir(&self, name: &[u8]) -> EResult<()> {
		self.ops.clone().rmdir(self, name)
	}

	pub fn link(&self, name: &[u8], target: &VNode) -> EResult<()> {
		self.ops.clone().link(self, name, target)
	}

	pub fn rename(&self, old_name: &[u8], new_dir: &VNode, new_name: &[u8]) -> EResult<()> {
		self.ops.clone().rename(self, old_name, new_dir, new_name)
	}

	pub fn readdir(&self, offset: u64, out: &mut Vec<Dirent>) -> EResult<u64> {
		self.ops.clone().readdir(self, offset, out)
	}

	pub fn truncate(&self, len: u64) -> EResult<()> {
		self.ops.clone().truncate(self, len)
	}

	/// Reads up to `buf.len()` bytes starting at `offset`, stopping at the current size.
	pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> EResult<usize> {
		let size = self.size();
		if offset >= size {
			return Ok(0);
		}
		let len = (buf.len() as u64).min(size - offset) as usize;
		let mut done = 0;
		while done < len {
			let pos = offset + done as u64;
			let pagenum = pos / utils::limits::PAGE_SIZE as u64;
			let page_off = (pos % utils::limits::PAGE_SIZE as u64) as usize;
			let chunk = (utils::limits::PAGE_SIZE - page_off).min(len - done);
			let frame = self.mmobj.fill_page(pagenum)?;
			frame.with_data(|d| buf[done..done + chunk].copy_from_slice(&d[page_off..page_off + chunk]));
			done += chunk;
		}
		Ok(done)
	}

	/// Writes `buf` at `offset`, growing the file if the write extends past the current size.
	pub fn write_at(&self, offset: u64, buf: &[u8]) -> EResult<usize> {
		let mut done = 0;
		while done < buf.len() {
			let pos = offset + done as u64;
			let pagenum = pos / utils::limits::PAGE_SIZE as u64;
			let page_off = (pos % utils::limits::PAGE_SIZE as u64) as usize;
			let chunk = (utils::limits::PAGE_SIZE - page_off).min(buf.len() - done);
			let frame = self.mmobj.dirty_page(pagenum)?;
			frame.with_data_mut(|d| d[page_off..page_off + chunk].copy_from_slice(&buf[done..done + chunk]));
			done += chunk;
		}
		let end = offset + buf.len() as u64;
		if end > self.size() {
			self.set_size(end);
		}
		Ok(done)
	}
}

/// Resolves `path` to a vnode, starting at `root` for absolute paths and `cwd` otherwise.
pub fn resolve(root: &Arc<VNode>, cwd: &Arc<VNode>, path: &Path) -> EResult<Arc<VNode>> {
	let mut cur = if path.is_absolute() {
		root.clone()
	} else {
		cwd.clone()
	};
	for component in path.components() {
		match component {
			Component::RootDir | Component::CurDir => continue,
			Component::ParentDir => {
				// Traversal above the mount root is a no-op, as on a real root `..`; anywhere
				// else `..` is a genuine dirent that must be looked up like any other name.
				if cur.ino != root.ino {
					cur = cur.lookup(b"..")?;
				}
			}
			Component::Normal(name) => {
				if !cur.is_dir() {
					return Err(errno::Errno::ENOTDIR);
				}
				cur = cur.lookup(name)?;
			}
		}
	}
	Ok(cur)
}

/// Splits `path` into its parent directory (resolved) and final component name, for operations
/// that create or remove an entry (`open(O_CREAT)`, `mkdir`, `unlink`, ...).
pub fn resolve_parent<'p>(
	root: &Arc<VNode>,
	cwd: &Arc<VNode>,
	path: &'p Path,
) -> EResult<(Arc<VNode>, &'p [u8])> {
	let name = path.file_name().ok_or(errno::Errno::EINVAL)?;
	let parent_path = path.parent().ok_or(errno::Errno::EINVAL)?;
	let parent_vn = resolve(root, cwd, parent_path)?;
	if !parent_vn.is_dir() {
		return Err(errno::Errno::ENOTDIR);
	}
	Ok((parent_vn, name))
}
