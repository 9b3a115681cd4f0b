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

//! [`VnodeOps`] for [`S5Fs`], and the [`S5PageSource`] bridge that lets a vnode's `mmobj` demand
//! page its content straight from the filesystem's block-allocation machinery.

use super::{dirent, inode, inode::InodeType, S5Fs, BLOCK_SIZE};
use crate::{
	file::{
		perm,
		vfs::{Dirent, Ino, VNode, VnodeOps},
		Mode,
	},
	memory::mmobj::PageSource,
};
use utils::{
	collections::{string::String, vec::Vec},
	errno,
	errno::EResult,
	ptr::arc::Arc,
};

/// Bridges a vnode's page-backed `mmobj` to its filesystem's block storage: a page number maps to
/// a block number 1:1, since [`BLOCK_SIZE`] equals the page size.
pub struct S5PageSource {
	fs: Arc<S5Fs>,
	ino: Ino,
}

impl S5PageSource {
	pub fn new(fs: Arc<S5Fs>, ino: Ino) -> Self {
		Self {
			fs,
			ino,
		}
	}
}

impl PageSource for S5PageSource {
	fn read_page(&self, pagenum: u64, buf: &mut [u8]) -> EResult<()> {
		let blk = self.fs.seek_to_block(self.ino, pagenum, false)?;
		if blk == 0 {
			buf[..BLOCK_SIZE].fill(0);
			return Ok(());
		}
		self.fs.device.read_block(blk as u64, buf)
	}

	fn write_page(&self, pagenum: u64, buf: &[u8]) -> EResult<()> {
		let blk = self.fs.seek_to_block(self.ino, pagenum, true)?;
		self.fs.device.write_block(blk as u64, buf)?;
		// The on-disk size field only ever moves forward here: `vnode_for` always finds this
		// page source's own vnode alive (we are only reachable through its `mmobj`), and by the
		// time a dirty page reaches this flush its in-memory size already reflects every write
		// that produced it.
		let vn = self.fs.vnode_for(self.ino)?;
		let mut raw = self.fs.read_inode_raw(self.ino as u32)?;
		raw.size = vn.size() as u32;
		self.fs.write_inode_raw(self.ino as u32, &raw)
	}
}

/// Checks that `dir` actually is a directory before any operation that appends/removes a dirent.
fn require_dir(dir: &VNode) -> EResult<()> {
	if !dir.is_dir() {
		return Err(errno!(ENOTDIR));
	}
	Ok(())
}

impl S5Fs {
	/// Shared tail of `create`/`mkdir`/`mknod`: allocates a fresh inode, writes its initial raw
	/// record, links it into `dir` under `name`, and returns its live vnode.
	fn make_entry(&self, dir: &VNode, name: &[u8], kind: InodeType, devid: u32) -> EResult<Arc<VNode>> {
		require_dir(dir)?;
		if dirent::find_dirent(dir, name)?.is_some() {
			return Err(errno!(EEXIST));
		}
		let ino = self.alloc_inode()?;
		let mut raw = inode::RawInode::new(kind);
		if kind.is_device() {
			raw.indirect = devid;
		}
		self.write_inode_raw(ino, &raw)?;
		let vn = self.vnode_for(ino as Ino)?;
		self.link_internal(dir, name, &vn, true)?;
		Ok(vn)
	}
}

impl VnodeOps for S5Fs {
	fn lookup(&self, dir: &VNode, name: &[u8]) -> EResult<Arc<VNode>> {
		require_dir(dir)?;
		let (_, ino) = dirent::find_dirent(dir, name)?.ok_or(errno!(ENOENT))?;
		self.vnode_for(ino as Ino)
	}

	fn create(&self, dir: &VNode, name: &[u8], _mode: Mode) -> EResult<Arc<VNode>> {
		self.make_entry(dir, name, InodeType::Data, 0)
	}

	fn mkdir(&self, dir: &VNode, name: &[u8], _mode: Mode) -> EResult<Arc<VNode>> {
		let child = self.make_entry(dir, name, InodeType::Dir, 0)?;
		self.link_internal(&child, b".", &child, false)?;
		self.link_internal(&child, b"..", dir, true)?;
		Ok(child)
	}

	fn mknod(&self, dir: &VNode, name: &[u8], mode: Mode, devid: u32) -> EResult<Arc<VNode>> {
		let kind = if perm::is_device(mode) && mode & perm::S_IFMT == perm::S_IFCHR {
			InodeType::Chr
		} else if perm::is_device(mode) {
			InodeType::Blk
		} else {
			return Err(errno!(EINVAL));
		};
		self.make_entry(dir, name, kind, devid)
	}

	fn unlink(&self, dir: &VNode, name: &[u8]) -> EResult<()> {
		require_dir(dir)?;
		if name == b"." || name == b".." {
			return Err(errno!(EPERM));
		}
		let (_, ino) = dirent::find_dirent(dir, name)?.ok_or(errno!(ENOENT))?;
		let target = self.vnode_for(ino as Ino)?;
		if target.is_dir() {
			return Err(errno!(EISDIR));
		}
		dirent::remove_dirent(dir, name)?;
		dir.mmobj.clean_pages()?;
		self.adjust_linkcount(&target, -1)
	}

	fn rmdir(&self, dir: &VNode, name: &[u8]) -> EResult<()> {
		require_dir(dir)?;
		if name == b"." {
			return Err(errno!(EINVAL));
		}
		if name == b".." {
			return Err(errno!(ENOTEMPTY));
		}
		let (_, ino) = dirent::find_dirent(dir, name)?.ok_or(errno!(ENOENT))?;
		let target = self.vnode_for(ino as Ino)?;
		if !target.is_dir() {
			return Err(errno!(ENOTDIR));
		}
		// Only `.` and `..` may remain for the directory to count as empty.
		if target.size() as usize > 2 * dirent::DIRENT_SIZE {
			return Err(errno!(ENOTEMPTY));
		}
		dirent::remove_dirent(&target, b"..")?;
		self.adjust_linkcount(dir, -1)?;
		dirent::remove_dirent(&target, b".")?;
		target.mmobj.clean_pages()?;
		dirent::remove_dirent(dir, name)?;
		dir.mmobj.clean_pages()?;
		self.adjust_linkcount(&target, -1)
	}

	fn link(&self, dir: &VNode, name: &[u8], target: &VNode) -> EResult<()> {
		require_dir(dir)?;
		if target.is_dir() {
			return Err(errno!(EPERM));
		}
		if dirent::find_dirent(dir, name)?.is_some() {
			return Err(errno!(EEXIST));
		}
		self.link_internal(dir, name, target, name != b".")
	}

	fn rename(&self, old_dir: &VNode, old_name: &[u8], new_dir: &VNode, new_name: &[u8]) -> EResult<()> {
		require_dir(old_dir)?;
		require_dir(new_dir)?;
		if old_name == b"." || old_name == b".." {
			return Err(errno!(EINVAL));
		}
		let (_, ino) = dirent::find_dirent(old_dir, old_name)?.ok_or(errno!(ENOENT))?;
		let moved = self.vnode_for(ino as Ino)?;
		if let Some((_, existing)) = dirent::find_dirent(new_dir, new_name)? {
			let existing_vn = self.vnode_for(existing as Ino)?;
			if existing_vn.is_dir() {
				self.rmdir(new_dir, new_name)?;
			} else {
				self.unlink(new_dir, new_name)?;
			}
		}
		dirent::remove_dirent(old_dir, old_name)?;
		old_dir.mmobj.clean_pages()?;
		dirent::link_dirent(new_dir, new_name, ino)?;
		new_dir.mmobj.clean_pages()?;
		if moved.is_dir() && old_dir.ino != new_dir.ino {
			dirent::remove_dirent(&moved, b"..")?;
			dirent::link_dirent(&moved, b"..", new_dir.ino as u32)?;
			moved.mmobj.clean_pages()?;
			self.adjust_linkcount(old_dir, -1)?;
			self.adjust_linkcount(new_dir, 1)?;
		}
		Ok(())
	}

	fn readdir(&self, dir: &VNode, offset: u64, out: &mut Vec<Dirent>) -> EResult<u64> {
		require_dir(dir)?;
		let mut raw = Vec::new();
		let next = dirent::list_dirents(dir, offset, &mut raw)?;
		for (ino, name) in raw.iter() {
			let child = self.vnode_for(*ino as Ino)?;
			let name = core::str::from_utf8(name).map_err(|_| errno!(EINVAL))?;
			out.push(Dirent {
				ino: *ino as Ino,
				name: String::try_from(name).map_err(|_| errno!(ENOMEM))?,
				is_dir: child.is_dir(),
			})
			.map_err(|_| errno!(ENOMEM))?;
		}
		Ok(next)
	}

	fn truncate(&self, vn: &VNode, len: u64) -> EResult<()> {
		let old_size = vn.size();
		if len >= old_size {
			vn.set_size(len);
			let mut raw = self.read_inode_raw(vn.ino as u32)?;
			raw.size = len as u32;
			return self.write_inode_raw(vn.ino as u32, &raw);
		}
		let old_pages = old_size.div_ceil(BLOCK_SIZE as u64);
		let new_pages = len.div_ceil(BLOCK_SIZE as u64);
		for pagenum in new_pages..old_pages {
			let blk = self.seek_to_block(vn.ino, pagenum, false)?;
			if blk != 0 {
				self.clear_block_pointer(vn.ino, pagenum)?;
				self.free_block(blk)?;
			}
			// A page can be dirty in the cache without a block behind it yet (block allocation
			// only happens when `write_page` runs during a flush), so eviction can't be gated on
			// `blk != 0` alone or a never-flushed write would survive a truncate past it.
			vn.mmobj.evict_page(pagenum);
		}
		vn.set_size(len);
		let mut raw = self.read_inode_raw(vn.ino as u32)?;
		raw.size = len as u32;
		self.write_inode_raw(vn.ino as u32, &raw)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::RamDisk;

	fn new_fs() -> Arc<S5Fs> {
		let disk = RamDisk::new(BLOCK_SIZE, 4096);
		S5Fs::format(Arc::new(disk).unwrap(), 128).unwrap()
	}

	#[test]
	fn create_write_read_roundtrip() {
		let fs = new_fs();
		let root = fs.root().unwrap();
		let f = root.create(b"f", perm::DEFAULT_FILE_MODE).unwrap();
		assert_eq!(f.write_at(0, b"hello").unwrap(), 5);
		let mut buf = [0u8; 5];
		assert_eq!(f.read_at(0, &mut buf).unwrap(), 5);
		assert_eq!(&buf, b"hello");
	}

	#[test]
	fn sparse_write_leaves_holes_zeroed_and_few_blocks_allocated() {
		let fs = new_fs();
		let root = fs.root().unwrap();
		let f = root.create(b"s", perm::DEFAULT_FILE_MODE).unwrap();
		f.write_at(1_048_576, b"x").unwrap();
		f.mmobj.clean_pages().unwrap();
		assert_eq!(f.size(), 1_048_577);
		let mut byte = [0xAAu8; 1];
		f.read_at(100, &mut byte).unwrap();
		assert_eq!(byte[0], 0);
		// The page at offset 1_048_576 (pagenum 256) falls in indirect territory; the 10 direct
		// slots must stay untouched and exactly one indirect entry should have been allocated.
		let raw = fs.read_inode_raw(f.ino as u32).unwrap();
		assert!(raw.direct.iter().all(|&b| b == 0));
		assert_ne!(raw.indirect, 0);
		let mut buf = [0u8; BLOCK_SIZE];
		fs.device.read_block(raw.indirect as u64, &mut buf).unwrap();
		let entries = super::super::decode_indirect_block(&buf);
		assert_eq!(entries.iter().filter(|&&e| e != 0).count(), 1);
	}

	#[test]
	fn mkdir_rmdir_restores_free_counts() {
		let fs = new_fs();
		let root = fs.root().unwrap();
		let (free_ino_before, nfree_before) = {
			let sb = fs.sb.lock();
			(sb.free_ino, sb.nfree)
		};
		root.mkdir(b"a", perm::DEFAULT_DIR_MODE).unwrap();
		root.rmdir(b"a").unwrap();
		let (free_ino_after, nfree_after) = {
			let sb = fs.sb.lock();
			(sb.free_ino, sb.nfree)
		};
		assert_eq!(free_ino_before, free_ino_after);
		assert_eq!(nfree_before, nfree_after);
	}

	#[test]
	fn nested_mkdir_rmdir_round_trip() {
		let fs = new_fs();
		let root = fs.root().unwrap();
		root.mkdir(b"a", perm::DEFAULT_DIR_MODE).unwrap();
		let a = root.lookup(b"a").unwrap();
		a.mkdir(b"b", perm::DEFAULT_DIR_MODE).unwrap();
		a.rmdir(b"b").unwrap();
		root.rmdir(b"a").unwrap();
		assert!(root.lookup(b"a").is_err());
	}

	#[test]
	fn rmdir_rejects_nonempty_directory() {
		let fs = new_fs();
		let root = fs.root().unwrap();
		root.mkdir(b"d", perm::DEFAULT_DIR_MODE).unwrap();
		let d = root.lookup(b"d").unwrap();
		d.create(b"f", perm::DEFAULT_FILE_MODE).unwrap();
		assert_eq!(root.rmdir(b"d").unwrap_err(), errno!(ENOTEMPTY));
	}

	#[test]
	fn link_unlink_preserves_the_other_name() {
		let fs = new_fs();
		let root = fs.root().unwrap();
		let f = root.create(b"f1", perm::DEFAULT_FILE_MODE).unwrap();
		f.write_at(0, b"data").unwrap();
		root.link(b"f2", &f).unwrap();
		assert_eq!(f.nlink(), 2);
		root.unlink(b"f2").unwrap();
		assert_eq!(f.nlink(), 1);
		let reopened = root.lookup(b"f1").unwrap();
		let mut buf = [0u8; 4];
		reopened.read_at(0, &mut buf).unwrap();
		assert_eq!(&buf, b"data");
	}

	#[test]
	fn unlink_frees_blocks_for_reuse() {
		let fs = new_fs();
		let root = fs.root().unwrap();
		let f = root.create(b"f", perm::DEFAULT_FILE_MODE).unwrap();
		f.write_at(0, &[1u8; BLOCK_SIZE]).unwrap();
		f.mmobj.clean_pages().unwrap();
		let nfree_before_unlink = fs.sb.lock().nfree;
		root.unlink(b"f").unwrap();
		let nfree_after_unlink = fs.sb.lock().nfree;
		assert!(nfree_after_unlink > nfree_before_unlink);
	}

	#[test]
	fn rename_moves_entry_between_directories() {
		let fs = new_fs();
		let root = fs.root().unwrap();
		root.mkdir(b"a", perm::DEFAULT_DIR_MODE).unwrap();
		root.mkdir(b"b", perm::DEFAULT_DIR_MODE).unwrap();
		let a = root.lookup(b"a").unwrap();
		let b = root.lookup(b"b").unwrap();
		a.create(b"f", perm::DEFAULT_FILE_MODE).unwrap().write_at(0, b"hi").unwrap();
		a.rename(b"f", &b, b"g").unwrap();
		assert!(a.lookup(b"f").is_err());
		let moved = b.lookup(b"g").unwrap();
		let mut buf = [0u8; 2];
		moved.read_at(0, &mut buf).unwrap();
		assert_eq!(&buf, b"hi");
	}

	#[test]
	fn rename_of_directory_updates_dotdot_and_parent_linkcounts() {
		let fs = new_fs();
		let root = fs.root().unwrap();
		root.mkdir(b"a", perm::DEFAULT_DIR_MODE).unwrap();
		root.mkdir(b"b", perm::DEFAULT_DIR_MODE).unwrap();
		let a = root.lookup(b"a").unwrap();
		let b = root.lookup(b"b").unwrap();
		a.mkdir(b"child", perm::DEFAULT_DIR_MODE).unwrap();
		let a_nlink_before = a.nlink();
		a.rename(b"child", &b, b"child").unwrap();
		assert_eq!(a.nlink(), a_nlink_before - 1);
		assert_eq!(b.nlink(), 2);
		let moved = b.lookup(b"child").unwrap();
		let (_, dotdot_ino) = dirent::find_dirent(&moved, b"..").unwrap().unwrap();
		assert_eq!(dotdot_ino as Ino, b.ino);
	}

	#[test]
	fn mknod_creates_a_device_inode_with_devid() {
		let fs = new_fs();
		let root = fs.root().unwrap();
		let dev = root.mknod(b"null", perm::S_IFCHR | 0o666, 0x0105).unwrap();
		assert_eq!(dev.devid(), 0x0105);
		assert!(!dev.is_dir());
	}

	#[test]
	fn truncate_grow_then_shrink_then_regrow_reads_zero() {
		let fs = new_fs();
		let root = fs.root().unwrap();
		let f = root.create(b"t", perm::DEFAULT_FILE_MODE).unwrap();
		f.write_at(0, &[7u8; BLOCK_SIZE]).unwrap();
		f.truncate(0).unwrap();
		f.truncate(BLOCK_SIZE as u64).unwrap();
		let mut buf = [0xFFu8; BLOCK_SIZE];
		f.read_at(0, &mut buf).unwrap();
		assert!(buf.iter().all(|&b| b == 0));
	}
}
