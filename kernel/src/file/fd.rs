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

//! File descriptors implementation.
//!
//! A file descriptor is an ID held by a process pointing to an open file description, which
//! itself points to a [`VNode`] plus an independent seek offset.

use crate::{file::vfs::VNode, sync::IntSpin};
use core::{cmp::max, ffi::c_int};
use utils::{
	collections::vec::Vec,
	errno,
	errno::{AllocResult, CollectResult, EResult},
	limits,
	ptr::arc::Arc,
};

/// File descriptor flag: close this descriptor across `execve`.
pub const FD_CLOEXEC: i32 = 1;

/// Constraint on a new file descriptor ID.
#[derive(Debug)]
pub enum NewFDConstraint {
	/// No constraint.
	None,
	/// The new file descriptor must have the given fixed value.
	Fixed(c_int),
	/// The new file descriptor must have at least the given value.
	Min(u32),
}

/// An open file description: a vnode plus an independent seek offset, shared by every file
/// descriptor `dup`ed from the same `open` call.
pub struct OpenFile {
	vnode: Arc<VNode>,
	offset: IntSpin<u64>,
	/// `O_RDONLY`/`O_WRONLY`/`O_RDWR` and friends, as passed to `open(2)`.
	status_flags: i32,
}

impl OpenFile {
	pub fn new(vnode: Arc<VNode>, status_flags: i32) -> AllocResult<Arc<Self>> {
		Arc::new(Self {
			vnode,
			offset: IntSpin::new(0),
			status_flags,
		})
	}

	pub fn vnode(&self) -> &Arc<VNode> {
		&self.vnode
	}

	pub fn status_flags(&self) -> i32 {
		self.status_flags
	}

	pub fn offset(&self) -> u64 {
		*self.offset.lock()
	}

	pub fn set_offset(&self, offset: u64) {
		*self.offset.lock() = offset;
	}

	/// Reads into `buf` at the current offset, advancing it by the number of bytes read.
	pub fn read(&self, buf: &mut [u8]) -> EResult<usize> {
		let mut offset = self.offset.lock();
		let len = self.vnode.read_at(*offset, buf)?;
		*offset += len as u64;
		Ok(len)
	}

	/// Writes `buf` at the current offset, advancing it by the number of bytes written.
	pub fn write(&self, buf: &[u8]) -> EResult<usize> {
		let mut offset = self.offset.lock();
		let len = self.vnode.write_at(*offset, buf)?;
		*offset += len as u64;
		Ok(len)
	}
}

/// A file descriptor, pointing to an [`OpenFile`].
#[derive(Clone)]
pub struct FileDescriptor {
	/// The file descriptor's own flags (currently only `FD_CLOEXEC`); distinct from the open
	/// file description's status flags, which are shared across `dup`s.
	pub flags: i32,
	file: Arc<OpenFile>,
}

impl FileDescriptor {
	pub fn new(flags: i32, file: Arc<OpenFile>) -> Self {
		Self { flags, file }
	}

	pub fn get_file(&self) -> &Arc<OpenFile> {
		&self.file
	}
}

/// A table of file descriptors.
#[derive(Default)]
pub struct FileDescriptorTable(Vec<Option<FileDescriptor>>);

impl FileDescriptorTable {
	/// Returns the available file descriptor with the lowest ID that is at least `min`.
	fn get_available_fd(&self, min: Option<u32>) -> EResult<u32> {
		let min = min.unwrap_or(0) as usize;
		let fd = if min < self.0.len() {
			self.0[min..]
				.iter()
				.enumerate()
				.find(|(_, fd)| fd.is_none())
				.map(|(i, _)| (min + i) as u32)
		} else {
			None
		};
		match fd {
			Some(fd) => Ok(fd),
			None => {
				let id = max(self.0.len(), min) as u32;
				if id < limits::OPEN_MAX {
					Ok(id)
				} else {
					Err(errno!(EMFILE))
				}
			}
		}
	}

	/// Extends the table so that it can fit `id`, if it isn't large enough already.
	fn extend(&mut self, id: u32) -> AllocResult<()> {
		let id = id as usize;
		while self.0.len() <= id {
			self.0.push(None)?;
		}
		Ok(())
	}

	/// Installs `file` at the lowest available ID, returning it alongside a reference.
	pub fn create_fd(&mut self, flags: i32, file: Arc<OpenFile>) -> EResult<(u32, &FileDescriptor)> {
		let id = self.get_available_fd(None)?;
		let fd = FileDescriptor::new(flags, file);
		self.extend(id)?;
		let fd = self.0[id as usize].insert(fd);
		Ok((id, fd))
	}

	/// Returns an immutable reference to the file descriptor with ID `id`.
	pub fn get_fd(&self, id: c_int) -> EResult<&FileDescriptor> {
		let id: usize = id.try_into().map_err(|_| errno!(EBADF))?;
		self.0
			.get(id)
			.and_then(Option::as_ref)
			.ok_or_else(|| errno!(EBADF))
	}

	/// Returns a mutable reference to the file descriptor with ID `id`.
	pub fn get_fd_mut(&mut self, id: c_int) -> EResult<&mut FileDescriptor> {
		let id: usize = id.try_into().map_err(|_| errno!(EBADF))?;
		self.0
			.get_mut(id)
			.and_then(Option::as_mut)
			.ok_or_else(|| errno!(EBADF))
	}

	/// Duplicates the file descriptor with ID `id`.
	pub fn duplicate_fd(
		&mut self,
		id: c_int,
		constraint: NewFDConstraint,
		cloexec: bool,
	) -> EResult<(u32, &FileDescriptor)> {
		let new_id = match constraint {
			NewFDConstraint::None => self.get_available_fd(None)?,
			NewFDConstraint::Fixed(id) => {
				let id: u32 = id.try_into().map_err(|_| errno!(EBADF))?;
				if id >= limits::OPEN_MAX {
					return Err(errno!(EMFILE));
				}
				id
			}
			NewFDConstraint::Min(min) => self.get_available_fd(Some(min))?,
		};
		let old_fd = self.get_fd(id)?;
		let mut new_fd = old_fd.clone();
		new_fd.flags = if cloexec { FD_CLOEXEC } else { 0 };
		self.extend(new_id)?;
		let new_fd = self.0[new_id as usize].insert(new_fd);
		Ok((new_id, new_fd))
	}

	/// Duplicates the whole table. `cloexec` drops descriptors flagged `FD_CLOEXEC`, as on
	/// `execve`.
	pub fn duplicate(&self, cloexec: bool) -> EResult<Self> {
		let fds = self
			.0
			.iter()
			.cloned()
			.map(|fd| fd.filter(|fd| !cloexec || fd.flags & FD_CLOEXEC == 0))
			.collect::<CollectResult<Vec<_>>>()
			.0?;
		Ok(Self(fds))
	}

	/// Closes the file descriptor with ID `id`.
	pub fn close_fd(&mut self, id: c_int) -> EResult<()> {
		let id: usize = id.try_into().map_err(|_| errno!(EBADF))?;
		let fd = self.0.get_mut(id).ok_or_else(|| errno!(EBADF))?;
		let Some(_) = fd.take() else {
			return Err(errno!(EBADF));
		};
		let new_len = self
			.0
			.iter()
			.enumerate()
			.rfind(|(_, fd)| fd.is_some())
			.map(|(i, _)| i + 1)
			.unwrap_or(0);
		self.0.truncate(new_len);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{file::perm, memory::mmobj::MmObj};

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
		fn readdir(&self, _: &VNode, _: u64, _: &mut Vec<crate::file::vfs::Dirent>) -> EResult<u64> {
			Ok(0)
		}
		fn truncate(&self, _: &VNode, _: u64) -> EResult<()> {
			Ok(())
		}
	}

	fn dummy_file() -> Arc<OpenFile> {
		let vnode = VNode::new(
			1,
			perm::DEFAULT_FILE_MODE,
			0,
			1,
			MmObj::new_anonymous().unwrap(),
			Arc::new(NoOps).unwrap(),
		)
		.unwrap();
		OpenFile::new(vnode, 0).unwrap()
	}

	#[test]
	fn fd_create_assigns_lowest_free_id() {
		let mut fds = FileDescriptorTable::default();
		let (id, _) = fds.create_fd(0, dummy_file()).unwrap();
		assert_eq!(id, 0);
		let (id, _) = fds.create_fd(0, dummy_file()).unwrap();
		assert_eq!(id, 1);
	}

	#[test]
	fn fd_dup() {
		let mut fds = FileDescriptorTable::default();
		let (id, _) = fds.create_fd(0, dummy_file()).unwrap();
		assert_eq!(id, 0);
		let (id0, _) = fds.duplicate_fd(0, NewFDConstraint::None, false).unwrap();
		assert_ne!(id0, 0);
		let (id1, _) = fds
			.duplicate_fd(0, NewFDConstraint::Fixed(16), false)
			.unwrap();
		assert_eq!(id1, 16);
		let (id2, _) = fds.duplicate_fd(0, NewFDConstraint::Min(8), false).unwrap();
		assert!(id2 >= 8);
	}

	#[test]
	fn close_shrinks_table_to_highest_remaining_fd() {
		let mut fds = FileDescriptorTable::default();
		fds.create_fd(0, dummy_file()).unwrap();
		fds.create_fd(0, dummy_file()).unwrap();
		fds.close_fd(1).unwrap();
		assert!(fds.get_fd(1).is_err());
		assert!(fds.close_fd(1).is_err());
	}
}
