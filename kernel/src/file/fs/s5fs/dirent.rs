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

//! Directory content: a packed, contiguous array of fixed-size dirents.
//!
//! A directory's content is read and written through the same vnode/mmobj path as a regular
//! file's bytes; these helpers only know how to pack and unpack one dirent's worth of that
//! content, and how to scan/splice it a directory at a time.

use crate::file::vfs::VNode;
use utils::errno::{EResult, Errno};

/// Longest name a dirent can hold, not counting a NUL terminator.
pub const NAME_LEN: usize = 60;
/// Size in bytes of one packed on-disk dirent: a 32-bit inode number plus the fixed name field.
pub const DIRENT_SIZE: usize = 4 + NAME_LEN;

fn encode(ino: u32, name: &[u8]) -> EResult<[u8; DIRENT_SIZE]> {
	if name.len() > NAME_LEN {
		return Err(Errno::ENAMETOOLONG);
	}
	let mut buf = [0u8; DIRENT_SIZE];
	buf[0..4].copy_from_slice(&ino.to_le_bytes());
	buf[4..4 + name.len()].copy_from_slice(name);
	Ok(buf)
}

fn decode(buf: &[u8; DIRENT_SIZE]) -> (u32, &[u8]) {
	let ino = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
	let name = &buf[4..];
	let len = name.iter().position(|&b| b == 0).unwrap_or(name.len());
	(ino, &name[..len])
}

/// Scans `dir`'s content for an entry named `name`, returning its byte offset and inode number.
pub fn find_dirent(dir: &VNode, name: &[u8]) -> EResult<Option<(u64, u32)>> {
	let size = dir.size();
	let mut buf = [0u8; DIRENT_SIZE];
	let mut off = 0u64;
	while off < size {
		dir.read_at(off, &mut buf)?;
		let (ino, ent_name) = decode(&buf);
		if ent_name == name {
			return Ok(Some((off, ino)));
		}
		off += DIRENT_SIZE as u64;
	}
	Ok(None)
}

/// Appends a new dirent naming `target` at the end of `dir`'s content. Does not check for an
/// existing entry of the same name, nor touch any link count; callers decide both.
pub fn link_dirent(dir: &VNode, name: &[u8], target: u32) -> EResult<()> {
	let buf = encode(target, name)?;
	let off = dir.size();
	dir.write_at(off, &buf)?;
	Ok(())
}

/// Removes the entry named `name` from `dir`'s content by overwriting it with the last dirent
/// and shrinking the directory by one entry's worth (order is not preserved). Returns the
/// removed entry's inode number.
pub fn remove_dirent(dir: &VNode, name: &[u8]) -> EResult<u32> {
	let (off, ino) = find_dirent(dir, name)?.ok_or(Errno::ENOENT)?;
	let size = dir.size();
	let last_off = size - DIRENT_SIZE as u64;
	if off != last_off {
		let mut buf = [0u8; DIRENT_SIZE];
		dir.read_at(last_off, &mut buf)?;
		dir.write_at(off, &buf)?;
	}
	dir.set_size(last_off);
	Ok(ino)
}

/// Lists every entry in `dir` starting at byte `offset`, appending `(ino, name)` pairs to `out`.
/// Returns the offset to resume from (always `dir.size()`: there is no natural buffer-size limit
/// to page against here, so a single call drains the rest of the directory).
pub fn list_dirents(
	dir: &VNode,
	offset: u64,
	out: &mut utils::collections::vec::Vec<(u32, utils::collections::vec::Vec<u8>)>,
) -> EResult<u64> {
	let size = dir.size();
	let mut buf = [0u8; DIRENT_SIZE];
	let mut off = offset;
	while off < size {
		dir.read_at(off, &mut buf)?;
		let (ino, name) = decode(&buf);
		let mut owned = utils::collections::vec::Vec::new();
		owned.extend_from_slice(name)?;
		out.push((ino, owned))?;
		off += DIRENT_SIZE as u64;
	}
	Ok(size)
}
