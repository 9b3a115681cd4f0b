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

//! Files: the virtual filesystem ([`vfs`]), file descriptors ([`fd`]), path handling ([`path`]),
//! access mode bits ([`perm`]), and the on-disk filesystem implementation ([`fs`]).
//!
//! There is a single mounted filesystem, loaded at boot from the root block device named on the
//! command line; a general mount-point tree is out of scope.

pub mod fd;
pub mod fs;
pub mod path;
pub mod perm;
pub mod vfs;

use utils::ptr::arc::Arc;
use vfs::VNode;

/// Type representing a file mode: a pair of file-type bits and owner `rwx` bits.
pub type Mode = u32;

/// The process-global root and current-working-directory vnodes, set up once at boot.
pub struct Mount {
	pub root: Arc<VNode>,
}

impl Mount {
	pub fn new(root: Arc<VNode>) -> Self {
		Self { root }
	}
}

static MOUNT: crate::sync::IntSpin<Option<Mount>> = crate::sync::IntSpin::new(None);

/// Mounts `root` as the filesystem's root vnode. Called once, at boot.
pub fn set_root(root: Arc<VNode>) {
	*MOUNT.lock() = Some(Mount::new(root));
}

/// Returns the mounted filesystem's root vnode.
///
/// # Panics
///
/// Panics if [`set_root`] has not been called yet.
pub fn root() -> Arc<VNode> {
	MOUNT
		.lock()
		.as_ref()
		.expect("the root filesystem has not been mounted")
		.root
		.clone()
}
