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

//! Maestro is a Unix kernel written in Rust. This reference documents
//! interfaces for modules and the kernel's internals.
//!
//! This build targets a single simulated CPU with no real bus/storage/display hardware: boot is
//! reduced to formatting a RAM-backed root filesystem and spawning init, everything the process,
//! memory and filesystem subsystems actually need to be exercised end to end.
//!
//! # Features
//!
//! The crate has the following features:
//! - `strace`: if enabled, the kernel traces system calls. This is a debug feature.

#![no_std]
#![feature(adt_const_params)]
#![feature(alloc_layout_extra)]
#![feature(allocator_api)]
#![feature(allow_internal_unstable)]
#![feature(array_chunks)]
#![feature(custom_test_frameworks)]
#![feature(debug_closure_helpers)]
#![feature(lang_items)]
#![feature(likely_unlikely)]
#![feature(negative_impls)]
#![feature(non_null_from_ref)]
#![feature(offset_of_enum)]
#![feature(once_cell_try)]
#![feature(pointer_is_aligned_to)]
#![feature(ptr_metadata)]
#![feature(strict_provenance_lints)]
#![feature(unsigned_nonzero_div_ceil)]
#![deny(fuzzy_provenance_casts)]
#![deny(missing_docs)]
#![allow(clippy::tabs_in_doc_comments)]
#![allow(dead_code)]
#![allow(incomplete_features)]
#![allow(internal_features)]
#![allow(unsafe_op_in_unsafe_fn)]
#![test_runner(crate::selftest::runner)]
#![reexport_test_harness_main = "kernel_selftest"]

extern crate alloc;

pub mod arch;
pub mod cmdline;
#[macro_use]
pub mod config;
pub mod device;
pub mod file;
pub mod logger;
pub mod memory;
#[macro_use]
pub mod panic;
#[macro_use]
pub mod print;
pub mod process;
pub mod selftest;
pub mod sync;
pub mod syscall;

pub use utils;

use crate::{
	device::{NullDevice, RamDisk, ZeroDevice, make_devid, register_char_device},
	file::{fs::s5fs::{S5Fs, BLOCK_SIZE}, perm},
	process::proc::Process,
};
use utils::{errno::EResult, ptr::arc::Arc};

/// The kernel's name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Current kernel version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Major number shared by the two built-in memory-backed character devices.
const MEM_MAJOR: u8 = 1;
/// Minor number of `/dev/null`, matching the traditional Unix assignment.
const NULL_MINOR: u8 = 3;
/// Minor number of `/dev/zero`, matching the traditional Unix assignment.
const ZERO_MINOR: u8 = 5;

static NULL_DEVICE: NullDevice = NullDevice;
static ZERO_DEVICE: ZeroDevice = ZeroDevice;

/// Brings up the kernel's core subsystems and returns the init process (PID 1).
///
/// This stands in for the real boot sequence (multiboot parsing, ACPI, SMP bring-up, storage
/// controller enumeration): out of scope here, so the root filesystem is a RAM disk formatted on
/// the spot rather than read off a real block device named on the command line.
pub fn boot(num_inodes: u32, block_count: u64) -> EResult<Arc<Process>> {
	register_char_device(make_devid(MEM_MAJOR, NULL_MINOR), &NULL_DEVICE)?;
	register_char_device(make_devid(MEM_MAJOR, ZERO_MINOR), &ZERO_DEVICE)?;

	let disk = RamDisk::new(BLOCK_SIZE, block_count);
	let fs = S5Fs::format(Arc::new(disk)?, num_inodes)?;
	let root = fs.root()?;
	file::set_root(root.clone());

	root.mknod(b"null", perm::S_IFCHR | 0o666, make_devid(MEM_MAJOR, NULL_MINOR))?;
	root.mknod(b"zero", perm::S_IFCHR | 0o666, make_devid(MEM_MAJOR, ZERO_MINOR))?;

	Ok(Process::init(root)?)
}
