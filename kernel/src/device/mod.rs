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

//! Minimal device abstractions.
//!
//! Real bus enumeration (ACPI/PCI), storage controllers (ATA) and the TTY are out of scope: this
//! module only keeps the two seams the core subsystems actually need from "a device" —
//! block-addressable storage for the filesystem, and a byte sink for the logger — plus the
//! in-memory implementations used to back tests and the default `/dev` nodes.

use crate::sync::IntSpin;
use utils::{collections::btreemap::BTreeMap, errno, errno::EResult};

/// A storage device addressable in fixed-size blocks, the unit S5FS reads and writes in.
pub trait BlockDevice: Send + Sync {
	/// Returns the device's block size in bytes.
	fn block_size(&self) -> usize;
	/// Returns the number of blocks on the device.
	fn block_count(&self) -> u64;
	/// Reads block `index` into `buf`, which must be at least [`Self::block_size`] long.
	fn read_block(&self, index: u64, buf: &mut [u8]) -> EResult<()>;
	/// Writes `buf` to block `index`. `buf` must be at least [`Self::block_size`] long.
	fn write_block(&self, index: u64, buf: &[u8]) -> EResult<()>;
}

/// A device that is read and written as an unstructured byte stream.
pub trait CharDevice: Send + Sync {
	/// Reads up to `buf.len()` bytes, returning the number of bytes read.
	fn read(&self, buf: &mut [u8]) -> EResult<usize>;
	/// Writes `buf`, returning the number of bytes written.
	fn write(&self, buf: &[u8]) -> usize;
}

/// An in-memory block device, used by tests and as the default root filesystem backing store
/// when no real storage controller is present.
pub struct RamDisk {
	block_size: usize,
	data: IntSpin<alloc::vec::Vec<u8>>,
}

impl RamDisk {
	/// Creates a new RAM disk of `block_count` blocks of `block_size` bytes each, zero-filled.
	pub fn new(block_size: usize, block_count: u64) -> Self {
		Self {
			block_size,
			data: IntSpin::new(alloc::vec![0u8; block_size * block_count as usize]),
		}
	}
}

impl BlockDevice for RamDisk {
	fn block_size(&self) -> usize {
		self.block_size
	}

	fn block_count(&self) -> u64 {
		(self.data.lock().len() / self.block_size) as u64
	}

	fn read_block(&self, index: u64, buf: &mut [u8]) -> EResult<()> {
		let data = self.data.lock();
		let off = index as usize * self.block_size;
		let end = off.checked_add(self.block_size).ok_or(errno!(EINVAL))?;
		if end > data.len() || buf.len() < self.block_size {
			return Err(errno!(EINVAL));
		}
		buf[..self.block_size].copy_from_slice(&data[off..end]);
		Ok(())
	}

	fn write_block(&self, index: u64, buf: &[u8]) -> EResult<()> {
		let mut data = self.data.lock();
		let off = index as usize * self.block_size;
		let end = off.checked_add(self.block_size).ok_or(errno!(EINVAL))?;
		if end > data.len() || buf.len() < self.block_size {
			return Err(errno!(EINVAL));
		}
		data[off..end].copy_from_slice(&buf[..self.block_size]);
		Ok(())
	}
}

/// `/dev/null` equivalent: discards writes, reads return EOF.
pub struct NullDevice;

impl CharDevice for NullDevice {
	fn read(&self, _buf: &mut [u8]) -> EResult<usize> {
		Ok(0)
	}

	fn write(&self, buf: &[u8]) -> usize {
		buf.len()
	}
}

/// `/dev/zero` equivalent: reads return an endless stream of zero bytes.
pub struct ZeroDevice;

impl CharDevice for ZeroDevice {
	fn read(&self, buf: &mut [u8]) -> EResult<usize> {
		buf.fill(0);
		Ok(buf.len())
	}

	fn write(&self, buf: &[u8]) -> usize {
		buf.len()
	}
}

/// The kernel log sink. Real hardware would route this to a serial port or VGA text buffer; the
/// driver layer for either is out of scope, so logs otherwise only live in the logger's
/// in-memory ring buffer (see [`crate::logger`]).
static CONSOLE: NullDevice = NullDevice;

/// Returns the device backing [`crate::println!`] output.
pub fn console() -> &'static dyn CharDevice {
	&CONSOLE
}

/// Packs an 8-bit major/minor pair into the 16-bit `devid` an S5FS `CHR`/`BLK` inode stores.
pub const fn make_devid(major: u8, minor: u8) -> u32 {
	((major as u32) << 8) | minor as u32
}

static CHAR_DEVICES: IntSpin<BTreeMap<u32, &'static dyn CharDevice>> = IntSpin::new(BTreeMap::new());
static BLOCK_DEVICES: IntSpin<BTreeMap<u32, &'static dyn BlockDevice>> = IntSpin::new(BTreeMap::new());

/// Registers `dev` as the character device named `devid`, as `kernel_main` does for `/dev/null`
/// and `/dev/zero` before `mknod`-ing their directory entries.
pub fn register_char_device(devid: u32, dev: &'static dyn CharDevice) -> utils::errno::AllocResult<()> {
	CHAR_DEVICES.lock().insert(devid, dev)?;
	Ok(())
}

/// Registers `dev` as the block device named `devid`. Block device 0 is the root disk.
pub fn register_block_device(devid: u32, dev: &'static dyn BlockDevice) -> utils::errno::AllocResult<()> {
	BLOCK_DEVICES.lock().insert(devid, dev)?;
	Ok(())
}

/// Looks up a previously registered character device by its packed major/minor `devid`.
pub fn char_device(devid: u32) -> EResult<&'static dyn CharDevice> {
	CHAR_DEVICES.lock().get(&devid).copied().ok_or(errno!(ENXIO))
}

/// Looks up a previously registered block device by its packed major/minor `devid`.
pub fn block_device(devid: u32) -> EResult<&'static dyn BlockDevice> {
	BLOCK_DEVICES.lock().get(&devid).copied().ok_or(errno!(ENXIO))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ramdisk_read_write_roundtrip() {
		let disk = RamDisk::new(512, 4);
		let mut block = [0xAB; 512];
		disk.write_block(1, &block).unwrap();
		block.fill(0);
		disk.read_block(1, &mut block).unwrap();
		assert!(block.iter().all(|&b| b == 0xAB));
	}

	#[test]
	fn ramdisk_rejects_out_of_range_block() {
		let disk = RamDisk::new(512, 2);
		let buf = [0u8; 512];
		assert!(disk.write_block(5, &buf).is_err());
	}

	#[test]
	fn zero_device_fills_buffer() {
		let dev = ZeroDevice;
		let mut buf = [1u8; 16];
		assert_eq!(dev.read(&mut buf).unwrap(), 16);
		assert!(buf.iter().all(|&b| b == 0));
	}

	#[test]
	fn char_device_registry_roundtrip() {
		static ZERO: ZeroDevice = ZeroDevice;
		let devid = make_devid(1, 5);
		register_char_device(devid, &ZERO).unwrap();
		let dev = char_device(devid).unwrap();
		let mut buf = [1u8; 4];
		dev.read(&mut buf).unwrap();
		assert_eq!(buf, [0u8; 4]);
		assert!(char_device(make_devid(9, 9)).is_err());
	}
}
