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

//! The single entry point a page fault is delivered to.
//!
//! An (out-of-scope) architecture layer decodes the faulting address and whether the access was
//! a write from its trap frame, then calls [`handle_page_fault`]. Everything from there on is
//! architecture-neutral.

use crate::{
	arch::{Arch, CurrentArch, PageFlags, PhysAddr, Vpn, VirtAddr},
	memory::{pframe::PFrame, vmmap::VmMap},
};
use utils::{errno, errno::EResult, limits::PAGE_SIZE, ptr::arc::Arc};

/// A fault's access kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessKind {
	Read,
	Write,
	/// An instruction fetch. No instruction stream is actually simulated by
	/// [`crate::arch::SimArch`]; this variant exists so the permission check below can still be
	/// exercised by a caller that decodes a real architecture's fault cause bits.
	Exec,
}

/// Handles a page fault at `addr` in `map`, installing a mapping in `space` on success.
///
/// 1. Find the [`crate::memory::vmmap::VmArea`] covering `addr`; no match is `EFAULT`
///    (access to unmapped memory).
/// 2. Check `access` against the area's protection: a write to a non-writable area, or an
///    instruction fetch from a non-executable area, is `EFAULT`.
/// 3. Translate `addr` to the backing object's page number.
/// 4. Resolve the resident frame via [`crate::memory::mmobj::MmObj::fill_page`] (read or exec) or
///    [`crate::memory::mmobj::MmObj::dirty_page`] (write, triggering copy-on-write for a shadow
///    object).
/// 5. Pin the frame for the duration of the mapping — the spec's page-frame cache never evicts a
///    mapped page out from under a live `AddressSpace` entry.
/// 6. Install the translation in `space` and flush the stale TLB entry, if any.
pub fn handle_page_fault(
	map: &VmMap,
	space: &mut crate::arch::AddressSpace,
	addr: VirtAddr,
	access: AccessKind,
) -> EResult<()> {
	let vpn: Vpn = addr / PAGE_SIZE;
	let area = map.lookup(vpn).ok_or(errno::Errno::EFAULT)?;
	if access == AccessKind::Write && !area.prot.writable {
		return Err(errno::Errno::EFAULT);
	}
	if access == AccessKind::Exec && !area.prot.executable {
		return Err(errno::Errno::EFAULT);
	}
	let obj_pagenum = area.obj_pagenum(vpn);
	let frame: Arc<PFrame> = match access {
		AccessKind::Read | AccessKind::Exec => area.obj.fill_page(obj_pagenum)?,
		AccessKind::Write => area.obj.dirty_page(obj_pagenum)?,
	};
	frame.pin();
	let phys = frame_phys_addr(&frame);
	CurrentArch::pt_map(space, vpn, phys, area.prot)?;
	Ok(())
}

/// Resolves a frame's backing physical address for the page table.
///
/// `PFrame` has no real physical backing in [`crate::arch::SimArch`] (there is no buddy
/// allocator to hand one out; real hardware bring-up is out of scope), so this derives a stable,
/// distinguishing value from the frame's identity instead of a genuine frame number.
fn frame_phys_addr(frame: &Arc<PFrame>) -> PhysAddr {
	Arc::as_ptr(frame).addr()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{arch::AddressSpace, memory::{mmobj::MmObj, vmmap::VmArea}};

	#[test]
	fn fault_on_unmapped_address_is_efault() {
		let map = VmMap::new(1024);
		let mut space = AddressSpace::new();
		let err = handle_page_fault(&map, &mut space, 0, AccessKind::Read).unwrap_err();
		assert_eq!(err, errno::Errno::EFAULT);
	}

	#[test]
	fn read_fault_maps_zeroed_anonymous_page() {
		let mut map = VmMap::new(1024);
		let obj = MmObj::new_anonymous().unwrap();
		map.insert(VmArea {
			start: 0,
			end: 1,
			prot: PageFlags {
				writable: true,
				executable: false,
				user: true,
			},
			obj,
			obj_offset: 0,
			private: true,
		})
		.unwrap();
		let mut space = AddressSpace::new();
		handle_page_fault(&map, &mut space, 0, AccessKind::Read).unwrap();
		assert!(space.translate(0).is_some());
	}

	#[test]
	fn write_fault_to_readonly_area_is_efault() {
		let mut map = VmMap::new(1024);
		let obj = MmObj::new_anonymous().unwrap();
		map.insert(VmArea {
			start: 0,
			end: 1,
			prot: PageFlags::KERNEL_RO,
			obj,
			obj_offset: 0,
			private: true,
		})
		.unwrap();
		let mut space = AddressSpace::new();
		let err = handle_page_fault(&map, &mut space, 0, AccessKind::Write).unwrap_err();
		assert_eq!(err, errno::Errno::EFAULT);
	}

	#[test]
	fn exec_fault_to_non_executable_area_is_efault() {
		let mut map = VmMap::new(1024);
		let obj = MmObj::new_anonymous().unwrap();
		map.insert(VmArea {
			start: 0,
			end: 1,
			prot: PageFlags::KERNEL_RO,
			obj,
			obj_offset: 0,
			private: true,
		})
		.unwrap();
		let mut space = AddressSpace::new();
		let err = handle_page_fault(&map, &mut space, 0, AccessKind::Exec).unwrap_err();
		assert_eq!(err, errno::Errno::EFAULT);
	}

	#[test]
	fn exec_fault_to_executable_area_maps_page() {
		let mut map = VmMap::new(1024);
		let obj = MmObj::new_anonymous().unwrap();
		map.insert(VmArea {
			start: 0,
			end: 1,
			prot: PageFlags {
				writable: false,
				executable: true,
				user: true,
			},
			obj,
			obj_offset: 0,
			private: true,
		})
		.unwrap();
		let mut space = AddressSpace::new();
		handle_page_fault(&map, &mut space, 0, AccessKind::Exec).unwrap();
		assert!(space.translate(0).is_some());
	}
}
