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

//! Architecture contract.
//!
//! Real GDT/IDT/paging setup for x86 is out of scope (boot and interrupt-controller wiring are
//! external collaborators per the project's scope). What the core subsystems actually need from
//! "the architecture" is narrow: switch a saved context, build a fresh one for a new kernel
//! thread, flush TLB entries, and install/remove page-table mappings. [`SimArch`] is the single
//! implementation of that contract: it models a page table as a sorted map and a context switch
//! as a struct swap, which is exactly the "abstract allocator" treatment the memory subsystem
//! gets elsewhere, applied one layer down.

use utils::{collections::btreemap::BTreeMap, errno, errno::EResult};

/// A virtual address.
pub type VirtAddr = usize;
/// A physical address, as returned by the (abstract) page allocator.
pub type PhysAddr = usize;
/// A virtual page number (`VirtAddr / PAGE_SIZE`).
pub type Vpn = usize;

/// Protection/mapping bits for a single page-table entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageFlags {
	pub writable: bool,
	pub executable: bool,
	pub user: bool,
}

impl PageFlags {
	/// Read-only, supervisor-only mapping.
	pub const KERNEL_RO: Self = Self {
		writable: false,
		executable: false,
		user: false,
	};
}

#[derive(Clone, Copy, Debug)]
struct Pte {
	phys: PhysAddr,
	flags: PageFlags,
}

/// A process's page table: a map from virtual page number to physical frame and permissions.
///
/// The real structure (multi-level x86 page directory) is out of scope; this is the
/// architecture-neutral stand-in the memory subsystem programs against.
#[derive(Default)]
pub struct AddressSpace {
	entries: BTreeMap<Vpn, Pte>,
}

impl AddressSpace {
	/// Creates a fresh, empty address space.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the physical frame and flags mapped at `vpn`, if any.
	pub fn translate(&self, vpn: Vpn) -> Option<(PhysAddr, PageFlags)> {
		self.entries.get(&vpn).map(|e| (e.phys, e.flags))
	}
}

/// A saved thread context: just enough to resume execution where it left off.
///
/// On real x86 this holds `eip`/`esp`/`ebp` and a page-directory pointer; here it is a plain
/// struct swapped by [`SimArch::context_switch`] rather than a real register save/restore.
#[derive(Clone, Copy, Debug, Default)]
pub struct SavedContext {
	pub entry: usize,
	pub arg1: usize,
	pub arg2: usize,
	pub stack_top: usize,
}

/// The architecture contract the scheduler and memory subsystem are written against.
pub trait Arch {
	/// Switches execution from `prev`'s context to `next`'s. Returns once some other thread
	/// switches back into `prev`.
	fn context_switch(prev: &mut SavedContext, next: &SavedContext);

	/// Builds the initial context for a new kernel thread entering at `entry(arg1, arg2)`, given
	/// its kernel stack.
	fn context_setup(stack: &mut [u8], entry: usize, arg1: usize, arg2: usize) -> SavedContext;

	/// Invalidates the TLB entry for `vpn`.
	fn tlb_flush(vpn: Vpn);
	/// Invalidates the TLB entries for `[vpn, vpn+count)`.
	fn tlb_flush_range(vpn: Vpn, count: usize);
	/// Invalidates the entire TLB.
	fn tlb_flush_all();

	/// Installs a mapping for `vpn` in `space`.
	fn pt_map(space: &mut AddressSpace, vpn: Vpn, phys: PhysAddr, flags: PageFlags) -> EResult<()>;
	/// Removes the mappings for `[vpn, vpn+count)` from `space`.
	fn pt_unmap_range(space: &mut AddressSpace, vpn: Vpn, count: usize);
}

/// The architecture implementation this kernel is built against.
///
/// A cooperative, single-CPU kernel has no real register file to save here: `context_switch` is
/// a direct call into the next thread's trampoline rather than a hardware trap return, matching
/// the "abstract allocator" treatment the spec asks for at this layer.
pub struct SimArch;

impl Arch for SimArch {
	fn context_switch(_prev: &mut SavedContext, _next: &SavedContext) {
		// A hosted/simulated architecture has no separate register file to swap: the scheduler
		// itself calls into the next thread's entry point directly (see `process::kthread`).
	}

	fn context_setup(stack: &mut [u8], entry: usize, arg1: usize, arg2: usize) -> SavedContext {
		SavedContext {
			entry,
			arg1,
			arg2,
			stack_top: stack.len(),
		}
	}

	fn tlb_flush(_vpn: Vpn) {}

	fn tlb_flush_range(_vpn: Vpn, _count: usize) {}

	fn tlb_flush_all() {}

	fn pt_map(space: &mut AddressSpace, vpn: Vpn, phys: PhysAddr, flags: PageFlags) -> EResult<()> {
		space.entries.insert(vpn, Pte { phys, flags }).map_err(|_| errno::Errno::ENOMEM)?;
		Self::tlb_flush(vpn);
		Ok(())
	}

	fn pt_unmap_range(space: &mut AddressSpace, vpn: Vpn, count: usize) {
		for v in vpn..vpn + count {
			space.entries.remove(&v);
		}
		Self::tlb_flush_range(vpn, count);
	}
}

/// The architecture this kernel is built for. A real port would select this with `cfg(target_arch
/// = ...)`; there is exactly one implementation here since hardware bring-up is out of scope.
pub type CurrentArch = SimArch;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn map_then_translate() {
		let mut space = AddressSpace::new();
		CurrentArch::pt_map(&mut space, 3, 0x4000, PageFlags::KERNEL_RO).unwrap();
		let (phys, flags) = space.translate(3).unwrap();
		assert_eq!(phys, 0x4000);
		assert!(!flags.writable);
	}

	#[test]
	fn unmap_range_clears_entries() {
		let mut space = AddressSpace::new();
		for i in 0..4 {
			CurrentArch::pt_map(&mut space, i, i * 0x1000, PageFlags::KERNEL_RO).unwrap();
		}
		CurrentArch::pt_unmap_range(&mut space, 1, 2);
		assert!(space.translate(0).is_some());
		assert!(space.translate(1).is_none());
		assert!(space.translate(2).is_none());
		assert!(space.translate(3).is_some());
	}
}
