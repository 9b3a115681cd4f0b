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

//! A process's virtual address space: a sorted, disjoint set of [`VmArea`]s.
//!
//! Areas are indexed by starting page number in a [`BTreeMap`], which gives gap search and
//! overlap checks a free `range`/`range_before` instead of a linear scan.

use crate::{
	arch::{PageFlags, Vpn},
	memory::mmobj::MmObj,
};
use utils::{
	collections::btreemap::BTreeMap,
	errno,
	errno::{AllocResult, EResult},
	ptr::arc::Arc,
};

/// Search direction for [`VmMap::find_range`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchDir {
	/// Prefer the lowest addresses (used for explicit, low, fixed-ish hints).
	LowToHigh,
	/// Prefer the highest addresses (used for the default `mmap` placement, mimicking the stack
	/// growing down from the top of the address space).
	HighToLow,
}

/// A single contiguous mapping: `[start, end)` in page numbers, backed by `obj` starting at
/// `obj_offset` pages into it.
#[derive(Clone)]
pub struct VmArea {
	pub start: Vpn,
	pub end: Vpn,
	pub prot: PageFlags,
	pub obj: Arc<MmObj>,
	pub obj_offset: u64,
	/// Whether this area is private (copy-on-write on fork) or shared (left untouched on fork,
	/// writes visible to every other mapper of `obj`).
	pub private: bool,
}

impl VmArea {
	/// Returns the number of pages this area spans.
	pub fn len(&self) -> usize {
		self.end - self.start
	}

	/// Returns whether the area is empty (`start == end`; never constructed but guarded against).
	pub fn is_empty(&self) -> bool {
		self.start == self.end
	}

	/// Translates `vpn` (which must lie within this area) to a page offset into `obj`.
	pub fn obj_pagenum(&self, vpn: Vpn) -> u64 {
		self.obj_offset + (vpn - self.start) as u64
	}
}

/// A process's address space: an ordered, non-overlapping set of [`VmArea`]s.
pub struct VmMap {
	areas: BTreeMap<Vpn, VmArea>,
	/// Total number of addressable pages (bounds gap search).
	limit: Vpn,
}

impl VmMap {
	/// Creates an empty address space spanning `[0, limit)` pages.
	pub fn new(limit: Vpn) -> Self {
		Self {
			areas: BTreeMap::new(),
			limit,
		}
	}

	/// Returns the area containing `vpn`, if any.
	pub fn lookup(&self, vpn: Vpn) -> Option<&VmArea> {
		let (_, area) = self.areas.range_before(&(vpn + 1))?;
		(area.start <= vpn && vpn < area.end).then_some(area)
	}

	/// Inserts `area`, failing with `EINVAL` if it overlaps an existing one.
	pub fn insert(&mut self, area: VmArea) -> EResult<()> {
		if self.overlaps(area.start, area.end) {
			return Err(errno::Errno::EINVAL);
		}
		self.areas
			.insert(area.start, area)
			.map_err(|_| errno::Errno::ENOMEM)?;
		Ok(())
	}

	fn overlaps(&self, start: Vpn, end: Vpn) -> bool {
		if let Some((_, before)) = self.areas.range_before(&end) {
			if before.end > start {
				return true;
			}
		}
		false
	}

	/// Finds `count` contiguous free pages, searching in `dir`.
	pub fn find_range(&self, count: usize, dir: SearchDir) -> EResult<Vpn> {
		if count == 0 || count > self.limit {
			return Err(errno::Errno::ENOMEM);
		}
		let mut boundaries: utils::collections::vec::Vec<(Vpn, Vpn)> = utils::collections::vec::Vec::new();
		let mut prev_end = 0;
		for (_, area) in self.areas.iter() {
			if area.start > prev_end {
				boundaries.push((prev_end, area.start)).map_err(|_| errno::Errno::ENOMEM)?;
			}
			prev_end = prev_end.max(area.end);
		}
		if prev_end < self.limit {
			boundaries.push((prev_end, self.limit)).map_err(|_| errno::Errno::ENOMEM)?;
		}
		let pick = match dir {
			SearchDir::LowToHigh => boundaries.iter().copied().find(|(s, e)| e - s >= count),
			SearchDir::HighToLow => boundaries.iter().copied().rev().find(|(s, e)| e - s >= count),
		};
		let (start, end) = pick.ok_or(errno::Errno::ENOMEM)?;
		let base = match dir {
			SearchDir::LowToHigh => start,
			SearchDir::HighToLow => end - count,
		};
		Ok(base)
	}

	/// Maps `count` pages backed by `obj` (starting at `obj_offset`) at `start`, either at the
	/// caller-provided fixed address or at a freshly found gap.
	///
	/// `obj` is consumed: the caller must hand over a reference it owns (fresh from
	/// [`MmObj::new_anonymous`]/[`MmObj::new_page_backed`], or already `ref_obj`'d if it is a
	/// clone of an object some other holder keeps using, such as a vnode's `mmobj`).
	///
	/// If `private`, `obj` is wrapped in a fresh shadow object before the area is installed, so
	/// writes land in the shadow rather than `obj` itself; a shared mapping installs `obj`
	/// directly and writes through to every other mapper of it.
	pub fn map(
		&mut self,
		start: Option<Vpn>,
		count: usize,
		prot: PageFlags,
		obj: Arc<MmObj>,
		obj_offset: u64,
		private: bool,
	) -> EResult<Vpn> {
		let start = match start {
			Some(s) => {
				if s + count > self.limit || self.overlaps(s, s + count) {
					return Err(errno::Errno::EINVAL);
				}
				s
			}
			None => self.find_range(count, SearchDir::HighToLow)?,
		};
		let obj = if private {
			let shadow = MmObj::new_shadow(obj.clone())?;
			obj.put();
			shadow
		} else {
			obj
		};
		self.insert(VmArea {
			start,
			end: start + count,
			prot,
			obj,
			obj_offset,
			private,
		})?;
		Ok(start)
	}

	/// Unmaps `[start, start+count)`, splitting or shrinking any area that straddles the
	/// boundary. Pages entirely outside any area are silently ignored, matching `munmap(2)`.
	pub fn remove(&mut self, start: Vpn, count: usize) -> EResult<()> {
		let end = start + count;
		let mut overlapping: utils::collections::vec::Vec<Vpn> = utils::collections::vec::Vec::new();
		for (&k, a) in self.areas.iter() {
			if a.start < end && a.end > start {
				overlapping.push(k).map_err(|_| errno::Errno::ENOMEM)?;
			}
		}
		for key in overlapping {
			let area = self.areas.remove(&key).expect("key came from this map");
			area.obj.put();
			if area.start < start {
				let mut left = area.clone();
				left.end = start;
				self.areas.insert(left.start, left).map_err(|_| errno::Errno::ENOMEM)?;
				area.obj.ref_obj();
			}
			if area.end > end {
				let mut right = area.clone();
				right.start = end;
				right.obj_offset += (end - area.start) as u64;
				self.areas.insert(right.start, right).map_err(|_| errno::Errno::ENOMEM)?;
				area.obj.ref_obj();
			}
		}
		Ok(())
	}

	/// Produces a copy-on-write clone of this address space, as `fork` does: every PRIVATE
	/// mapping's backing object is replaced, in both the parent and the child, by a fresh shadow
	/// object over the same `bottom`, so neither copy writes through to the other nor to any
	/// other still-living fork sibling. SHARED areas are left untouched: the child gets its own
	/// reference to the same object, and writes through either side stay visible to both.
	pub fn fork_cow(&mut self) -> AllocResult<Self> {
		let mut child = Self::new(self.limit);
		let mut replaced = utils::collections::vec::Vec::new();
		for (&key, area) in self.areas.iter() {
			if area.private {
				let parent_shadow = MmObj::new_shadow(area.obj.clone())?;
				let child_shadow = MmObj::new_shadow(area.obj.clone())?;
				// Each shadow took its own reference to `bottom` via `new_shadow`; the area's
				// original direct reference is being replaced below, so release it.
				area.obj.put();
				let mut child_area = area.clone();
				child_area.obj = child_shadow;
				child.areas.insert(key, child_area)?;
				let mut parent_area = area.clone();
				parent_area.obj = parent_shadow;
				replaced.push((key, parent_area))?;
			} else {
				area.obj.ref_obj();
				child.areas.insert(key, area.clone())?;
			}
		}
		for (key, area) in replaced {
			self.areas.insert(key, area)?;
		}
		Ok(child)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::arch::PageFlags;

	fn anon_area(start: Vpn, count: usize) -> VmArea {
		VmArea {
			start,
			end: start + count,
			prot: PageFlags::KERNEL_RO,
			obj: MmObj::new_anonymous().unwrap(),
			obj_offset: 0,
			private: true,
		}
	}

	#[test]
	fn insert_rejects_overlap() {
		let mut map = VmMap::new(1024);
		map.insert(anon_area(10, 10)).unwrap();
		assert_eq!(map.insert(anon_area(15, 1)).unwrap_err(), errno::Errno::EINVAL);
	}

	#[test]
	fn lookup_finds_containing_area() {
		let mut map = VmMap::new(1024);
		map.insert(anon_area(10, 10)).unwrap();
		assert!(map.lookup(15).is_some());
		assert!(map.lookup(5).is_none());
		assert!(map.lookup(20).is_none());
	}

	#[test]
	fn find_range_high_to_low_prefers_top() {
		let map = VmMap::new(100);
		let base = map.find_range(10, SearchDir::HighToLow).unwrap();
		assert_eq!(base, 90);
	}

	#[test]
	fn remove_splits_straddled_area() {
		let mut map = VmMap::new(1024);
		map.insert(anon_area(0, 20)).unwrap();
		map.remove(5, 5).unwrap();
		assert!(map.lookup(2).is_some());
		assert!(map.lookup(6).is_none());
		assert!(map.lookup(12).is_some());
	}

	#[test]
	fn fork_cow_isolates_writes() {
		let mut map = VmMap::new(1024);
		map.insert(anon_area(0, 1)).unwrap();
		let base_obj = map.lookup(0).unwrap().obj.clone();
		let frame = base_obj.fill_page(0).unwrap();
		frame.with_data_mut(|d| d[0] = 1);
		let mut child = map.fork_cow().unwrap();
		let parent_obj = map.lookup(0).unwrap().obj.clone();
		let child_obj = child.lookup(0).unwrap().obj.clone();
		parent_obj.dirty_page(0).unwrap().with_data_mut(|d| d[0] = 2);
		let child_read = child_obj.fill_page(0).unwrap();
		child_read.with_data(|d| assert_eq!(d[0], 1));
	}

	#[test]
	fn fork_cow_leaves_shared_areas_untouched() {
		let mut map = VmMap::new(1024);
		let mut area = anon_area(0, 1);
		area.private = false;
		map.insert(area).unwrap();
		let base_obj = map.lookup(0).unwrap().obj.clone();
		let frame = base_obj.fill_page(0).unwrap();
		frame.with_data_mut(|d| d[0] = 1);
		let mut child = map.fork_cow().unwrap();
		let parent_obj = map.lookup(0).unwrap().obj.clone();
		let child_obj = child.lookup(0).unwrap().obj.clone();
		assert_eq!(parent_obj.id(), base_obj.id());
		assert_eq!(child_obj.id(), base_obj.id());
		parent_obj.dirty_page(0).unwrap().with_data_mut(|d| d[0] = 2);
		let child_read = child_obj.fill_page(0).unwrap();
		child_read.with_data(|d| assert_eq!(d[0], 2));
	}
}
