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

//! Memory objects: the layer between a [`crate::memory::vmmap::VmArea`] and the page-frame
//! cache.
//!
//! Four flavors, one struct: [`MmObj`] carries a [`Kind`] that says where a missing page's
//! initial content comes from. `Anonymous` pages start zeroed; `PageBacked` pages (files and raw
//! block devices alike) are read through a [`PageSource`]; `Shadow` pages come from an ancestor
//! object (`bottom`) until this object is written to, at which point [`MmObj::dirty_page`] makes
//! a private copy — the copy-on-write mechanism `fork` relies on.

use crate::memory::pframe::PFrame;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use utils::{
	collections::btreemap::BTreeMap,
	errno,
	errno::{AllocResult, EResult},
	ptr::arc::Arc,
};

/// Something a [`MmObj`] can demand-page from: a filesystem vnode or a raw block device.
pub trait PageSource: Send + Sync {
	/// Reads the page at `pagenum` (object-relative, not byte offset) into `buf`.
	fn read_page(&self, pagenum: u64, buf: &mut [u8]) -> EResult<()>;
	/// Writes `buf` back to the page at `pagenum`.
	fn write_page(&self, pagenum: u64, buf: &[u8]) -> EResult<()>;
}

/// What backs a [`MmObj`]'s pages.
pub enum Kind {
	/// Zero-filled on first touch, never backed by anything on disk.
	Anonymous,
	/// Backed by a vnode or block device, demand-paged through a [`PageSource`].
	PageBacked(Arc<dyn PageSource>),
	/// Copy-on-write: unmodified pages are read through `bottom`; once written, a page is copied
	/// into this object's own resident map and never looked up in `bottom` again.
	Shadow {
		bottom: Arc<MmObj>,
	},
}

struct Inner {
	/// Pages this object owns outright: for `Anonymous`/`PageBacked`, every resident page; for
	/// `Shadow`, only the pages that have been copy-on-written.
	resident: BTreeMap<u64, Arc<PFrame>>,
}

/// A memory object: a resizable, page-indexed source of truth for some range of memory.
pub struct MmObj {
	id: u64,
	kind: Kind,
	/// Number of `VmArea`s (or shadow children) referencing this object. Per the reclamation
	/// rule this crate standardizes on, an object is reclaimable exactly when this count equals
	/// the number of pages still resident (every resident page is privately owned by a single
	/// mapper, so there is nothing left for anyone else to observe).
	refcount: AtomicUsize,
	inner: crate::sync::IntSpin<Inner>,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl MmObj {
	fn alloc(kind: Kind) -> AllocResult<Arc<Self>> {
		Arc::new(Self {
			id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
			kind,
			refcount: AtomicUsize::new(1),
			inner: crate::sync::IntSpin::new(Inner {
				resident: BTreeMap::new(),
			}),
		})
	}

	/// Creates a new anonymous object (demand-zero pages).
	pub fn new_anonymous() -> AllocResult<Arc<Self>> {
		Self::alloc(Kind::Anonymous)
	}

	/// Creates a new object backed by `source`.
	pub fn new_page_backed(source: Arc<dyn PageSource>) -> AllocResult<Arc<Self>> {
		Self::alloc(Kind::PageBacked(source))
	}

	/// Creates a new shadow object whose unmodified pages come from `bottom`.
	pub fn new_shadow(bottom: Arc<MmObj>) -> AllocResult<Arc<Self>> {
		bottom.ref_obj();
		Self::alloc(Kind::Shadow {
			bottom,
		})
	}

	/// Returns this object's unique identifier (used as the page-cache key alongside a page
	/// number).
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Increments the reference count (a new `VmArea` or shadow child now observes this object).
	pub fn ref_obj(&self) {
		self.refcount.fetch_add(1, Ordering::AcqRel);
	}

	/// Decrements the reference count. Returns whether the object is now reclaimable
	/// (`refcount == resident page count`, this crate's Open Question (a) standardization).
	pub fn put(&self) -> bool {
		let refs = self.refcount.fetch_sub(1, Ordering::AcqRel) - 1;
		refs == self.inner.lock().resident.len()
	}

	/// Returns the number of currently resident pages (for tests and the reclamation check).
	pub fn resident_count(&self) -> usize {
		self.inner.lock().resident.len()
	}

	/// Looks up `pagenum` among already-resident pages without paging anything in.
	pub fn lookup_page(&self, pagenum: u64) -> Option<Arc<PFrame>> {
		let local = self.inner.lock().resident.get(&pagenum).cloned();
		if local.is_some() {
			return local;
		}
		match &self.kind {
			Kind::Shadow {
				bottom,
			} => bottom.lookup_page(pagenum),
			_ => None,
		}
	}

	/// Returns the resident frame for `pagenum`, demand-paging it in if necessary.
	pub fn fill_page(&self, pagenum: u64) -> EResult<Arc<PFrame>> {
		if let Some(frame) = self.inner.lock().resident.get(&pagenum).cloned() {
			return Ok(frame);
		}
		let frame = match &self.kind {
			Kind::Anonymous => PFrame::new_zeroed()?,
			Kind::PageBacked(source) => {
				let mut buf = [0u8; utils::limits::PAGE_SIZE];
				source.read_page(pagenum, &mut buf)?;
				PFrame::new_from(&buf)?
			}
			Kind::Shadow {
				bottom,
			} => return bottom.fill_page(pagenum),
		};
		self.inner
			.lock()
			.resident
			.insert(pagenum, frame.clone())
			.map_err(|_| errno::Errno::ENOMEM)?;
		Ok(frame)
	}

	/// Returns a frame at `pagenum` that this object owns privately and may write through. For
	/// `Anonymous`/`PageBacked` this is the same frame [`Self::fill_page`] returns; for `Shadow`
	/// it performs copy-on-write the first time a given page is dirtied: the ancestor's frame is
	/// copied into a fresh, privately-owned frame stored in this object's own resident map, and
	/// the ancestor is never consulted again for that page.
	pub fn dirty_page(&self, pagenum: u64) -> EResult<Arc<PFrame>> {
		if let Some(frame) = self.inner.lock().resident.get(&pagenum).cloned() {
			frame.mark_dirty();
			return Ok(frame);
		}
		let source = self.fill_page(pagenum)?;
		let owns_it_already = matches!(self.kind, Kind::Anonymous | Kind::PageBacked(_));
		if owns_it_already {
			source.mark_dirty();
			return Ok(source);
		}
		// Shadow object, first write to this page: copy-on-write.
		let copy = source.with_data(|d| PFrame::new_from(d))?;
		copy.mark_dirty();
		self.inner
			.lock()
			.resident
			.insert(pagenum, copy.clone())
			.map_err(|_| errno::Errno::ENOMEM)?;
		Ok(copy)
	}

	/// Drops `pagenum` from this object's own resident map without writing it back, if present.
	/// Used when a `PageBacked` object's backing store shrinks out from under a cached page, so
	/// a later re-extension doesn't resurrect stale content instead of the fresh hole it should
	/// read as.
	pub fn evict_page(&self, pagenum: u64) {
		self.inner.lock().resident.remove(&pagenum);
	}

	/// Writes every dirty resident page back through its [`PageSource`] and clears their dirty
	/// bits. A no-op for `Anonymous`/`Shadow` objects, which have nothing to write back to.
	pub fn clean_pages(&self) -> EResult<()> {
		let Kind::PageBacked(source) = &self.kind else {
			return Ok(());
		};
		let inner = self.inner.lock();
		for (&pagenum, frame) in inner.resident.iter() {
			if frame.clear_dirty() {
				frame.with_data(|d| source.write_page(pagenum, d))?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn anonymous_pages_start_zeroed() {
		let obj = MmObj::new_anonymous().unwrap();
		let frame = obj.fill_page(0).unwrap();
		frame.with_data(|d| assert_eq!(d[0], 0));
	}

	#[test]
	fn shadow_reads_through_bottom_until_written() {
		let bottom = MmObj::new_anonymous().unwrap();
		let base = bottom.fill_page(0).unwrap();
		base.with_data_mut(|d| d[0] = 7);
		let shadow = MmObj::new_shadow(bottom.clone()).unwrap();
		let read = shadow.fill_page(0).unwrap();
		read.with_data(|d| assert_eq!(d[0], 7));
		assert_eq!(shadow.resident_count(), 0);
	}

	#[test]
	fn shadow_cow_on_write_detaches_from_bottom() {
		let bottom = MmObj::new_anonymous().unwrap();
		let base = bottom.fill_page(0).unwrap();
		base.with_data_mut(|d| d[0] = 7);
		let shadow = MmObj::new_shadow(bottom.clone()).unwrap();
		let private = shadow.dirty_page(0).unwrap();
		private.with_data_mut(|d| d[0] = 99);
		assert_eq!(shadow.resident_count(), 1);
		base.with_data(|d| assert_eq!(d[0], 7));
	}

	#[test]
	fn reclaim_trigger_is_refcount_eq_resident() {
		let obj = MmObj::new_anonymous().unwrap();
		obj.fill_page(0).unwrap();
		// refcount starts at 1 (the caller's own reference); one resident page. Dropping the
		// sole reference brings refcount to 0 while resident count is still 1: not reclaimable.
		assert!(!obj.put());
	}
}
