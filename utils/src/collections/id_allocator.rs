//! Bitfield-backed allocator handing out small unique integer IDs.
//!
//! Used for PID allocation and for the filesystem's in-memory free-inode index; both want a
//! dense, reusable ID space without scanning a linked free list on every request.

use crate::{collections::vec::Vec, errno::AllocResult};

/// Allocates unique IDs in the range `0..capacity`.
pub struct IDAllocator {
	/// One bit per ID: set means allocated.
	bitfield: Vec<u8>,
	capacity: usize,
	/// Hint for the next search start, to avoid rescanning low IDs that are usually taken.
	cursor: usize,
}

impl IDAllocator {
	/// Creates a new allocator for IDs in `0..capacity`.
	pub fn new(capacity: usize) -> AllocResult<Self> {
		let bytes = capacity.div_ceil(8);
		let mut bitfield = Vec::with_capacity(bytes)?;
		for _ in 0..bytes {
			bitfield.push(0)?;
		}
		Ok(Self {
			bitfield,
			capacity,
			cursor: 0,
		})
	}

	/// Returns whether `id` is marked as used.
	pub fn is_used(&self, id: usize) -> bool {
		if id >= self.capacity {
			return true;
		}
		self.bitfield[id / 8] & (1 << (id % 8)) != 0
	}

	/// Marks `id` as used, regardless of its previous state.
	pub fn set_used(&mut self, id: usize) {
		if id < self.capacity {
			self.bitfield[id / 8] |= 1 << (id % 8);
		}
	}

	/// Marks `id` as free.
	pub fn free(&mut self, id: usize) {
		if id < self.capacity {
			self.bitfield[id / 8] &= !(1 << (id % 8));
		}
	}

	/// Allocates and returns the lowest free ID, starting the search at `hint` if given.
	pub fn alloc(&mut self, hint: Option<usize>) -> AllocResult<usize> {
		let start = hint.unwrap_or(self.cursor).min(self.capacity.saturating_sub(1));
		for off in 0..self.capacity {
			let id = (start + off) % self.capacity;
			if !self.is_used(id) {
				self.set_used(id);
				self.cursor = (id + 1) % self.capacity.max(1);
				return Ok(id);
			}
		}
		Err(crate::errno::AllocError)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn alloc_free_roundtrip() {
		let mut a = IDAllocator::new(8).unwrap();
		let x = a.alloc(None).unwrap();
		assert_eq!(x, 0);
		let y = a.alloc(None).unwrap();
		assert_eq!(y, 1);
		a.free(x);
		assert!(!a.is_used(x));
		assert!(a.is_used(y));
	}

	#[test]
	fn exhaustion_errors() {
		let mut a = IDAllocator::new(2).unwrap();
		a.alloc(None).unwrap();
		a.alloc(None).unwrap();
		assert!(a.alloc(None).is_err());
	}
}
