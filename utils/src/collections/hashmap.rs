//! An open-addressing hash map with fallible growth.
//!
//! `alloc` has no hash map of its own (it needs a source of randomness for a default hasher,
//! which the kernel cannot easily provide at every call site), and the stack stays dependency-free
//! below this crate, so this is a small FNV-1a-keyed table rather than a `hashbrown` import.

use crate::errno::{AllocError, AllocResult};
use core::{
	hash::{Hash, Hasher},
	mem,
};

const INITIAL_CAPACITY: usize = 8;

struct FnvHasher(u64);

impl FnvHasher {
	const fn new() -> Self {
		Self(0xcbf2_9ce4_8422_2325)
	}
}

impl Hasher for FnvHasher {
	fn finish(&self) -> u64 {
		self.0
	}

	fn write(&mut self, bytes: &[u8]) {
		for b in bytes {
			self.0 ^= *b as u64;
			self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
		}
	}
}

fn hash_of<K: Hash>(key: &K) -> u64 {
	let mut h = FnvHasher::new();
	key.hash(&mut h);
	h.finish()
}

enum Slot<K, V> {
	Empty,
	Tombstone,
	Occupied(K, V),
}

/// A hash map, akin to [`std::collections::HashMap`] but fallible and available in `no_std`.
pub struct HashMap<K, V> {
	slots: alloc::vec::Vec<Slot<K, V>>,
	len: usize,
}

impl<K: Hash + Eq, V> HashMap<K, V> {
	/// Creates a new, empty map. Does not allocate.
	pub const fn new() -> Self {
		Self {
			slots: alloc::vec::Vec::new(),
			len: 0,
		}
	}

	/// Returns the number of entries in the map.
	pub fn len(&self) -> usize {
		self.len
	}

	/// Returns whether the map has no entries.
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	fn capacity(&self) -> usize {
		self.slots.len()
	}

	fn find_slot(&self, key: &K) -> Option<usize> {
		if self.slots.is_empty() {
			return None;
		}
		let cap = self.capacity();
		let mut idx = (hash_of(key) as usize) % cap;
		for _ in 0..cap {
			match &self.slots[idx] {
				Slot::Occupied(k, _) if k == key => return Some(idx),
				Slot::Empty => return None,
				_ => idx = (idx + 1) % cap,
			}
		}
		None
	}

	/// Returns a reference to the value for `key`, if present.
	pub fn get(&self, key: &K) -> Option<&V> {
		let idx = self.find_slot(key)?;
		match &self.slots[idx] {
			Slot::Occupied(_, v) => Some(v),
			_ => None,
		}
	}

	/// Returns a mutable reference to the value for `key`, if present.
	pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
		let idx = self.find_slot(key)?;
		match &mut self.slots[idx] {
			Slot::Occupied(_, v) => Some(v),
			_ => None,
		}
	}

	/// Returns whether `key` is present in the map.
	pub fn contains_key(&self, key: &K) -> bool {
		self.find_slot(key).is_some()
	}

	fn grow(&mut self) -> AllocResult<()> {
		let new_cap = (self.capacity() * 2).max(INITIAL_CAPACITY);
		let mut new_slots = alloc::vec::Vec::new();
		new_slots
			.try_reserve_exact(new_cap)
			.map_err(|_| AllocError)?;
		new_slots.extend((0..new_cap).map(|_| Slot::Empty));
		let old = mem::replace(&mut self.slots, new_slots);
		for slot in old {
			if let Slot::Occupied(k, v) = slot {
				self.insert_into_slots(k, v);
			}
		}
		Ok(())
	}

	fn insert_into_slots(&mut self, key: K, value: V) -> Option<V> {
		let cap = self.capacity();
		let mut idx = (hash_of(&key) as usize) % cap;
		let mut first_tombstone = None;
		for _ in 0..cap {
			match &self.slots[idx] {
				Slot::Occupied(k, _) if *k == key => {
					let Slot::Occupied(_, old) =
						mem::replace(&mut self.slots[idx], Slot::Occupied(key, value))
					else {
						unreachable!()
					};
					return Some(old);
				}
				Slot::Empty => {
					let target = first_tombstone.unwrap_or(idx);
					self.slots[target] = Slot::Occupied(key, value);
					return None;
				}
				Slot::Tombstone => {
					if first_tombstone.is_none() {
						first_tombstone = Some(idx);
					}
					idx = (idx + 1) % cap;
				}
				_ => idx = (idx + 1) % cap,
			}
		}
		if let Some(target) = first_tombstone {
			self.slots[target] = Slot::Occupied(key, value);
		}
		None
	}

	/// Inserts a key-value pair, returning the previous value if the key was already present.
	pub fn insert(&mut self, key: K, value: V) -> AllocResult<Option<V>> {
		if self.slots.is_empty() || (self.len + 1) * 4 >= self.capacity() * 3 {
			self.grow()?;
		}
		let prev = self.insert_into_slots(key, value);
		if prev.is_none() {
			self.len += 1;
		}
		Ok(prev)
	}

	/// Removes and returns the value for `key`, if present.
	pub fn remove(&mut self, key: &K) -> Option<V> {
		let idx = self.find_slot(key)?;
		let Slot::Occupied(_, v) = mem::replace(&mut self.slots[idx], Slot::Tombstone) else {
			unreachable!()
		};
		self.len -= 1;
		Some(v)
	}

	/// Iterates over the map's key-value pairs in unspecified order.
	pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
		self.slots.iter().filter_map(|s| match s {
			Slot::Occupied(k, v) => Some((k, v)),
			_ => None,
		})
	}

	/// Iterates mutably over the map's values in unspecified order.
	pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
		self.slots.iter_mut().filter_map(|s| match s {
			Slot::Occupied(k, v) => Some((&*k, v)),
			_ => None,
		})
	}
}

impl<K: Hash + Eq, V> Default for HashMap<K, V> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn insert_get_remove() {
		let mut m: HashMap<u32, &str> = HashMap::new();
		assert!(m.insert(1, "a").unwrap().is_none());
		assert!(m.insert(2, "b").unwrap().is_none());
		assert_eq!(m.get(&1), Some(&"a"));
		assert_eq!(m.remove(&1), Some("a"));
		assert_eq!(m.get(&1), None);
		assert_eq!(m.len(), 1);
	}

	#[test]
	fn grows_past_initial_capacity() {
		let mut m: HashMap<u32, u32> = HashMap::new();
		for i in 0..200 {
			m.insert(i, i * 2).unwrap();
		}
		for i in 0..200 {
			assert_eq!(m.get(&i), Some(&(i * 2)));
		}
		assert_eq!(m.len(), 200);
	}
}
