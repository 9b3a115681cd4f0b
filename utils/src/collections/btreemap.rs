//! Ordered map, used for the virtual memory area list and the block/inode free-list index.

use crate::{TryClone, errno::AllocResult};
use core::{
	borrow::Borrow,
	fmt,
	ops::{Bound, RangeBounds},
};

/// An ordered key-value map, akin to [`alloc::collections::BTreeMap`].
///
/// `alloc`'s `BTreeMap` does not expose a fallible insertion path on stable Rust; callers that
/// need a hard allocation-failure guarantee should reserve capacity ahead of time via a sibling
/// [`crate::collections::vec::Vec`] and avoid unbounded growth in a hot path.
pub struct BTreeMap<K, V>(alloc::collections::BTreeMap<K, V>);

impl<K: Ord, V> BTreeMap<K, V> {
	/// Creates a new, empty map.
	pub const fn new() -> Self {
		Self(alloc::collections::BTreeMap::new())
	}

	/// Inserts a key-value pair, returning the previous value if the key was already present.
	pub fn insert(&mut self, key: K, value: V) -> AllocResult<Option<V>> {
		Ok(self.0.insert(key, value))
	}

	/// Removes and returns the value for `key`, if present.
	pub fn remove<Q: ?Sized + Ord>(&mut self, key: &Q) -> Option<V>
	where
		K: Borrow<Q>,
	{
		self.0.remove(key)
	}

	/// Returns a reference to the value for `key`, if present.
	pub fn get<Q: ?Sized + Ord>(&self, key: &Q) -> Option<&V>
	where
		K: Borrow<Q>,
	{
		self.0.get(key)
	}

	/// Returns a mutable reference to the value for `key`, if present.
	pub fn get_mut<Q: ?Sized + Ord>(&mut self, key: &Q) -> Option<&mut V>
	where
		K: Borrow<Q>,
	{
		self.0.get_mut(key)
	}

	/// Returns the entry with the greatest key less than or equal to `key`.
	pub fn range_before(&self, key: &K) -> Option<(&K, &V)> {
		self.0.range((Bound::Unbounded, Bound::Included(key))).next_back()
	}

	/// Iterates in key order over the map's entries within `range`.
	pub fn range<R: RangeBounds<K>>(&self, range: R) -> alloc::collections::btree_map::Range<'_, K, V> {
		self.0.range(range)
	}

	/// Returns the number of entries in the map.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns whether the map has no entries.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterates over the map's entries in key order.
	pub fn iter(&self) -> alloc::collections::btree_map::Iter<'_, K, V> {
		self.0.iter()
	}

	/// Iterates mutably over the map's values in key order.
	pub fn iter_mut(&mut self) -> alloc::collections::btree_map::IterMut<'_, K, V> {
		self.0.iter_mut()
	}

	/// Returns the first key-value pair, if any.
	pub fn first_key_value(&self) -> Option<(&K, &V)> {
		self.0.iter().next()
	}

	/// Returns the last key-value pair, if any.
	pub fn last_key_value(&self) -> Option<(&K, &V)> {
		self.0.iter().next_back()
	}
}

impl<K: Ord, V> Default for BTreeMap<K, V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K: Ord + Clone, V: Clone> TryClone for BTreeMap<K, V> {
	fn try_clone(&self) -> AllocResult<Self> {
		Ok(Self(self.0.clone()))
	}
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BTreeMap<K, V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&self.0, f)
	}
}

impl<'m, K, V> IntoIterator for &'m BTreeMap<K, V> {
	type Item = (&'m K, &'m V);
	type IntoIter = alloc::collections::btree_map::Iter<'m, K, V>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}
