use alloc::collections::TryReserveError;
use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;
use core::ops::Index;

use cfg_if::cfg_if;

use crate::hash_table;
use crate::hash_table::HashTable;
use crate::random::DefaultRandom;
use crate::random::RandomIndex;

cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used when none is supplied.
        ///
        /// Each instance is seeded independently, so two maps hash the same
        /// key differently.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used when none is supplied.
        pub type DefaultHashBuilder = std::hash::RandomState;
    } else {
        /// Placeholder when neither `foldhash` nor `std` is enabled. A hasher
        /// builder has to be passed explicitly.
        #[derive(Clone, Copy, Debug)]
        pub enum DefaultHashBuilder {}
    }
}

/// A hash map built on the Swiss-table [`HashTable`].
///
/// `HashMap<K, V, S, R>` stores key-value pairs where keys implement
/// `Hash + Eq`. Keys are hashed with the hasher builder `S`, and iteration
/// starts at a group chosen by `R`, so the visiting order differs from one
/// iterator to the next.
///
/// # Performance Characteristics
///
/// - **Memory**: 1 byte of control metadata per slot, plus the size of `K`
///   and `V`. The table holds at most 14 resident entries per 16 slots.
/// - **Lookups**: one SIMD comparison per probed group; full key comparisons
///   only for slots whose 7-bit hash fragment matches.
///
/// # Examples
///
/// ```rust
/// use swiss_map::HashMap;
///
/// let mut map: HashMap<&str, i32> = HashMap::with_capacity(10);
/// map.put("a", 1);
/// map.put("b", 2);
/// map.put("c", 3);
///
/// assert_eq!(map.get("b"), Some(&2));
/// assert!(map.delete("a"));
/// assert_eq!(map.get("a"), None);
/// assert_eq!(map.count(), 2);
/// ```
#[derive(Clone)]
pub struct HashMap<K, V, S = DefaultHashBuilder, R = DefaultRandom> {
    table: HashTable<K, V>,
    hash_builder: S,
    random: R,
}

impl<K, V, S, R> Debug for HashMap<K, V, S, R>
where
    K: Debug + Hash + Eq,
    V: Debug,
    S: BuildHasher,
    R: RandomIndex,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S, R> HashMap<K, V, S, R>
where
    K: Hash + Eq,
    S: BuildHasher,
    R: RandomIndex + Default,
{
    /// Creates an empty map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use swiss_map::HashMap;
    /// # use swiss_map::random::DefaultRandom;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let map: HashMap<i32, String, _, DefaultRandom> = HashMap::with_hasher(SimpleHasher);
    /// assert!(map.is_empty());
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty map able to hold `capacity` entries before resizing,
    /// with the given hasher builder.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self::with_capacity_hasher_and_random(capacity, hash_builder, R::default())
    }

    /// Fallible version of [`HashMap::with_capacity_and_hasher`].
    pub fn try_with_capacity_and_hasher(
        capacity: usize,
        hash_builder: S,
    ) -> Result<Self, TryReserveError> {
        Ok(Self {
            table: HashTable::try_with_capacity(capacity)?,
            hash_builder,
            random: R::default(),
        })
    }
}

impl<K, V, S, R> HashMap<K, V, S, R>
where
    K: Hash + Eq,
    S: BuildHasher,
    R: RandomIndex,
{
    /// Creates an empty map with every collaborator supplied explicitly.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::hash::RandomState;
    ///
    /// use swiss_map::HashMap;
    /// use swiss_map::random::FixedIndex;
    ///
    /// let mut map = HashMap::with_capacity_hasher_and_random(28, RandomState::new(), FixedIndex(0));
    /// map.put(1, "one");
    /// assert_eq!(map.iter().next(), Some((&1, &"one")));
    /// ```
    pub fn with_capacity_hasher_and_random(capacity: usize, hash_builder: S, random: R) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
            random,
        }
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of live entries in the map.
    pub fn count(&self) -> usize {
        self.table.len()
    }

    /// Returns the number of live entries in the map. Same as
    /// [`HashMap::count`].
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of resident entries the map holds before it
    /// rehashes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swiss_map::HashMap;
    ///
    /// let map: HashMap<i32, String> = HashMap::with_capacity(100);
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the ratio of live entries to allocated slots.
    pub fn load_factor(&self) -> f64 {
        self.table.load_factor()
    }

    /// Removes all entries, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Reserves capacity for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        let hash_builder = &self.hash_builder;
        self.table
            .reserve(additional, |k| hash_builder.hash_one(k));
    }

    /// Tries to reserve capacity for at least `additional` more entries.
    ///
    /// On error the map is left unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swiss_map::HashMap;
    ///
    /// let mut map: HashMap<u64, u64> = HashMap::new();
    /// assert!(map.try_reserve(1000).is_ok());
    /// assert!(map.try_reserve(usize::MAX).is_err());
    /// ```
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let hash_builder = &self.hash_builder;
        self.table
            .try_reserve(additional, |k| hash_builder.hash_one(k))
    }

    /// Inserts or overwrites `key` with `value`.
    ///
    /// When the key is already present both the stored key and the value are
    /// replaced. Use [`HashMap::insert`] to get the previous value back.
    pub fn put(&mut self, key: K, value: V) {
        self.insert_entry(key, value);
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map did not have this key present, `None` is returned.
    /// If the map did have this key present, the key and value are replaced,
    /// and the old value is returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swiss_map::HashMap;
    ///
    /// let mut map: HashMap<_, _> = HashMap::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(37, "b"), Some("a"));
    /// assert_eq!(map.get(&37), Some(&"b"));
    /// assert_eq!(map.len(), 1);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.insert_entry(key, value).map(|(_, v)| v)
    }

    #[inline]
    fn insert_entry(&mut self, key: K, value: V) -> Option<(K, V)> {
        let hash = self.hash_builder.hash_one(&key);
        let hash_builder = &self.hash_builder;
        self.table
            .insert(hash, key, value, K::eq, |k| hash_builder.hash_one(k))
    }

    /// Returns a reference to the value corresponding to the key.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Returns the stored key and its value.
    #[inline]
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |k| key.eq(k.borrow()))
    }

    /// Returns a mutable reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swiss_map::HashMap;
    ///
    /// let mut map: HashMap<_, _> = HashMap::new();
    /// map.put("counter", 1);
    /// if let Some(v) = map.get_mut("counter") {
    ///     *v += 41;
    /// }
    /// assert_eq!(map["counter"], 42);
    /// ```
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find_mut(hash, |k| key.eq(k.borrow()))
            .map(|(_, v)| v)
    }

    /// Returns `true` if the map contains the key.
    #[inline]
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).is_some()
    }

    /// Returns `true` if the map contains the key. Same as [`HashMap::has`].
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.has(key)
    }

    /// Removes the key, dropping its entry. Returns `true` if it was present.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).is_some()
    }

    /// Removes the key, returning its value if it was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swiss_map::HashMap;
    ///
    /// let mut map: HashMap<_, _> = HashMap::new();
    /// map.put(1, "a");
    /// assert_eq!(map.remove(&1), Some("a"));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes the key, returning the stored key and value if it was present.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(hash, |k| key.eq(k.borrow()))
    }

    /// Keeps only the entries for which `f` returns `true`.
    ///
    /// Removed slots follow the same EMPTY-or-TOMBSTONE rule as
    /// [`delete`](Self::delete).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swiss_map::HashMap;
    ///
    /// let mut map: HashMap<u32, u32> = (0..8).map(|k| (k, k * 10)).collect();
    /// map.retain(|&k, v| {
    ///     *v += 1;
    ///     k % 2 == 0
    /// });
    /// assert_eq!(map.len(), 4);
    /// assert_eq!(map.get(&2), Some(&21));
    /// ```
    pub fn retain(&mut self, f: impl FnMut(&K, &mut V) -> bool) {
        self.table.retain(f);
    }

    /// Returns an iterator over the entries, starting at a random group.
    ///
    /// The iterator borrows the map, so entries cannot be added or removed
    /// while it is alive; [`snapshot_iter`](Self::snapshot_iter) lifts that
    /// restriction. Each call may visit entries in a different order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swiss_map::HashMap;
    ///
    /// let mut map: HashMap<_, _> = HashMap::new();
    /// map.put("a", 1);
    /// map.put("b", 2);
    ///
    /// let mut iter = map.iter();
    /// let mut sum = 0;
    /// while iter.advance() {
    ///     let (_, v) = iter.current().unwrap();
    ///     sum += v;
    /// }
    /// assert_eq!(sum, 3);
    /// assert!(!iter.advance());
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(&self.random),
        }
    }

    /// Returns an iterator over the keys, starting at a random group.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values, starting at a random group.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator that does not borrow the map, starting at a random
    /// group.
    ///
    /// It walks the entries as they were when it was created. The map can be
    /// modified freely while it is alive, including deletes of the entry just
    /// visited and rehashes. Entries added afterwards are not seen. The
    /// arrays are shared until the next write, which copies them if the
    /// snapshot is still alive.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swiss_map::HashMap;
    ///
    /// let mut map: HashMap<u32, u32> = (0..100).map(|k| (k, k)).collect();
    ///
    /// let mut snapshot = map.snapshot_iter();
    /// while snapshot.advance() {
    ///     let (&k, _) = snapshot.current().unwrap();
    ///     if k % 3 == 0 {
    ///         map.delete(&k);
    ///     }
    ///     map.put(k + 1000, 0);
    /// }
    /// assert_eq!(map.len(), 100 - 34 + 100);
    /// ```
    pub fn snapshot_iter(&mut self) -> hash_table::SnapshotIter<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.table.snapshot(&self.random)
    }

    /// Computes a histogram of probe distances for the live entries.
    ///
    /// Bin `d` counts entries stored `d` groups past their home group.
    #[cfg(feature = "stats")]
    pub fn probe_histogram(&self) -> alloc::vec::Vec<usize> {
        self.table
            .probe_histogram(|k| self.hash_builder.hash_one(k))
    }

    /// Returns utilization statistics for debugging.
    #[cfg(feature = "stats")]
    pub fn debug_stats(&self) -> crate::hash_table::DebugStats {
        self.table.debug_stats()
    }

    /// Pretty-prints the probe-distance histogram using stdout.
    #[cfg(all(feature = "stats", feature = "std"))]
    pub fn print_probe_histogram(&self) {
        self.table
            .print_probe_histogram(|k| self.hash_builder.hash_one(k));
    }
}

impl<K, V, S, R> HashMap<K, V, S, R>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
    R: RandomIndex + Default,
{
    /// Creates an empty map using the default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates an empty map able to hold `capacity` entries before resizing,
    /// using the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swiss_map::HashMap;
    ///
    /// let map: HashMap<&str, i32> = HashMap::with_capacity(10);
    /// assert_eq!(map.capacity(), 14);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S, R> Default for HashMap<K, V, S, R>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
    R: RandomIndex + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, R> PartialEq for HashMap<K, V, S, R>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
    R: RandomIndex,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter()
            .all(|(k, v)| other.get(k).is_some_and(|o| v == o))
    }
}

impl<K, V, S, R> Eq for HashMap<K, V, S, R>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
    R: RandomIndex,
{
}

impl<K, Q, V, S, R> Index<&Q> for HashMap<K, V, S, R>
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
    R: RandomIndex,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if the key is not present in the map.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("key not found in HashMap")
    }
}

impl<K, V, S, R> Extend<(K, V)> for HashMap<K, V, S, R>
where
    K: Hash + Eq,
    S: BuildHasher,
    R: RandomIndex,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (k, v) in iter {
            self.put(k, v);
        }
    }
}

impl<K, V, S, R> FromIterator<(K, V)> for HashMap<K, V, S, R>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
    R: RandomIndex + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<'a, K, V, S, R> IntoIterator for &'a HashMap<K, V, S, R>
where
    K: Hash + Eq,
    S: BuildHasher,
    R: RandomIndex,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the entries of a `HashMap`.
///
/// Besides [`Iterator`], it supports cursor-style traversal with
/// [`advance`](Iter::advance) and [`current`](Iter::current).
pub struct Iter<'a, K, V> {
    inner: hash_table::Iter<'a, K, V>,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, K, V> Iter<'a, K, V> {
    /// Moves to the next entry. Returns `false` once the traversal is done.
    pub fn advance(&mut self) -> bool {
        self.inner.advance()
    }

    /// The entry the last successful [`advance`](Iter::advance) moved to.
    pub fn current(&self) -> Option<(&'a K, &'a V)> {
        self.inner.current()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// An iterator over the keys of a `HashMap`.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

/// An iterator over the values of a `HashMap`.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

#[cfg(test)]
mod tests {
    use alloc::format;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::random::FixedIndex;

    #[derive(Clone)]
    struct SipHashBuilder {
        k1: u64,
        k2: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k1: rng.try_next_u64().unwrap_or(0),
                k2: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    type SipMap<K, V> = HashMap<K, V, SipHashBuilder, FixedIndex>;

    #[test]
    fn test_new_and_with_hasher() {
        let map: SipMap<i32, String> = HashMap::new();
        assert!(map.is_empty());
        assert_eq!(map.count(), 0);

        let map2 = SipMap::<i32, String>::with_hasher(SipHashBuilder::default());
        assert!(map2.is_empty());
        assert_eq!(map2.len(), 0);
    }

    #[test]
    fn test_with_capacity() {
        let map: SipMap<i32, String> = HashMap::with_capacity(100);
        assert!(map.capacity() >= 100);
        assert!(map.is_empty());

        let map2 = SipMap::<i32, String>::with_capacity_and_hasher(200, SipHashBuilder::default());
        assert!(map2.capacity() >= 200);

        let map3 = SipMap::<i32, String>::try_with_capacity_and_hasher(
            usize::MAX,
            SipHashBuilder::default(),
        );
        assert!(map3.is_err());
    }

    #[test]
    fn concrete_scenario() {
        let mut map: SipMap<String, i32> = HashMap::with_capacity(10);
        assert_eq!(map.table.num_groups(), 1);
        assert_eq!(map.capacity(), 14);

        map.put("a".to_string(), 1);
        map.put("b".to_string(), 2);
        map.put("c".to_string(), 3);
        assert_eq!(map.get("b"), Some(&2));

        assert!(map.delete("a"));
        assert_eq!(map.get("a"), None);
        assert_eq!(map.count(), 2);

        for i in 0..12 {
            map.put(format!("key-{i}"), i);
        }
        assert_eq!(map.count(), 14);
        assert_eq!(map.table.resident(), 14);
        assert_eq!(map.table.num_groups(), 1);

        map.put("one-more".to_string(), 100);
        assert_eq!(map.table.num_groups(), 2);
        assert_eq!(map.count(), 15);

        assert_eq!(map.get("b"), Some(&2));
        assert_eq!(map.get("c"), Some(&3));
        for i in 0..12 {
            assert_eq!(map.get(format!("key-{i}").as_str()), Some(&i));
        }
        assert_eq!(map.get("one-more"), Some(&100));
        assert!(!map.has("a"));
    }

    #[test]
    fn test_insert_and_get() {
        let mut map: SipMap<i32, String> = HashMap::new();

        assert_eq!(map.insert(1, "hello".to_string()), None);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&"hello".to_string()));
        assert_eq!(map.get(&2), None);

        assert_eq!(
            map.insert(1, "world".to_string()),
            Some("hello".to_string())
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&"world".to_string()));
    }

    #[test]
    fn put_overwrites_without_changing_count() {
        let mut map: SipMap<&str, i32> = HashMap::new();
        map.put("k", 1);
        map.put("k", 2);
        assert_eq!(map.get("k"), Some(&2));
        assert_eq!(map.count(), 1);
    }

    #[test]
    fn test_get_mut() {
        let mut map: SipMap<i32, String> = HashMap::new();
        map.put(1, "hello".to_string());

        if let Some(value) = map.get_mut(&1) {
            value.push_str(" world");
        }

        assert_eq!(map.get(&1), Some(&"hello world".to_string()));
        assert_eq!(map.get_mut(&2), None);
    }

    #[test]
    fn test_has_and_contains_key() {
        let mut map: SipMap<i32, String> = HashMap::new();
        assert!(!map.has(&1));

        map.put(1, "value".to_string());
        assert!(map.has(&1));
        assert!(map.contains_key(&1));
        assert!(!map.has(&2));
    }

    #[test]
    fn test_delete_and_remove() {
        let mut map: SipMap<i32, String> = HashMap::new();
        map.put(1, "hello".to_string());
        map.put(2, "world".to_string());
        map.put(3, "!".to_string());

        assert!(map.delete(&1));
        assert!(!map.delete(&1));
        assert_eq!(map.count(), 2);

        assert_eq!(map.remove(&2), Some("world".to_string()));
        assert_eq!(map.remove(&2), None);
        assert_eq!(map.remove_entry(&3), Some((3, "!".to_string())));
        assert!(map.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut map: SipMap<i32, i32> = HashMap::new();
        for i in 0..100 {
            map.put(i, i);
        }
        let capacity = map.capacity();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.capacity(), capacity);
        assert_eq!(map.get(&5), None);
    }

    #[test]
    fn test_reserve() {
        let mut map: SipMap<i32, i32> = HashMap::new();
        map.reserve(100);
        assert!(map.capacity() >= 100);
        assert!(map.try_reserve(usize::MAX).is_err());
        assert!(map.try_reserve(10).is_ok());
    }

    #[test]
    fn test_iterators() {
        let mut map: SipMap<i32, i32> = HashMap::new();
        for i in 0..50 {
            map.put(i, i * 10);
        }

        let mut pairs: Vec<(i32, i32)> = map.iter().map(|(k, v)| (*k, *v)).collect();
        pairs.sort_unstable();
        assert_eq!(pairs, (0..50).map(|i| (i, i * 10)).collect::<Vec<_>>());

        let mut keys: Vec<i32> = map.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..50).collect::<Vec<_>>());

        let mut values: Vec<i32> = map.values().copied().collect();
        values.sort_unstable();
        assert_eq!(values, (0..50).map(|i| i * 10).collect::<Vec<_>>());

        assert_eq!(map.iter().len(), 50);
        assert_eq!((&map).into_iter().count(), 50);
    }

    #[test]
    fn iteration_after_deletes_matches_has() {
        let mut map: SipMap<u32, u32> = HashMap::new();
        for i in 0..500 {
            map.put(i, i);
        }
        for i in (0..500).step_by(3) {
            assert!(map.delete(&i));
        }

        let mut seen = Vec::new();
        let mut iter = map.iter();
        while iter.advance() {
            let (k, v) = iter.current().unwrap();
            assert_eq!(k, v);
            assert!(map.has(k));
            seen.push(*k);
        }
        assert_eq!(seen.len(), map.count());
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), map.count());
    }

    #[test]
    fn fixed_random_source_gives_stable_order() {
        let mut map: SipMap<u32, ()> = HashMap::new();
        for i in 0..200 {
            map.put(i, ());
        }
        let first: Vec<u32> = map.keys().copied().collect();
        let second: Vec<u32> = map.keys().copied().collect();
        assert_eq!(first, second);
    }

    #[cfg(feature = "std")]
    #[test]
    fn random_start_varies_order() {
        let mut map: HashMap<u32, ()> = HashMap::new();
        for i in 0..1000 {
            map.put(i, ());
        }
        assert!(map.table.num_groups() > 1);

        let first: Vec<u32> = map.keys().copied().collect();
        let differs = (0..64).any(|_| map.keys().copied().collect::<Vec<_>>() != first);
        assert!(differs);
    }

    #[test]
    fn test_string_keys() {
        let mut map: SipMap<String, i32> = HashMap::new();
        map.put("hello".to_string(), 1);
        map.put("world".to_string(), 2);

        assert_eq!(map.get("hello"), Some(&1));
        assert_eq!(map["world"], 2);
        assert_eq!(map.get("missing"), None);
    }

    #[test]
    fn test_default_trait() {
        let map: SipMap<i32, String> = Default::default();
        assert!(map.is_empty());
    }

    #[test]
    fn test_clone_and_eq() {
        let mut map: SipMap<i32, String> = HashMap::new();
        for i in 0..40 {
            map.put(i, i.to_string());
        }
        map.delete(&7);

        let cloned = map.clone();
        assert_eq!(cloned, map);
        assert_eq!(cloned.get(&8), Some(&"8".to_string()));
        assert!(!cloned.has(&7));

        let mut changed = cloned.clone();
        changed.put(8, "eight".to_string());
        assert_ne!(changed, map);
    }

    #[test]
    fn test_from_iter_and_extend() {
        let mut map: SipMap<i32, i32> = (0..20).map(|i| (i, i * i)).collect();
        assert_eq!(map.len(), 20);
        assert_eq!(map.get(&4), Some(&16));

        map.extend((15..30).map(|i| (i, -i)));
        assert_eq!(map.len(), 30);
        assert_eq!(map.get(&15), Some(&-15));
        assert_eq!(map.get(&3), Some(&9));
    }

    #[test]
    fn test_debug_format() {
        let mut map: SipMap<i32, &str> = HashMap::new();
        map.put(1, "one");
        assert_eq!(format!("{:?}", map), "{1: \"one\"}");
    }

    #[test]
    fn test_complex_values() {
        let mut map: SipMap<String, Vec<i32>> = HashMap::new();
        map.put("numbers".to_string(), vec![1, 2, 3]);
        if let Some(list) = map.get_mut("numbers") {
            list.push(4);
        }
        assert_eq!(map.get("numbers"), Some(&vec![1, 2, 3, 4]));
    }

    #[test]
    fn snapshot_iter_allows_delete_of_current_entry() {
        let mut map: SipMap<u64, u64> = HashMap::with_capacity(0);
        for k in 0..500 {
            map.put(k, k * 2);
        }

        let mut seen = Vec::new();
        let mut snapshot = map.snapshot_iter();
        assert_eq!(snapshot.len(), 500);
        while snapshot.advance() {
            let (&k, &v) = snapshot.current().unwrap();
            assert_eq!(v, k * 2);
            seen.push(k);
            map.delete(&k);
            if k % 5 == 0 {
                map.put(k + 10_000, 0);
            }
        }
        assert!(!snapshot.advance());

        seen.sort_unstable();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
        assert_eq!(map.count(), 100);
        assert!(map.keys().all(|&k| k >= 10_000));
    }

    #[test]
    fn snapshot_iter_yields_owned_pairs() {
        let mut map: SipMap<String, i32> = HashMap::new();
        map.put("a".to_string(), 1);
        map.put("b".to_string(), 2);

        let snapshot = map.snapshot_iter();
        map.clear();
        let mut pairs: Vec<(String, i32)> = snapshot.collect();
        pairs.sort();
        assert_eq!(pairs, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
        assert!(map.is_empty());
    }

    #[test]
    fn test_retain() {
        let mut map: SipMap<i32, String> = HashMap::new();
        for i in 0..50 {
            map.put(i, format!("v{i}"));
        }
        map.retain(|k, v| {
            v.push('!');
            k % 3 == 0
        });
        assert_eq!(map.count(), 17);
        assert_eq!(map.get(&9).map(String::as_str), Some("v9!"));
        assert!(!map.has(&10));

        map.retain(|_, _| false);
        assert!(map.is_empty());
        map.put(1, "again".to_string());
        assert_eq!(map[&1], "again");
    }

    #[test]
    fn tombstone_churn_bounds_group_count() {
        let mut map: SipMap<u64, u64> = HashMap::new();
        for round in 0..20_000u64 {
            let k = round % 64;
            if map.has(&k) {
                map.delete(&k);
            } else {
                map.put(k, round);
            }
        }
        assert!(map.table.num_groups() <= 16, "{:#?}", map.table);
        assert!(map.table.dead() <= map.table.resident());
        assert!(map.count() <= 64);
    }
}
