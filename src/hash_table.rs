//! The raw table: groups, control bytes, probing, and rehashing.
//!
//! [`HashTable`] does not hash keys itself. Every operation takes the key's
//! precomputed 64-bit hash plus an equality predicate, and anything that can
//! rehash takes a `hasher` closure that recomputes the hash of a stored key.
//! [`HashMap`](crate::HashMap) is the keyed wrapper most callers want.
//!
//! The control and slot arrays sit behind an [`Arc`]. A [`SnapshotIter`]
//! holds its own reference to the arrays it was created from, so it keeps
//! working while the table is modified or rehashed. The first mutation after
//! a snapshot copies the arrays; the snapshot keeps the old ones until it is
//! dropped.

use alloc::alloc::handle_alloc_error;
use alloc::boxed::Box;
use alloc::collections::TryReserveError;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::fmt::Debug;
use core::iter::FusedIterator;

use crate::control::EMPTY;
use crate::control::GROUP_WIDTH;
use crate::control::Metadata;
use crate::control::TOMBSTONE;
use crate::control::h1;
use crate::control::h2;
use crate::control::is_full;
use crate::control::probe_start;
use crate::group::Group;
use crate::random::RandomIndex;

/// Occupied slots allowed per group before the table resizes (14/16 = 87.5%).
const MAX_PER_GROUP: usize = 14;

/// Minimum number of groups needed to hold `capacity` entries.
#[inline]
fn groups_for(capacity: usize) -> usize {
    capacity.div_ceil(MAX_PER_GROUP).max(1)
}

#[cold]
#[inline(never)]
fn capacity_overflow() -> ! {
    panic!("capacity overflow")
}

#[cold]
#[inline(never)]
fn allocation_failure<K, V>(groups: usize) -> ! {
    match (
        Layout::array::<Metadata>(groups),
        Layout::array::<Group<K, V>>(groups),
    ) {
        (Ok(ctrl), Ok(slots)) if slots.size() > ctrl.size() => handle_alloc_error(slots),
        (Ok(ctrl), Ok(_)) => handle_alloc_error(ctrl),
        _ => capacity_overflow(),
    }
}

/// Location of a slot: group index and slot index within the group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Slot {
    group: usize,
    index: usize,
}

/// Marks an occupied slot vacant.
///
/// The slot becomes `EMPTY` if its group already has an empty slot, since any
/// probe reaching the group stops there anyway. Otherwise it becomes a
/// tombstone so probes keep moving past it. Returns `true` for a tombstone.
#[inline]
fn vacate(meta: &mut Metadata, index: usize) -> bool {
    if meta.match_empty().any_bit_set() {
        meta.bytes[index] = EMPTY;
        false
    } else {
        meta.bytes[index] = TOMBSTONE;
        true
    }
}

/// The control bytes and slot storage, one `Metadata` per `Group`.
struct Arrays<K, V> {
    ctrl: Box<[Metadata]>,
    groups: Box<[Group<K, V>]>,
}

/// Deep copy of a set of arrays. Stored as a function pointer so tables can
/// copy shared arrays without a `Clone` bound on every mutator.
type CloneArrays<K, V> = fn(&Arrays<K, V>) -> Arrays<K, V>;

impl<K, V> Arrays<K, V> {
    fn with_groups(groups: usize) -> Self {
        match Self::try_with_groups(groups) {
            Ok(arrays) => arrays,
            Err(_) => allocation_failure::<K, V>(groups),
        }
    }

    fn try_with_groups(groups: usize) -> Result<Self, TryReserveError> {
        let mut ctrl = Vec::new();
        ctrl.try_reserve_exact(groups)?;
        ctrl.resize(groups, Metadata::empty());

        let mut slots = Vec::new();
        slots.try_reserve_exact(groups)?;
        slots.resize_with(groups, Group::new);

        Ok(Self {
            ctrl: ctrl.into_boxed_slice(),
            groups: slots.into_boxed_slice(),
        })
    }

    /// Probes for `hash`.
    ///
    /// Returns `Ok` with the slot holding a key accepted by `eq`, or `Err`
    /// with the first empty slot of the group where probing stopped, which is
    /// where the key would be inserted.
    #[inline]
    fn find_slot(&self, hash: u64, mut eq: impl FnMut(&K) -> bool) -> Result<Slot, Slot> {
        let h2 = h2(hash);
        let num_groups = self.groups.len();
        let mut group = probe_start(h1(hash), num_groups);

        loop {
            let meta = &self.ctrl[group];
            for index in meta.match_h2(h2) {
                // SAFETY: The control byte equals `h2`, so the slot is occupied.
                let key = unsafe { self.groups[group].key(index) };
                if eq(key) {
                    return Ok(Slot { group, index });
                }
            }

            // An empty slot ends the probe: no insertion of this key could have
            // passed over it.
            if let Some(index) = meta.match_empty().lowest_set_bit() {
                return Err(Slot { group, index });
            }

            group += 1;
            if group == num_groups {
                group = 0;
            }
        }
    }

    /// Writes an entry known to be absent into the first empty slot of its
    /// probe sequence.
    fn insert_no_grow(&mut self, hash: u64, key: K, value: V) {
        let slot = match self.find_slot(hash, |_| false) {
            Ok(slot) | Err(slot) => slot,
        };
        debug_assert_eq!(self.ctrl[slot.group].bytes[slot.index], EMPTY);
        // SAFETY: The predicate never matches, so `slot` is the empty slot
        // returned on `Err`.
        unsafe { self.groups[slot.group].write(slot.index, key, value) };
        self.ctrl[slot.group].bytes[slot.index] = h2(hash);
    }

    fn drop_entries(&mut self) {
        for (meta, group) in self.ctrl.iter_mut().zip(self.groups.iter_mut()) {
            for index in meta.match_full() {
                // Mark the slot vacant first so a panicking destructor cannot
                // cause a second drop.
                meta.bytes[index] = EMPTY;
                // SAFETY: The control byte was full, so the slot is initialized.
                unsafe { group.drop_in_place(index) };
            }
        }
    }
}

impl<K, V> Drop for Arrays<K, V> {
    fn drop(&mut self) {
        if core::mem::needs_drop::<K>() || core::mem::needs_drop::<V>() {
            self.drop_entries();
        }
    }
}

fn clone_arrays<K: Clone, V: Clone>(src: &Arrays<K, V>) -> Arrays<K, V> {
    let mut arrays = Arrays::with_groups(src.groups.len());

    // Control bytes are published one slot at a time, after the slot is
    // written, so a panicking `clone` leaves `arrays` droppable.
    for (group, meta) in src.ctrl.iter().enumerate() {
        for (index, &byte) in meta.bytes.iter().enumerate() {
            if is_full(byte) {
                // SAFETY: A full control byte marks an initialized slot, and
                // `arrays` has the same group count so the target slot exists
                // and is still uninitialized.
                unsafe {
                    let src = &src.groups[group];
                    let key = src.key(index).clone();
                    let value = src.value(index).clone();
                    arrays.groups[group].write(index, key, value);
                }
            }
            arrays.ctrl[group].bytes[index] = byte;
        }
    }

    arrays
}

/// Debug statistics for hash table analysis.
///
/// Only available with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of live entries
    pub live: usize,
    /// Slots holding a live entry or a tombstone
    pub resident: usize,
    /// Slots holding a tombstone
    pub dead: usize,
    /// Resident count that triggers the next rehash
    pub limit: usize,
    /// Number of 16-slot groups
    pub groups: usize,
    /// Total number of slots allocated
    pub total_slots: usize,
    /// Load factor (live / total_slots)
    pub load_factor: f64,
    /// Total memory in bytes used by control bytes and slots
    pub total_bytes: usize,
    /// Bytes of slot storage not holding a live entry
    pub wasted_bytes: usize,
    /// Whether a snapshot iterator still shares the current arrays
    pub shared: bool,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {} live, {} resident, {} dead (limit {})",
            self.live, self.resident, self.dead, self.limit
        );
        println!(
            "Slot Usage: {}/{} in {} groups ({:.2}% load factor)",
            self.live,
            self.total_slots,
            self.groups,
            self.load_factor * 100.0
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
        if self.shared {
            println!("Arrays shared with a live snapshot");
        }
    }
}

/// An open-addressing hash table with 16-slot metadata groups.
///
/// Each group stores 16 keys and 16 values in parallel arrays, described by 16
/// control bytes kept in a separate array. A lookup splits the hash into `h1`,
/// which picks the home group, and `h2`, the 7-bit fragment stored in the
/// control byte. One SIMD comparison per group finds every slot whose fragment
/// matches; only those keys are compared in full. Probing moves linearly from
/// group to group and stops at the first group containing an empty slot.
///
/// The table grows by doubling once 14 of every 16 slots are resident
/// (occupied or tombstoned). When at least half of the resident slots are
/// tombstones it rehashes at the same size instead, which compacts them away.
///
/// Because the arrays may be shared with a [`SnapshotIter`], the table is
/// only `Send` and `Sync` when both `K` and `V` are.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use siphasher::sip::SipHasher;
/// # use swiss_map::HashTable;
/// #
/// fn hash_str(s: &str) -> u64 {
///     let mut hasher = SipHasher::new();
///     s.hash(&mut hasher);
///     hasher.finish()
/// }
///
/// let mut table: HashTable<String, u32> = HashTable::with_capacity(10);
/// let old = table.insert(
///     hash_str("apple"),
///     "apple".to_string(),
///     3,
///     |a, b| a == b,
///     |k| hash_str(k),
/// );
/// assert!(old.is_none());
///
/// let found = table.find(hash_str("apple"), |k| k == "apple");
/// assert_eq!(found.map(|(_, v)| *v), Some(3));
/// ```
pub struct HashTable<K, V> {
    arrays: Arc<Arrays<K, V>>,
    /// Set once a snapshot has been taken; used to copy the arrays before
    /// mutating them while they are shared.
    clone_arrays: Option<CloneArrays<K, V>>,
    resident: usize,
    dead: usize,
    limit: usize,
}

impl<K, V> Debug for HashTable<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("ctrl", &self.arrays.ctrl)
            .field("resident", &self.resident)
            .field("dead", &self.dead)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<K, V> Clone for HashTable<K, V>
where
    K: Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            arrays: Arc::new(clone_arrays(&self.arrays)),
            clone_arrays: self.clone_arrays,
            resident: self.resident,
            dead: self.dead,
            limit: self.limit,
        }
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates a table able to hold at least `capacity` entries before it
    /// needs to resize.
    ///
    /// The table always has at least one group, so it is sized in multiples
    /// of 14 entries.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_map::HashTable;
    /// #
    /// let table: HashTable<u64, String> = HashTable::with_capacity(10);
    /// assert_eq!(table.num_groups(), 1);
    /// assert_eq!(table.capacity(), 14);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_arrays(Arrays::with_groups(groups_for(capacity)))
    }

    /// Fallible version of [`HashTable::with_capacity`].
    ///
    /// Returns an error instead of aborting when the allocation fails or the
    /// requested size overflows.
    pub fn try_with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        Ok(Self::from_arrays(Arrays::try_with_groups(groups_for(
            capacity,
        ))?))
    }

    fn from_arrays(arrays: Arrays<K, V>) -> Self {
        Self {
            limit: arrays.groups.len() * MAX_PER_GROUP,
            arrays: Arc::new(arrays),
            clone_arrays: None,
            resident: 0,
            dead: 0,
        }
    }

    /// Returns the arrays for writing, copying them first if a snapshot still
    /// holds them.
    ///
    /// Takes the fields rather than `&mut self` so callers can keep updating
    /// the counters while holding the result.
    #[inline]
    fn make_unique<'a>(
        arrays: &'a mut Arc<Arrays<K, V>>,
        clone_arrays: Option<CloneArrays<K, V>>,
    ) -> &'a mut Arrays<K, V> {
        if Arc::get_mut(arrays).is_none() {
            let Some(clone) = clone_arrays else {
                unreachable!("arrays are only shared with snapshots")
            };
            *arrays = Arc::new(clone(arrays));
        }
        match Arc::get_mut(arrays) {
            Some(arrays) => arrays,
            None => unreachable!("freshly copied arrays are unique"),
        }
    }

    /// Returns the number of live entries in the table.
    pub fn len(&self) -> usize {
        self.resident - self.dead
    }

    /// Returns `true` if the table contains no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the resident count at which the next insertion rehashes.
    ///
    /// Tombstones count towards this limit, so fewer than `capacity()` live
    /// entries may fit after many removals.
    pub fn capacity(&self) -> usize {
        self.limit
    }

    /// Returns the number of 16-slot groups currently allocated.
    pub fn num_groups(&self) -> usize {
        self.arrays.groups.len()
    }

    /// Returns the ratio of live entries to allocated slots.
    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / (self.num_groups() * GROUP_WIDTH) as f64
    }

    /// Number of slots holding a live entry or a tombstone.
    #[cfg(test)]
    pub(crate) fn resident(&self) -> usize {
        self.resident
    }

    /// Number of slots holding a tombstone.
    #[cfg(test)]
    pub(crate) fn dead(&self) -> usize {
        self.dead
    }

    /// Removes every entry, keeping the allocated groups.
    ///
    /// Live snapshots keep the entries they were created over.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_map::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table.insert(1, 1u64, "one", |a, b| a == b, |&k| k);
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.num_groups(), 1);
    /// ```
    pub fn clear(&mut self) {
        if let Some(arrays) = Arc::get_mut(&mut self.arrays) {
            arrays.drop_entries();
            for meta in arrays.ctrl.iter_mut() {
                *meta = Metadata::empty();
            }
        } else {
            self.arrays = Arc::new(Arrays::with_groups(self.num_groups()));
        }
        self.resident = 0;
        self.dead = 0;
    }

    /// Finds an entry by hash and equality predicate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_map::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table.insert(42, 42u64, "answer", |a, b| a == b, |&k| k);
    ///
    /// assert_eq!(table.find(42, |&k| k == 42), Some((&42, &"answer")));
    /// assert_eq!(table.find(7, |&k| k == 7), None);
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<(&K, &V)> {
        let slot = self.arrays.find_slot(hash, eq).ok()?;
        let group = &self.arrays.groups[slot.group];
        // SAFETY: `find_slot` only returns `Ok` for occupied slots.
        unsafe { Some((group.key(slot.index), group.value(slot.index))) }
    }

    /// Finds an entry by hash and equality predicate, returning a mutable
    /// reference to its value.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<(&K, &mut V)> {
        let slot = self.arrays.find_slot(hash, eq).ok()?;
        let arrays = Self::make_unique(&mut self.arrays, self.clone_arrays);
        // SAFETY: `find_slot` only returns `Ok` for occupied slots, and a copy
        // keeps every entry in the same slot.
        let (key, value) = unsafe { arrays.groups[slot.group].pair_mut(slot.index) };
        Some((&*key, value))
    }

    /// Inserts `key` and `value`, overwriting any entry whose key `eq`
    /// considers equal to `key`.
    ///
    /// `eq` receives the stored key first and the incoming key second. On
    /// overwrite both the stored key and value are replaced and the previous
    /// pair is returned. `hasher` is used to rehash stored keys if the table
    /// has to resize; it must agree with `hash`.
    ///
    /// The resize check runs before probing on every call, including calls
    /// that end up overwriting.
    pub fn insert(
        &mut self,
        hash: u64,
        key: K,
        value: V,
        eq: impl Fn(&K, &K) -> bool,
        hasher: impl Fn(&K) -> u64,
    ) -> Option<(K, V)> {
        if self.resident >= self.limit {
            self.reserve_rehash(&hasher);
        }

        let found = self.arrays.find_slot(hash, |stored| eq(stored, &key));
        let arrays = Self::make_unique(&mut self.arrays, self.clone_arrays);
        match found {
            Ok(slot) => {
                // SAFETY: `find_slot` only returns `Ok` for occupied slots.
                let (k, v) = unsafe { arrays.groups[slot.group].pair_mut(slot.index) };
                Some((core::mem::replace(k, key), core::mem::replace(v, value)))
            }
            Err(slot) => {
                debug_assert_eq!(arrays.ctrl[slot.group].bytes[slot.index], EMPTY);
                // SAFETY: `find_slot` returns an empty slot on `Err`, so nothing
                // is overwritten.
                unsafe { arrays.groups[slot.group].write(slot.index, key, value) };
                arrays.ctrl[slot.group].bytes[slot.index] = h2(hash);
                self.resident += 1;
                None
            }
        }
    }

    /// Removes an entry by hash and equality predicate, returning it.
    ///
    /// If the entry's group still has an empty slot, the slot is reclaimed as
    /// empty: any probe reaching this group already stops at that empty slot,
    /// so no probe sequence gets shorter. Otherwise the slot becomes a
    /// tombstone so probes keep moving past it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_map::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table.insert(42, 42u64, "answer", |a, b| a == b, |&k| k);
    ///
    /// assert_eq!(table.remove(42, |&k| k == 42), Some((42, "answer")));
    /// assert_eq!(table.remove(42, |&k| k == 42), None);
    /// assert!(table.is_empty());
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<(K, V)> {
        let slot = self.arrays.find_slot(hash, eq).ok()?;
        let arrays = Self::make_unique(&mut self.arrays, self.clone_arrays);

        if vacate(&mut arrays.ctrl[slot.group], slot.index) {
            self.dead += 1;
        } else {
            self.resident -= 1;
        }

        // SAFETY: `find_slot` only returns `Ok` for occupied slots, and the
        // control byte has just been marked vacant.
        Some(unsafe { arrays.groups[slot.group].take(slot.index) })
    }

    /// Keeps only the entries for which `f` returns `true`.
    ///
    /// Rejected entries are removed exactly as [`HashTable::remove`] would
    /// remove them. Each entry is visited once, in physical order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_map::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// for k in 0..10u64 {
    ///     table.insert(k, k, k * 10, |a, b| a == b, |&k| k);
    /// }
    /// table.retain(|&k, _| k % 2 == 0);
    /// assert_eq!(table.len(), 5);
    /// assert_eq!(table.find(3, |&k| k == 3), None);
    /// ```
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        if self.is_empty() {
            return;
        }

        let arrays = Self::make_unique(&mut self.arrays, self.clone_arrays);
        for (meta, group) in arrays.ctrl.iter_mut().zip(arrays.groups.iter_mut()) {
            for index in meta.match_full() {
                // SAFETY: The control byte is full, so the slot is initialized.
                let (key, value) = unsafe { group.pair_mut(index) };
                if f(key, value) {
                    continue;
                }

                if vacate(meta, index) {
                    self.dead += 1;
                } else {
                    self.resident -= 1;
                }
                // SAFETY: The slot was initialized and is now marked vacant,
                // so it is dropped exactly once.
                unsafe { group.drop_in_place(index) };
            }
        }
    }

    /// Reserves room for at least `additional` more insertions without a
    /// rehash.
    ///
    /// Never shrinks the table. If the room is only missing because of
    /// tombstones, the table is compacted at its current size.
    pub fn reserve(&mut self, additional: usize, hasher: impl Fn(&K) -> u64) {
        let groups = self.groups_for_additional(additional);
        if let Some(groups) = groups
            && self.try_rehash(groups, &hasher).is_err()
        {
            allocation_failure::<K, V>(groups);
        }
    }

    /// Fallible version of [`HashTable::reserve`].
    ///
    /// On error the table is left unchanged.
    pub fn try_reserve(
        &mut self,
        additional: usize,
        hasher: impl Fn(&K) -> u64,
    ) -> Result<(), TryReserveError> {
        match self.groups_for_additional(additional) {
            Some(groups) => self.try_rehash(groups, &hasher),
            None => Ok(()),
        }
    }

    /// Group count to rehash to so `additional` inserts fit, or `None` when
    /// they already fit.
    fn groups_for_additional(&self, additional: usize) -> Option<usize> {
        if self.resident.saturating_add(additional) <= self.limit {
            return None;
        }
        let required = self.len().saturating_add(additional);
        Some(groups_for(required).max(self.num_groups()))
    }

    #[cold]
    #[inline(never)]
    fn reserve_rehash(&mut self, hasher: &impl Fn(&K) -> u64) {
        let groups = self.next_group_count();
        if self.try_rehash(groups, hasher).is_err() {
            allocation_failure::<K, V>(groups);
        }
    }

    /// Same size when at least half of the resident slots are tombstones,
    /// double otherwise.
    fn next_group_count(&self) -> usize {
        let groups = self.num_groups();
        if self.dead >= self.resident / 2 {
            groups
        } else {
            groups.checked_mul(2).unwrap_or_else(|| capacity_overflow())
        }
    }

    /// Moves every live entry into freshly allocated arrays of `groups` groups.
    ///
    /// The new arrays are fully allocated and every stored key is hashed
    /// before any entry moves, so an allocation failure or a panicking
    /// `hasher` leaves `self` untouched. Entries are re-inserted in old
    /// group-then-slot order.
    fn try_rehash(
        &mut self,
        groups: usize,
        hasher: &impl Fn(&K) -> u64,
    ) -> Result<(), TryReserveError> {
        let mut fresh = Arrays::try_with_groups(groups)?;
        debug_assert!(self.len() <= groups * MAX_PER_GROUP);

        let mut hashes = Vec::new();
        hashes.try_reserve_exact(self.len())?;
        for (meta, group) in self.arrays.ctrl.iter().zip(self.arrays.groups.iter()) {
            for index in meta.match_full() {
                // SAFETY: The control byte is full, so the slot is initialized.
                hashes.push(hasher(unsafe { group.key(index) }));
            }
        }

        let arrays = Self::make_unique(&mut self.arrays, self.clone_arrays);
        let mut hashes = hashes.into_iter();
        for (meta, group) in arrays.ctrl.iter_mut().zip(arrays.groups.iter_mut()) {
            for (index, hash) in meta.match_full().into_iter().zip(&mut hashes) {
                // SAFETY: The control byte is full, so the slot is initialized.
                // It is marked empty right after the move.
                let (key, value) = unsafe { group.take(index) };
                meta.bytes[index] = EMPTY;
                fresh.insert_no_grow(hash, key, value);
            }
        }

        // Only tombstones remain in the old arrays.
        self.arrays = Arc::new(fresh);
        self.resident -= self.dead;
        self.dead = 0;
        self.limit = groups * MAX_PER_GROUP;
        Ok(())
    }

    /// Returns an iterator starting at a group chosen by `random`.
    ///
    /// Two iterators over the same table generally visit entries in different
    /// orders. The order is a rotation of the physical group order.
    pub fn iter(&self, random: &impl RandomIndex) -> Iter<'_, K, V> {
        let start = random.random_index(self.num_groups());
        self.iter_from(start)
    }

    /// Returns an iterator starting at group `start % num_groups()`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_map::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// for k in 0..5u64 {
    ///     table.insert(k, k, k * 10, |a, b| a == b, |&k| k);
    /// }
    ///
    /// let mut values: Vec<u64> = table.iter_from(0).map(|(_, v)| *v).collect();
    /// values.sort();
    /// assert_eq!(values, [0, 10, 20, 30, 40]);
    /// ```
    pub fn iter_from(&self, start: usize) -> Iter<'_, K, V> {
        Iter {
            ctrl: &self.arrays.ctrl,
            groups: &self.arrays.groups,
            cursor: Cursor::new(start, self.num_groups()),
            remaining: self.len(),
        }
    }

    /// Returns an iterator over the current arrays that does not borrow the
    /// table, starting at a group chosen by `random`.
    ///
    /// The table stays fully usable while the snapshot is alive. Entries
    /// inserted afterwards are not seen, and entries removed afterwards are
    /// still yielded.
    pub fn snapshot(&mut self, random: &impl RandomIndex) -> SnapshotIter<K, V>
    where
        K: Clone,
        V: Clone,
    {
        let start = random.random_index(self.num_groups());
        self.snapshot_from(start)
    }

    /// Returns a snapshot iterator starting at group `start % num_groups()`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use swiss_map::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// for k in 0..5u64 {
    ///     table.insert(k, k, k * 10, |a, b| a == b, |&k| k);
    /// }
    ///
    /// let mut snapshot = table.snapshot_from(0);
    /// while snapshot.advance() {
    ///     let (&k, _) = snapshot.current().unwrap();
    ///     table.remove(k, |&s| s == k);
    /// }
    /// assert!(table.is_empty());
    /// ```
    pub fn snapshot_from(&mut self, start: usize) -> SnapshotIter<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.clone_arrays = Some(clone_arrays::<K, V>);
        SnapshotIter {
            cursor: Cursor::new(start, self.num_groups()),
            remaining: self.len(),
            arrays: Arc::clone(&self.arrays),
        }
    }

    /// Computes a histogram of probe distances for the live entries.
    ///
    /// Bin `d` counts entries stored `d` groups past their home group.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self, hasher: impl Fn(&K) -> u64) -> Vec<usize> {
        let num_groups = self.num_groups();
        let mut hist = alloc::vec![0usize; 1];

        for (group, meta) in self.arrays.ctrl.iter().enumerate() {
            for index in meta.match_full() {
                // SAFETY: The control byte is full, so the slot is initialized.
                let hash = hasher(unsafe { self.arrays.groups[group].key(index) });
                let home = probe_start(h1(hash), num_groups);
                let distance = (group + num_groups - home) % num_groups;
                if distance >= hist.len() {
                    hist.resize(distance + 1, 0);
                }
                hist[distance] += 1;
            }
        }

        hist
    }

    /// Returns utilization statistics for debugging.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let groups = self.num_groups();
        let total_slots = groups * GROUP_WIDTH;
        let slot_bytes = core::mem::size_of::<K>() + core::mem::size_of::<V>();
        let total_bytes = groups
            * (core::mem::size_of::<Metadata>() + core::mem::size_of::<Group<K, V>>());

        DebugStats {
            live: self.len(),
            resident: self.resident,
            dead: self.dead,
            limit: self.limit,
            groups,
            total_slots,
            load_factor: self.load_factor(),
            total_bytes,
            wasted_bytes: (total_slots - self.len()) * slot_bytes,
            shared: Arc::strong_count(&self.arrays) > 1,
        }
    }

    /// Pretty-prints the probe-distance histogram horizontally using stdout.
    #[cfg(all(feature = "stats", feature = "std"))]
    pub fn print_probe_histogram(&self, hasher: impl Fn(&K) -> u64) {
        let hist = self.probe_histogram(hasher);
        let max = *hist.iter().max().unwrap_or(&0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.len());

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let full = units / 8;
            let rem = units % 8;
            let mut bar = "█".repeat(full);
            if rem > 0 {
                let ch = match rem {
                    1 => '▏',
                    2 => '▎',
                    3 => '▍',
                    4 => '▌',
                    5 => '▋',
                    6 => '▊',
                    7 => '▉',
                    _ => unreachable!(),
                };
                bar.push(ch);
            }
            bar
        };

        for (distance, &count) in hist.iter().enumerate() {
            println!("{:>3} | {} ({})", distance, make_bar(count), count);
        }
    }
}

/// Traversal state shared by [`Iter`] and [`SnapshotIter`].
///
/// Visits every group exactly once starting at `group`, wrapping around the
/// end of the array, with slots in increasing order inside each group.
#[derive(Clone, Copy, Debug)]
struct Cursor {
    group: usize,
    slot: usize,
    visited: usize,
    found: bool,
}

impl Cursor {
    fn new(start: usize, num_groups: usize) -> Self {
        Self {
            group: start % num_groups,
            slot: 0,
            visited: 0,
            found: false,
        }
    }

    fn advance(&mut self, ctrl: &[Metadata]) -> bool {
        if self.found {
            self.found = false;
            self.slot += 1;
        }

        while self.visited < ctrl.len() {
            let meta = &ctrl[self.group];
            while self.slot < GROUP_WIDTH {
                if is_full(meta.bytes[self.slot]) {
                    self.found = true;
                    return true;
                }
                self.slot += 1;
            }

            self.slot = 0;
            self.visited += 1;
            self.group += 1;
            if self.group == ctrl.len() {
                self.group = 0;
            }
        }

        false
    }
}

/// An iterator over the entries of a [`HashTable`].
///
/// Starts at a chosen group and visits every group exactly once, wrapping
/// around the end of the group array, with slots in increasing order inside
/// each group. The iterator borrows the table, so the table cannot be
/// modified while it is alive; use [`SnapshotIter`] for that.
///
/// It can be driven either as an [`Iterator`] or cursor-style with
/// [`advance`](Iter::advance) and [`current`](Iter::current). Once exhausted
/// it stays exhausted.
pub struct Iter<'a, K, V> {
    ctrl: &'a [Metadata],
    groups: &'a [Group<K, V>],
    cursor: Cursor,
    remaining: usize,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            ctrl: self.ctrl,
            groups: self.groups,
            cursor: self.cursor,
            remaining: self.remaining,
        }
    }
}

impl<'a, K, V> Iter<'a, K, V> {
    /// Moves to the next live entry. Returns `false` once every group has
    /// been scanned, and on every call after that.
    pub fn advance(&mut self) -> bool {
        if self.cursor.advance(self.ctrl) {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// The entry the last successful [`advance`](Iter::advance) moved to, or
    /// `None` before the first call and after exhaustion.
    pub fn current(&self) -> Option<(&'a K, &'a V)> {
        if !self.cursor.found {
            return None;
        }
        let groups: &'a [Group<K, V>] = self.groups;
        let group = &groups[self.cursor.group];
        // SAFETY: `found` is only set on a slot with a full control byte, and
        // the borrowed arrays cannot change while `self` is alive.
        unsafe { Some((group.key(self.cursor.slot), group.value(self.cursor.slot))) }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.advance() {
            self.current()
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// An iterator over the arrays a [`HashTable`] had when the snapshot was
/// taken.
///
/// The snapshot owns a reference to those arrays instead of borrowing the
/// table, so the table can be modified, rehashed, or dropped while the
/// snapshot is in use. Modifications are not visible to the snapshot: it
/// yields exactly the entries that were live when it was created. The old
/// arrays are freed when the last snapshot over them is dropped.
///
/// Traversal order and the cursor interface match [`Iter`]. As an
/// [`Iterator`] it yields clones of the entries.
pub struct SnapshotIter<K, V> {
    arrays: Arc<Arrays<K, V>>,
    cursor: Cursor,
    remaining: usize,
}

impl<K, V> Clone for SnapshotIter<K, V> {
    fn clone(&self) -> Self {
        Self {
            arrays: Arc::clone(&self.arrays),
            cursor: self.cursor,
            remaining: self.remaining,
        }
    }
}

impl<K, V> SnapshotIter<K, V> {
    /// Moves to the next entry of the snapshot. Returns `false` once every
    /// group has been scanned, and on every call after that.
    pub fn advance(&mut self) -> bool {
        if self.cursor.advance(&self.arrays.ctrl) {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// The entry the last successful [`advance`](SnapshotIter::advance)
    /// moved to, or `None` before the first call and after exhaustion.
    pub fn current(&self) -> Option<(&K, &V)> {
        if !self.cursor.found {
            return None;
        }
        let group = &self.arrays.groups[self.cursor.group];
        // SAFETY: `found` is only set on a slot with a full control byte.
        // Tables copy shared arrays before writing, so the snapshot's arrays
        // never change.
        unsafe { Some((group.key(self.cursor.slot), group.value(self.cursor.slot))) }
    }
}

impl<K: Clone, V: Clone> Iterator for SnapshotIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.advance() {
            self.current().map(|(k, v)| (k.clone(), v.clone()))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: Clone, V: Clone> ExactSizeIterator for SnapshotIter<K, V> {}

impl<K: Clone, V: Clone> FusedIterator for SnapshotIter<K, V> {}
