use core::mem::MaybeUninit;

use crate::control::GROUP_WIDTH;

/// Sixteen parallel key and value slots.
///
/// A group does not know which of its slots are initialized; that is recorded
/// by the control bytes the table keeps at the same group index. Every method
/// that touches slot contents is therefore `unsafe` and relies on the caller
/// consulting those control bytes first.
pub(crate) struct Group<K, V> {
    keys: [MaybeUninit<K>; GROUP_WIDTH],
    values: [MaybeUninit<V>; GROUP_WIDTH],
}

impl<K, V> Group<K, V> {
    pub(crate) const fn new() -> Self {
        Self {
            keys: [const { MaybeUninit::uninit() }; GROUP_WIDTH],
            values: [const { MaybeUninit::uninit() }; GROUP_WIDTH],
        }
    }

    /// # Safety
    ///
    /// `slot < GROUP_WIDTH` and the slot is initialized.
    #[inline(always)]
    pub(crate) unsafe fn key(&self, slot: usize) -> &K {
        // SAFETY: Caller guarantees bounds and initialization.
        unsafe { self.keys.get_unchecked(slot).assume_init_ref() }
    }

    /// # Safety
    ///
    /// `slot < GROUP_WIDTH` and the slot is initialized.
    #[inline(always)]
    pub(crate) unsafe fn value(&self, slot: usize) -> &V {
        // SAFETY: Caller guarantees bounds and initialization.
        unsafe { self.values.get_unchecked(slot).assume_init_ref() }
    }

    /// # Safety
    ///
    /// `slot < GROUP_WIDTH` and the slot is initialized.
    #[inline(always)]
    pub(crate) unsafe fn pair_mut(&mut self, slot: usize) -> (&mut K, &mut V) {
        // SAFETY: Caller guarantees bounds and initialization. Keys and values
        // live in disjoint arrays.
        unsafe {
            (
                self.keys.get_unchecked_mut(slot).assume_init_mut(),
                self.values.get_unchecked_mut(slot).assume_init_mut(),
            )
        }
    }

    /// # Safety
    ///
    /// `slot < GROUP_WIDTH` and the slot is uninitialized; otherwise the
    /// previous contents are leaked.
    #[inline(always)]
    pub(crate) unsafe fn write(&mut self, slot: usize, key: K, value: V) {
        // SAFETY: Caller guarantees bounds.
        unsafe {
            self.keys.get_unchecked_mut(slot).write(key);
            self.values.get_unchecked_mut(slot).write(value);
        }
    }

    /// Moves the pair out, leaving the slot uninitialized.
    ///
    /// # Safety
    ///
    /// `slot < GROUP_WIDTH` and the slot is initialized. The caller must mark
    /// the slot vacant before anything can observe it again.
    #[inline(always)]
    pub(crate) unsafe fn take(&mut self, slot: usize) -> (K, V) {
        // SAFETY: Caller guarantees bounds and initialization.
        unsafe {
            (
                self.keys.get_unchecked(slot).assume_init_read(),
                self.values.get_unchecked(slot).assume_init_read(),
            )
        }
    }

    /// # Safety
    ///
    /// Same as [`Group::take`].
    #[inline(always)]
    pub(crate) unsafe fn drop_in_place(&mut self, slot: usize) {
        // SAFETY: Caller guarantees bounds and initialization.
        unsafe {
            self.keys.get_unchecked_mut(slot).assume_init_drop();
            self.values.get_unchecked_mut(slot).assume_init_drop();
        }
    }
}
