//! Fixed-capacity, index-stable slot storage.
//!
//! Provides [`SlotPool`], the arena every waveform record lives in. Indices
//! handed out by [`SlotPool::add`] stay valid until the matching
//! [`SlotPool::remove`], and are reused afterwards.

/// Error returned when a pool has no free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PoolFull;

impl core::fmt::Display for PoolFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "slot pool is full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PoolFull {}

/// Fixed-capacity container mapping slot indices to records.
///
/// Records are stored in place; nothing is allocated. Looking up a free index
/// yields `None` rather than stale content.
///
/// # Type Parameters
/// * `T` - Record type
/// * `N` - Number of slots
#[derive(Debug, Clone)]
pub struct SlotPool<T, const N: usize> {
    slots: [Option<T>; N],
}

impl<T, const N: usize> SlotPool<T, N> {
    /// Creates a pool with every slot free.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Stores `record` in the lowest free slot and returns its index.
    ///
    /// # Errors
    /// Returns [`PoolFull`] without touching any slot when the pool is at capacity.
    pub fn add(&mut self, record: T) -> Result<usize, PoolFull> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(PoolFull)?;
        self.slots[index] = Some(record);
        Ok(index)
    }

    /// Frees the slot at `index` and returns its record.
    ///
    /// Returns `None` if the slot was already free or the index is out of range.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Returns the record at `index` if the slot is live.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Returns the record at `index` mutably if the slot is live.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Returns true if `index` refers to a live slot.
    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Frees every slot. No per-record teardown runs.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Returns the number of live slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns true if no slot is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if no slot is free.
    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Returns the number of free slots.
    pub fn free_count(&self) -> usize {
        N - self.len()
    }

    /// Returns the total number of slots.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Iterates live slots as `(index, record)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|record| (index, record)))
    }
}

impl<T, const N: usize> Default for SlotPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
