//! Deduplication filter for recorded spans.
//!
//! An open-addressing table of packed `(address, size)` keys with linear
//! probing. Only membership is stored. Clearing keeps the allocated slots so
//! a transaction that is retried does not grow the table from scratch again.

/// Largest span size the set tracks.
pub const MAX_SIZE: usize = 16;

const ADDRESS_BITS: u32 = 48;
const INITIAL_CAPACITY: usize = 64;
const EMPTY: u64 = 0;

/// Set of spans already logged by one transaction.
#[derive(Debug, Default)]
pub struct HitSet {
    slots: Vec<u64>,
    len: usize,
}

impl HitSet {
    /// Creates an empty set. No memory is allocated until the first insert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `size` is small enough to be tracked.
    #[must_use]
    pub const fn tracks(size: usize) -> bool {
        size > 0 && size <= MAX_SIZE
    }

    fn key(address: usize, size: usize) -> u64 {
        debug_assert!(Self::tracks(size));
        ((size as u64) << ADDRESS_BITS) | address as u64
    }

    fn slot_for(key: u64, mask: usize) -> usize {
        // Fibonacci hashing spreads aligned addresses across the table.
        (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as usize & mask
    }

    fn packable(address: usize) -> bool {
        (address as u64) >> ADDRESS_BITS == 0
    }

    /// Inserts the span. Returns false if it was already present.
    ///
    /// Spans that cannot be packed into a key are never stored and always
    /// report as new.
    pub fn insert(&mut self, address: usize, size: usize) -> bool {
        if !Self::tracks(size) || !Self::packable(address) {
            return true;
        }
        if (self.len + 1) * 2 > self.slots.len() {
            self.grow();
        }
        let key = Self::key(address, size);
        let inserted = Self::insert_key(&mut self.slots, key);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Returns true if the span is present.
    pub fn contains(&self, address: usize, size: usize) -> bool {
        if self.slots.is_empty() || !Self::tracks(size) || !Self::packable(address) {
            return false;
        }
        let key = Self::key(address, size);
        let mask = self.slots.len() - 1;
        let mut index = Self::slot_for(key, mask);
        loop {
            match self.slots[index] {
                EMPTY => return false,
                slot if slot == key => return true,
                _ => index = (index + 1) & mask,
            }
        }
    }

    fn insert_key(slots: &mut [u64], key: u64) -> bool {
        let mask = slots.len() - 1;
        let mut index = Self::slot_for(key, mask);
        loop {
            match slots[index] {
                EMPTY => {
                    slots[index] = key;
                    return true;
                }
                slot if slot == key => return false,
                _ => index = (index + 1) & mask,
            }
        }
    }

    fn grow(&mut self) {
        let capacity = (self.slots.len() * 2).max(INITIAL_CAPACITY);
        let old = std::mem::replace(&mut self.slots, vec![EMPTY; capacity]);
        for key in old.into_iter().filter(|&key| key != EMPTY) {
            Self::insert_key(&mut self.slots, key);
        }
    }

    /// Returns the number of spans in the set.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of allocated slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Removes every span, keeping the allocated slots.
    pub fn clear(&mut self) {
        if self.len > 0 {
            self.slots.fill(EMPTY);
            self.len = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_first_hit_only() {
        let mut set = HitSet::new();
        assert!(set.insert(0x1000, 4));
        assert!(!set.insert(0x1000, 4));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn size_is_part_of_the_key() {
        let mut set = HitSet::new();
        assert!(set.insert(0x1000, 4));
        assert!(set.insert(0x1000, 8));
        assert!(set.contains(0x1000, 4));
        assert!(set.contains(0x1000, 8));
        assert!(!set.contains(0x1000, 2));
    }

    #[test]
    fn address_zero_is_storable() {
        let mut set = HitSet::new();
        assert!(set.insert(0, 1));
        assert!(set.contains(0, 1));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut set = HitSet::new();
        for i in 0..1000 {
            assert!(set.insert(0x10_0000 + i * 8, 8));
        }
        assert_eq!(set.len(), 1000);
        assert!(set.capacity() >= 2000);
        for i in 0..1000 {
            assert!(set.contains(0x10_0000 + i * 8, 8));
        }
        assert!(!set.contains(0x10_0000 + 1000 * 8, 8));
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut set = HitSet::new();
        for i in 0..100 {
            set.insert(i * 4, 4);
        }
        let capacity = set.capacity();
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.capacity(), capacity);
        assert!(!set.contains(0, 4));
        assert!(set.insert(0, 4));
    }

    #[test]
    fn untracked_spans_always_report_new() {
        let mut set = HitSet::new();
        assert!(set.insert(0x1000, MAX_SIZE + 1));
        assert!(set.insert(0x1000, MAX_SIZE + 1));
        assert!(set.is_empty());
    }

    #[test]
    fn only_small_sizes_are_tracked() {
        assert!(HitSet::tracks(1));
        assert!(HitSet::tracks(MAX_SIZE));
        assert!(!HitSet::tracks(MAX_SIZE + 1));
        assert!(!HitSet::tracks(0));
    }
}
