//! Ranges allocated by the running transaction.

use std::collections::BTreeMap;

/// Disjoint byte ranges allocated during a transaction.
///
/// Ranges are keyed by start address and adjacent ranges coalesce, so a
/// containment query is a single ordered lookup.
#[derive(Debug, Default, Clone)]
pub struct NewMemoryTracker {
    /// start -> end (exclusive)
    ranges: BTreeMap<usize, usize>,
}

impl NewMemoryTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `[address, address + size)`.
    ///
    /// # Panics
    ///
    /// Panics if the range overlaps a range already registered.
    pub fn insert(&mut self, address: usize, size: usize) {
        if size == 0 {
            return;
        }
        let mut start = address;
        let mut end = address
            .checked_add(size)
            .unwrap_or_else(|| panic!("allocation {address:#x}+{size} wraps the address space"));

        if let Some((&prev_start, &prev_end)) = self.ranges.range(..end).next_back() {
            assert!(
                prev_end <= start,
                "allocation [{start:#x}, {end:#x}) overlaps tracked range [{prev_start:#x}, {prev_end:#x})"
            );
            if prev_end == start {
                self.ranges.remove(&prev_start);
                start = prev_start;
            }
        }
        if let Some(next_end) = self.ranges.remove(&end) {
            end = next_end;
        }
        self.ranges.insert(start, end);
    }

    /// Returns true if `[address, address + size)` lies entirely inside one
    /// tracked range.
    pub fn contains(&self, address: usize, size: usize) -> bool {
        let Some(end) = address.checked_add(size) else {
            return false;
        };
        self.ranges
            .range(..=address)
            .next_back()
            .is_some_and(|(_, &range_end)| end <= range_end && address < range_end)
    }

    /// Returns true if `address` is inside any tracked range.
    pub fn contains_address(&self, address: usize) -> bool {
        self.contains(address, 1)
    }

    /// Moves every range of `other` into `self`.
    ///
    /// # Panics
    ///
    /// Panics if any range overlaps.
    pub fn merge(&mut self, other: NewMemoryTracker) {
        for (start, end) in other.ranges {
            self.insert(start, end - start);
        }
    }

    /// Returns the number of disjoint ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Forgets every range.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}
