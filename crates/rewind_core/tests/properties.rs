//! Property tests for the undo-logging primitives against simple models.

use proptest::prelude::*;
use rewind_core::memory::{HitSet, NewMemoryTracker, WriteLog, MAX_ENTRY_SIZE};
use std::collections::HashSet;

const BUFFER_LEN: usize = 3 * MAX_ENTRY_SIZE;

/// `(offset, len, fill)` overwrites applied to a byte buffer.
fn overwrite_strategy() -> impl Strategy<Value = Vec<(usize, usize, u8)>> {
    prop::collection::vec(
        (0..BUFFER_LEN, prop_oneof![1usize..=32, 1usize..=2 * MAX_ENTRY_SIZE], any::<u8>()),
        1..24,
    )
}

/// Records then overwrites each span of `buffer`.
fn overwrite(log: &mut WriteLog, buffer: &mut [u8], ops: &[(usize, usize, u8)]) {
    for &(offset, len, fill) in ops {
        let len = len.min(buffer.len() - offset);
        let span = &mut buffer[offset..offset + len];
        // SAFETY: the span is borrowed from `buffer` for the call.
        unsafe { log.record(span.as_ptr() as usize, len) };
        span.fill(fill);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn undo_restores_original_bytes(
        initial in prop::collection::vec(any::<u8>(), BUFFER_LEN),
        ops in overwrite_strategy(),
    ) {
        let mut buffer = initial.clone();
        let mut log = WriteLog::new();
        overwrite(&mut log, &mut buffer, &ops);

        // SAFETY: every logged span lies inside `buffer`, which is still live.
        unsafe { log.undo() };
        prop_assert_eq!(buffer, initial);
    }

    #[test]
    fn merged_child_log_undoes_with_parent(
        initial in prop::collection::vec(any::<u8>(), BUFFER_LEN),
        parent_ops in overwrite_strategy(),
        child_ops in overwrite_strategy(),
    ) {
        let mut buffer = initial.clone();
        let mut parent = WriteLog::new();
        overwrite(&mut parent, &mut buffer, &parent_ops);

        let mut child = WriteLog::new();
        overwrite(&mut child, &mut buffer, &child_ops);
        let child_len = child.len();
        let parent_len = parent.len();
        prop_assert_eq!(child.merge_into(&mut parent, |_| true), 0);
        prop_assert_eq!(parent.len(), parent_len + child_len);

        // SAFETY: every logged span lies inside `buffer`, which is still live.
        unsafe { parent.undo() };
        prop_assert_eq!(buffer, initial);
    }

    #[test]
    fn hit_set_reports_first_insert_only(
        spans in prop::collection::vec((0usize..512, 1usize..=16), 1..200),
    ) {
        let mut set = HitSet::new();
        let mut model = HashSet::new();
        for (address, size) in spans {
            prop_assert_eq!(set.insert(address, size), model.insert((address, size)));
            prop_assert!(set.contains(address, size));
        }
        prop_assert_eq!(set.len(), model.len());
    }

    #[test]
    fn new_memory_contains_only_whole_allocations(
        layout in prop::collection::vec((0usize..8, 1usize..16), 1..32),
        reverse in any::<bool>(),
        queries in prop::collection::vec((0usize..512, 1usize..24), 1..64),
    ) {
        let mut ranges = Vec::new();
        let mut next = 0;
        for (gap, len) in layout {
            ranges.push((next + gap, len));
            next += gap + len;
        }
        if reverse {
            ranges.reverse();
        }

        let mut tracker = NewMemoryTracker::new();
        let mut covered = HashSet::new();
        for &(start, len) in &ranges {
            tracker.insert(start, len);
            covered.extend(start..start + len);
        }

        for (address, size) in queries {
            let expected = (address..address + size).all(|byte| covered.contains(&byte));
            prop_assert_eq!(tracker.contains(address, size), expected, "query {}+{}", address, size);
        }
    }
}
