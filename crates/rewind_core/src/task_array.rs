//! Deferred callbacks with optional cancellation keys.
//!
//! Used for both commit tasks and abort tasks. Cancelling a keyed task leaves
//! an empty slot behind, so indices recorded in the key map stay valid and
//! the run order of the remaining tasks is never disturbed.

use crate::types::TaskKey;
use std::collections::HashMap;
use std::fmt;

/// A deferred callback.
pub type Task = Box<dyn FnOnce() + 'static>;

struct TaskEntry {
    key: Option<TaskKey>,
    task: Option<Task>,
}

/// Ordered, key-cancelable list of deferred callbacks.
#[derive(Default)]
pub struct TaskArray {
    entries: Vec<TaskEntry>,
    /// key -> indices of live entries with that key, oldest first
    keyed: HashMap<TaskKey, Vec<usize>>,
    live: usize,
}

impl TaskArray {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an unkeyed task.
    pub fn add(&mut self, task: Task) {
        self.entries.push(TaskEntry {
            key: None,
            task: Some(task),
        });
        self.live += 1;
    }

    /// Appends a task that can later be cancelled through `key`.
    pub fn add_keyed(&mut self, key: TaskKey, task: Task) {
        let index = self.entries.len();
        self.entries.push(TaskEntry {
            key: Some(key),
            task: Some(task),
        });
        self.keyed.entry(key).or_default().push(index);
        self.live += 1;
    }

    /// Cancels the most recently added task with `key`.
    ///
    /// Returns false if no live task has that key.
    pub fn delete_key(&mut self, key: TaskKey) -> bool {
        let Some(indices) = self.keyed.get_mut(&key) else {
            return false;
        };
        let Some(index) = indices.pop() else {
            return false;
        };
        if indices.is_empty() {
            self.keyed.remove(&key);
        }
        self.entries[index].task = None;
        self.live -= 1;
        true
    }

    /// Cancels every task with `key`.
    ///
    /// Returns false if no live task has that key.
    pub fn delete_all_keys(&mut self, key: TaskKey) -> bool {
        let Some(indices) = self.keyed.remove(&key) else {
            return false;
        };
        for index in &indices {
            self.entries[*index].task = None;
        }
        self.live -= indices.len();
        !indices.is_empty()
    }

    /// Returns true if a live task has `key`.
    pub fn contains_key(&self, key: TaskKey) -> bool {
        self.keyed.contains_key(&key)
    }

    /// Moves every task of `other` behind the tasks of `self`, keys included.
    pub fn append(&mut self, other: TaskArray) {
        let offset = self.entries.len();
        for (key, indices) in other.keyed {
            self.keyed
                .entry(key)
                .or_default()
                .extend(indices.into_iter().map(|index| index + offset));
        }
        self.entries.extend(other.entries);
        self.live += other.live;
    }

    /// Runs every task in the order it was added.
    pub fn run_forward(self) {
        for entry in self.entries {
            if let Some(task) = entry.task {
                task();
            }
        }
    }

    /// Runs every task, most recently added first.
    pub fn run_reverse(self) {
        for entry in self.entries.into_iter().rev() {
            if let Some(task) = entry.task {
                task();
            }
        }
    }

    /// Returns the number of live tasks.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no live task remains.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Drops every task without running it.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.keyed.clear();
        self.live = 0;
    }
}

impl fmt::Debug for TaskArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<_> = self.entries.iter().filter_map(|entry| entry.key).collect();
        f.debug_struct("TaskArray")
            .field("live", &self.live)
            .field("slots", &self.entries.len())
            .field("keys", &keys)
            .finish()
    }
}
