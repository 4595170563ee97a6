//! Process queue
//!
//! Fixed-capacity ring of process ids with separate head and tail indices,
//! used by the feedback-queue strategy. One cell stays unused so a full ring
//! still admits every non-idle slot.

use crate::config::N_SLOTS;
use crate::sched::Pid;

/// Append failed: the ring is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueFull;

#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessQueue {
    data: [Pid; N_SLOTS],
    head: usize,
    tail: usize,
}

impl ProcessQueue {
    pub const fn new() -> Self {
        Self { data: [0; N_SLOTS], head: 0, tail: 0 }
    }

    /// Drop every queued id.
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    /// Whether the queue holds at least one id.
    pub fn has_next(&self) -> bool {
        self.head != self.tail
    }

    /// First queued id, if any.
    pub fn peek_first(&self) -> Option<Pid> {
        if self.has_next() { Some(self.data[self.tail]) } else { None }
    }

    /// Drop the first queued id.
    pub fn drop_first(&mut self) {
        if self.has_next() {
            self.tail = (self.tail + 1) % self.data.len();
        }
    }

    /// Append `pid` at the back.
    pub fn append(&mut self, pid: Pid) -> Result<(), QueueFull> {
        if (self.head + 1) % self.data.len() == self.tail {
            return Err(QueueFull);
        }
        self.data[self.head] = pid;
        self.head = (self.head + 1) % self.data.len();
        Ok(())
    }

    /// Drop every occurrence of `pid`, preserving the order of the rest.
    pub fn remove(&mut self, pid: Pid) {
        let occupancy = self.len();
        for _ in 0..occupancy {
            let front = self.data[self.tail];
            self.drop_first();
            if front != pid {
                // Dropping just made room; the append cannot fail.
                let _ = self.append(front);
            }
        }
    }

    /// Number of queued ids.
    pub fn len(&self) -> usize {
        (self.head + self.data.len() - self.tail) % self.data.len()
    }

    /// Queued ids in order, front first.
    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<Pid> {
        let mut ids = Vec::new();
        let mut i = self.tail;
        while i != self.head {
            ids.push(self.data[i]);
            i = (i + 1) % self.data.len();
        }
        ids
    }
}
