//! Single-flight characteristic read queue.
//!
//! The BLE transport accepts one GATT operation at a time. The queue tracks
//! the read currently issued to the transport and the reads waiting behind
//! it, and hands them out strictly in request order.
//!
//! The queue itself is not synchronised. The driver keeps it under the same
//! lock as the connection state so that "is a read in flight?" and "enqueue"
//! are observed atomically by both the caller and the completion handler.

use std::collections::VecDeque;

use crate::ble::profile::CharacteristicRole;

/// What the caller should do with a newly submitted read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Nothing was in flight; the read is now in flight and must be issued.
    Issue(CharacteristicRole),
    /// Another read is in flight; this one waits in the queue.
    Queued {
        /// Number of reads waiting, including this one.
        position: usize,
    },
}

/// FIFO of pending reads with at most one read in flight.
#[derive(Debug, Default)]
pub struct ReadQueue {
    in_flight: Option<CharacteristicRole>,
    pending: VecDeque<CharacteristicRole>,
}

impl ReadQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a read request.
    ///
    /// Duplicate roles are kept as separate entries.
    pub fn submit(&mut self, role: CharacteristicRole) -> Submission {
        if self.in_flight.is_none() {
            self.in_flight = Some(role);
            Submission::Issue(role)
        } else {
            self.pending.push_back(role);
            Submission::Queued {
                position: self.pending.len(),
            }
        }
    }

    /// Finish the in-flight read and promote the oldest pending one.
    ///
    /// Returns the role that is now in flight and must be issued, or `None`
    /// when the queue has drained.
    pub fn complete(&mut self) -> Option<CharacteristicRole> {
        self.in_flight = self.pending.pop_front();
        self.in_flight
    }

    /// The read currently awaiting completion.
    pub fn in_flight(&self) -> Option<CharacteristicRole> {
        self.in_flight
    }

    /// Check if a read is awaiting completion.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Number of reads waiting behind the in-flight one.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if no reads are waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Roles waiting to be issued, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = CharacteristicRole> + '_ {
        self.pending.iter().copied()
    }

    /// Drop every pending read and forget the in-flight one.
    pub fn clear(&mut self) {
        self.in_flight = None;
        self.pending.clear();
    }
}
