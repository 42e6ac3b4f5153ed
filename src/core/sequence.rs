//! Stream-local sequence numbering.

/// Hands out contiguous sequence numbers starting at 0.
///
/// One instance belongs to one stream session; a new session gets a new
/// assigner, so numbering never leaks between sessions.
#[derive(Debug, Default)]
pub struct SequenceAssigner {
    next: u64,
}

impl SequenceAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next sequence number.
    pub fn next(&mut self) -> u64 {
        let sequence = self.next;
        self.next += 1;
        sequence
    }

    /// How many numbers have been assigned.
    pub fn assigned(&self) -> u64 {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}
