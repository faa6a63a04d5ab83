//! Round-robin frame slot index.

/// Cycles through `N` frame slots.
///
/// Slot `k` is reused only after its fence has been waited on, so at most
/// `N` frames are in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlotRing {
    len: usize,
    current: usize,
}

impl FrameSlotRing {
    /// Creates a ring of `frames_in_flight` slots starting at slot 0.
    ///
    /// A count of zero is treated as one.
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            len: frames_in_flight.max(1),
            current: 0,
        }
    }

    /// Index of the slot the next tick will use.
    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    /// Moves to the next slot and returns its index.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.len;
        self.current
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }
}
