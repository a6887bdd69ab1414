//! Event sink: where decoded frames go.
//!
//! The state machine only arms a transfer when the sink reports spare
//! capacity, so a sink must answer [`EventSink::has_capacity`] without
//! blocking and must accept a delivery without waiting on the consumer.

use crate::error::{Error, Result};
use crate::frame::NormalizedFrame;
use std::collections::VecDeque;
use tracing::warn;

/// Consumer-facing destination for decoded frames.
///
/// The driver allocates its sink on `open` and releases it on `close`.
pub trait EventSink {
    /// Allocate a sink sized for `capacity` frames.
    ///
    /// Fails with [`Error::ResourceExhausted`] when the room cannot be had.
    fn allocate(capacity: usize) -> Result<Self>
    where
        Self: Sized;

    /// Whether another frame can be accepted right now.
    fn has_capacity(&self) -> bool;

    /// Accept one frame.
    fn deliver(&mut self, frame: NormalizedFrame);
}

/// Bounded FIFO of decoded frames.
#[derive(Debug)]
pub struct FrameQueue {
    frames: VecDeque<NormalizedFrame>,
    capacity: usize,
    dropped: u64,
}

impl FrameQueue {
    /// Allocate room for `capacity` frames up front.
    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::ResourceExhausted { requested: 0 });
        }
        let mut frames = VecDeque::new();
        frames
            .try_reserve_exact(capacity)
            .map_err(|_| Error::ResourceExhausted {
                requested: capacity,
            })?;
        Ok(Self {
            frames,
            capacity,
            dropped: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn pop(&mut self) -> Option<NormalizedFrame> {
        self.frames.pop_front()
    }

    pub fn drain(&mut self) -> Vec<NormalizedFrame> {
        self.frames.drain(..).collect()
    }
}

impl EventSink for FrameQueue {
    fn allocate(capacity: usize) -> Result<Self> {
        Self::try_with_capacity(capacity)
    }

    fn has_capacity(&self) -> bool {
        self.frames.len() < self.capacity
    }

    fn deliver(&mut self, frame: NormalizedFrame) {
        if !self.has_capacity() {
            self.dropped += 1;
            warn!(
                capacity = self.capacity,
                dropped = self.dropped,
                "frame queue full, discarding frame"
            );
            return;
        }
        self.frames.push_back(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::AxisResolution;
    use crate::transfer::Channel;

    fn frame() -> NormalizedFrame {
        NormalizedFrame {
            channel: Channel::Button,
            button: true,
            touches: Vec::new(),
            resolution: AxisResolution {
                pressure: 256,
                width: 16,
                x: 1280,
                y: 800,
            },
        }
    }

    #[test]
    fn queue_reports_capacity_until_full() {
        let mut q = FrameQueue::try_with_capacity(2).unwrap();
        assert!(q.has_capacity());
        q.deliver(frame());
        assert!(q.has_capacity());
        q.deliver(frame());
        assert!(!q.has_capacity());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn full_queue_counts_drops() {
        let mut q = FrameQueue::try_with_capacity(1).unwrap();
        q.deliver(frame());
        q.deliver(frame());
        assert_eq!(q.len(), 1);
        assert_eq!(q.dropped(), 1);
    }

    #[test]
    fn pop_frees_capacity() {
        let mut q = FrameQueue::try_with_capacity(1).unwrap();
        q.deliver(frame());
        assert!(q.pop().is_some());
        assert!(q.has_capacity());
        assert!(q.is_empty());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            FrameQueue::try_with_capacity(0),
            Err(Error::ResourceExhausted { requested: 0 })
        ));
    }

    #[test]
    fn absurd_capacity_fails_allocation() {
        assert!(FrameQueue::try_with_capacity(usize::MAX).is_err());
        assert!(<FrameQueue as EventSink>::allocate(usize::MAX).is_err());
    }
}
