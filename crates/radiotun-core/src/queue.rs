//! Bounded FIFO queue connecting two pipeline stages.
//!
//! Each queue has exactly one producer and one consumer thread. Pushing never
//! blocks: a full queue rejects the frame and hands it back so the caller can
//! count and drop it. Popping blocks until a frame arrives or the queue is
//! closed; [`FrameQueue::close`] is the shutdown sentinel that releases a
//! consumer parked in [`FrameQueue::pop`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::frame::Frame;

/// Why a push was rejected. The frame is returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("queue full")]
    Full(Frame),
    #[error("queue closed")]
    Closed(Frame),
}

impl PushError {
    pub fn into_frame(self) -> Frame {
        match self {
            Self::Full(frame) | Self::Closed(frame) => frame,
        }
    }
}

/// Why a bounded pop returned without a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PopError {
    #[error("timed out waiting for a frame")]
    Timeout,
    #[error("queue closed")]
    Closed,
}

#[derive(Debug)]
struct QueueState {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// A bounded, thread-safe FIFO of [`Frame`]s.
#[derive(Debug)]
pub struct FrameQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
}

impl FrameQueue {
    /// Create an empty queue holding at most `capacity` frames.
    ///
    /// A zero-capacity queue rejects every push.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Append a frame without blocking.
    pub fn push(&self, frame: Frame) -> Result<(), PushError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PushError::Closed(frame));
        }
        if state.frames.len() >= self.capacity {
            return Err(PushError::Full(frame));
        }
        state.frames.push_back(frame);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Remove the oldest frame, blocking until one exists.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<Frame> {
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Like [`pop`](Self::pop), but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Frame, PopError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                return Ok(frame);
            }
            if state.closed {
                return Err(PopError::Closed);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PopError::Timeout);
            }
            self.available.wait_for(&mut state, remaining);
        }
    }

    /// Remove the oldest frame if one is queued.
    pub fn try_pop(&self) -> Option<Frame> {
        self.state.lock().frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reject further pushes and wake every waiting consumer.
    ///
    /// Frames already queued can still be popped. Idempotent.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;

    use super::*;

    fn frame(tag: u8) -> Frame {
        Frame::new(&[tag; 4])
    }

    #[test]
    fn push_pop_is_fifo() {
        let queue = FrameQueue::new(5);
        for tag in 0..5 {
            queue.push(frame(tag)).unwrap();
        }
        for tag in 0..5 {
            assert_eq!(queue.pop().unwrap(), frame(tag));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn push_on_full_queue_is_rejected_without_side_effects() {
        let queue = FrameQueue::new(5);
        let mut drops = 0;
        for tag in 0..6 {
            if let Err(err) = queue.push(frame(tag)) {
                assert!(matches!(err, PushError::Full(_)));
                assert_eq!(err.into_frame(), frame(5));
                drops += 1;
            }
        }
        assert_eq!(drops, 1);
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.try_pop().unwrap(), frame(0));
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let queue = FrameQueue::new(0);
        assert!(matches!(queue.push(frame(1)), Err(PushError::Full(_))));
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_timeout_expires_on_empty_queue() {
        let queue = FrameQueue::new(1);
        let started = Instant::now();
        assert_eq!(
            queue.pop_timeout(Duration::from_millis(20)).unwrap_err(),
            PopError::Timeout
        );
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn close_releases_blocked_consumer() {
        let queue = Arc::new(FrameQueue::new(2));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn close_drains_remaining_frames_then_reports_closed() {
        let queue = FrameQueue::new(2);
        queue.push(frame(7)).unwrap();
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        assert!(matches!(queue.push(frame(8)), Err(PushError::Closed(_))));
        assert_eq!(queue.pop().unwrap(), frame(7));
        assert!(queue.pop().is_none());
        assert_eq!(
            queue.pop_timeout(Duration::from_millis(1)).unwrap_err(),
            PopError::Closed
        );
    }

    #[test]
    fn blocked_pop_wakes_on_push_from_other_thread() {
        let queue = Arc::new(FrameQueue::new(5));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for tag in 0..20 {
                    while queue.push(frame(tag)).is_err() {
                        thread::yield_now();
                    }
                }
            })
        };
        let received: Vec<Frame> = (0..20).filter_map(|_| queue.pop()).collect();
        producer.join().unwrap();
        assert_eq!(received, (0..20).map(frame).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn length_never_exceeds_capacity(
            capacity in 0usize..8,
            ops in proptest::collection::vec(any::<bool>(), 0..64),
        ) {
            let queue = FrameQueue::new(capacity);
            let mut model: VecDeque<u8> = VecDeque::new();
            for (i, is_push) in ops.into_iter().enumerate() {
                let tag = i as u8;
                if is_push {
                    let accepted = queue.push(frame(tag)).is_ok();
                    prop_assert_eq!(accepted, model.len() < capacity);
                    if accepted {
                        model.push_back(tag);
                    }
                } else {
                    let popped = queue.try_pop();
                    prop_assert_eq!(popped, model.pop_front().map(frame));
                }
                prop_assert!(queue.len() <= capacity);
                prop_assert_eq!(queue.len(), model.len());
            }
        }
    }
}
