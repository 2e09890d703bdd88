use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;

#[derive(Debug)]
struct Slot<T> {
    frame: Option<T>,
    submitted: u64,
    dropped: u64,
}

/// Single-slot, last-writer-wins hand-off between an ingestion thread and
/// the detection loop.
///
/// Clones share the slot. Submitting over an untaken frame discards the
/// older one; there is no queue and no backpressure.
#[derive(Debug)]
pub struct FrameBuffer<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for FrameBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for FrameBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameBuffer<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                frame: None,
                submitted: 0,
                dropped: 0,
            })),
        }
    }

    // A panicking producer cannot leave the slot half-written, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `frame`, replacing any frame not yet taken. Returns `true`
    /// when a frame was overwritten.
    pub fn submit(&self, frame: T) -> bool {
        let mut slot = self.lock();
        slot.submitted += 1;
        let replaced = slot.frame.replace(frame).is_some();
        if replaced {
            slot.dropped += 1;
            trace!("Frame buffer overwrite ({} dropped so far)", slot.dropped);
        }
        replaced
    }

    /// Removes and returns the buffered frame, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.lock().frame.take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frame.is_none()
    }

    pub fn submitted(&self) -> u64 {
        self.lock().submitted
    }

    /// Frames overwritten before the detection loop took them.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
