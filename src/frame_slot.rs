use crate::frame::Frame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::trace;

/// Capacity-one frame buffer with keep-latest backpressure.
///
/// The camera pushes into the slot at sensor rate while the analyzer pulls
/// at its own pace. A frame that is replaced before being taken is released
/// straight back to the camera.
pub struct FrameSlot {
    slot: Mutex<Option<Frame>>,
    notify: Notify,
    closed: AtomicBool,
    stats: FrameSlotStats,
}

/// Counters for slot throughput
#[derive(Debug, Default)]
pub struct FrameSlotStats {
    /// Frames offered by the camera
    pub frames_pushed: AtomicU64,
    /// Frames handed to the consumer
    pub frames_taken: AtomicU64,
    /// Frames replaced before the consumer got to them
    pub frames_replaced: AtomicU64,
}

/// Snapshot of slot counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlotStatsSnapshot {
    pub frames_pushed: u64,
    pub frames_taken: u64,
    pub frames_replaced: u64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            stats: FrameSlotStats::default(),
        }
    }

    /// Offer a frame. Returns false (and releases the frame) once closed.
    pub fn push(&self, frame: Frame) -> bool {
        if self.is_closed() {
            frame.release();
            return false;
        }

        self.stats.frames_pushed.fetch_add(1, Ordering::Relaxed);
        let replaced = self.slot.lock().replace(frame);
        if let Some(old) = replaced {
            trace!("Replacing unconsumed frame {}", old.id);
            self.stats.frames_replaced.fetch_add(1, Ordering::Relaxed);
            old.release();
        }

        self.notify.notify_one();
        true
    }

    /// Take the pending frame without waiting
    pub fn try_take(&self) -> Option<Frame> {
        let frame = self.slot.lock().take();
        if frame.is_some() {
            self.stats.frames_taken.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Wait for the next frame. Returns `None` once the slot is closed.
    pub async fn next(&self) -> Option<Frame> {
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(frame) = self.try_take() {
                return Some(frame);
            }
            self.notify.notified().await;
        }
    }

    /// Stop accepting frames, release anything pending and wake the consumer
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(frame) = self.slot.lock().take() {
            frame.release();
        }
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> FrameSlotStatsSnapshot {
        FrameSlotStatsSnapshot {
            frames_pushed: self.stats.frames_pushed.load(Ordering::Relaxed),
            frames_taken: self.stats.frames_taken.load(Ordering::Relaxed),
            frames_replaced: self.stats.frames_replaced.load(Ordering::Relaxed),
        }
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn frame(id: u64, released: &Arc<AtomicUsize>) -> Frame {
        let released = Arc::clone(released);
        Frame::new(id, vec![0u8; 4], 2, 2, 0, PixelFormat::Luma8).with_release(move || {
            released.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_keeps_only_latest() {
        let released = Arc::new(AtomicUsize::new(0));
        let slot = FrameSlot::new();

        slot.push(frame(1, &released));
        slot.push(frame(2, &released));
        slot.push(frame(3, &released));

        assert_eq!(released.load(Ordering::SeqCst), 2);
        let latest = slot.try_take().unwrap();
        assert_eq!(latest.id, 3);
        assert!(slot.try_take().is_none());

        let stats = slot.stats();
        assert_eq!(stats.frames_pushed, 3);
        assert_eq!(stats.frames_replaced, 2);
        assert_eq!(stats.frames_taken, 1);
    }

    #[test]
    fn test_closed_slot_releases_frames() {
        let released = Arc::new(AtomicUsize::new(0));
        let slot = FrameSlot::new();

        slot.push(frame(1, &released));
        slot.close();
        assert_eq!(released.load(Ordering::SeqCst), 1);

        assert!(!slot.push(frame(2, &released)));
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_next_wakes_on_push_and_close() {
        let released = Arc::new(AtomicUsize::new(0));
        let slot = Arc::new(FrameSlot::new());

        let consumer = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move {
                let first = slot.next().await.map(|f| f.id);
                let second = slot.next().await.map(|f| f.id);
                (first, second)
            })
        };

        tokio::task::yield_now().await;
        slot.push(frame(5, &released));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        slot.close();

        let (first, second) = consumer.await.unwrap();
        assert_eq!(first, Some(5));
        assert_eq!(second, None);
    }
}
