//! Bounded capture → render handoff
//!
//! The capture side must never block on a slow renderer: when the queue is
//! full the newest frame is released and counted as dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

use super::VideoFrame;
use crate::error::Result;

/// Create a handoff queue holding at most `capacity` frames (minimum 1)
pub fn frame_handoff(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        FrameSender {
            sender,
            dropped: dropped.clone(),
        },
        FrameReceiver { receiver, dropped },
    )
}

/// Producer half, owned by the capture thread
pub struct FrameSender {
    sender: Sender<VideoFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    /// Queue `frame` for the renderer.
    ///
    /// The queue takes its own reference; the caller keeps theirs. Returns
    /// `false` if the frame was dropped because the queue is full or the
    /// receiver is gone.
    pub fn send(&self, frame: &VideoFrame) -> Result<bool> {
        frame.retain()?;
        match self.sender.try_send(frame.clone()) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(frame)) => {
                frame.release()?;
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    "Render queue full, dropped frame at {} ns ({} dropped so far)",
                    frame.timestamp_ns(),
                    dropped
                );
                Ok(false)
            }
            Err(TrySendError::Disconnected(frame)) => {
                frame.release()?;
                tracing::debug!("Render queue closed, frame at {} ns discarded", frame.timestamp_ns());
                Ok(false)
            }
        }
    }

    /// Frames dropped because the queue was full
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half, owned by the render thread.
///
/// Every received frame carries one reference that the consumer must release.
/// Frames still queued when the receiver is dropped are released.
pub struct FrameReceiver {
    receiver: Receiver<VideoFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameReceiver {
    /// Block until a frame arrives; `None` once the sender is gone and the
    /// queue is drained
    pub fn recv(&self) -> Option<VideoFrame> {
        self.receiver.recv().ok()
    }

    pub fn try_recv(&self) -> Option<VideoFrame> {
        match self.receiver.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take only the most recent queued frame, releasing any older ones
    pub fn latest(&self) -> Result<Option<VideoFrame>> {
        let mut latest: Option<VideoFrame> = None;
        while let Ok(frame) = self.receiver.try_recv() {
            if let Some(stale) = latest.replace(frame) {
                stale.release()?;
            }
        }
        Ok(latest)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        while let Ok(frame) = self.receiver.try_recv() {
            if let Err(err) = frame.release() {
                tracing::warn!("Failed to release queued frame: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{I420Buffer, Rotation};

    fn frame(ts: i64) -> VideoFrame {
        VideoFrame::new(I420Buffer::black(4, 4).unwrap(), Rotation::Deg0, ts)
    }

    #[test]
    fn test_send_retains_and_receiver_gets_reference() {
        let (tx, rx) = frame_handoff(2);
        let f = frame(1);
        assert!(tx.send(&f).unwrap());
        assert_eq!(f.buffer().ref_count(), 2);

        let received = rx.try_recv().unwrap();
        assert_eq!(received.timestamp_ns(), 1);
        received.release().unwrap();
        assert!(f.release().unwrap());
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let (tx, rx) = frame_handoff(1);
        let first = frame(1);
        let second = frame(2);
        assert!(tx.send(&first).unwrap());
        assert!(!tx.send(&second).unwrap());
        assert_eq!(tx.dropped_frames(), 1);
        assert_eq!(rx.dropped_frames(), 1);
        // The dropped frame's queue reference was released; only ours remains.
        assert_eq!(second.buffer().ref_count(), 1);

        let got = rx.recv().unwrap();
        assert_eq!(got.timestamp_ns(), 1);
        got.release().unwrap();
    }

    #[test]
    fn test_latest_releases_stale_frames() {
        let (tx, rx) = frame_handoff(3);
        let frames: Vec<_> = (0..3).map(frame).collect();
        for f in &frames {
            tx.send(f).unwrap();
        }
        let latest = rx.latest().unwrap().unwrap();
        assert_eq!(latest.timestamp_ns(), 2);
        assert_eq!(frames[0].buffer().ref_count(), 1);
        assert_eq!(frames[1].buffer().ref_count(), 1);
        assert_eq!(frames[2].buffer().ref_count(), 2);
        latest.release().unwrap();
    }

    #[test]
    fn test_dropping_receiver_releases_queued_frames() {
        let (tx, rx) = frame_handoff(2);
        let f = frame(7);
        tx.send(&f).unwrap();
        drop(rx);
        assert_eq!(f.buffer().ref_count(), 1);
        assert!(!tx.send(&f).unwrap());
        assert_eq!(f.buffer().ref_count(), 1);
    }

    #[test]
    fn test_cross_thread_handoff() {
        let (tx, rx) = frame_handoff(4);
        let producer = std::thread::spawn(move || {
            for ts in 0..50 {
                let f = frame(ts);
                tx.send(&f).unwrap();
                f.release().unwrap();
            }
        });

        let mut received = 0;
        while let Some(f) = rx.recv() {
            assert!(f.release().unwrap());
            received += 1;
        }
        producer.join().unwrap();
        assert_eq!(received as u64 + rx.dropped_frames(), 50);
    }
}
