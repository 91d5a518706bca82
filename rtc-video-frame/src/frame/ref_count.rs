//! Explicit reference counting for frame buffers
//!
//! Frame buffers are not freed when the last Rust handle is dropped but when
//! the last *owner* calls `release()`. The counter is atomic so a buffer
//! produced on a capture thread can be released from the render thread.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{FrameError, Result};

/// Callback run once when a buffer's count reaches zero
pub type ReleaseCallback = Box<dyn FnOnce() + Send + 'static>;

/// Atomic reference count with a run-once release action.
///
/// Starts at one. The release callback runs on the call that moves the
/// count from one to zero, and never again.
pub struct RefCount {
    count: AtomicUsize,
    on_release: Mutex<Option<ReleaseCallback>>,
    released: AtomicBool,
}

impl RefCount {
    /// Create a counter owned by one holder
    pub fn new(on_release: Option<ReleaseCallback>) -> Self {
        Self {
            count: AtomicUsize::new(1),
            on_release: Mutex::new(on_release),
            released: AtomicBool::new(false),
        }
    }

    /// Add an owner. Fails once the count has reached zero.
    pub fn retain(&self) -> Result<()> {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(FrameError::DisposedBuffer);
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop an owner.
    ///
    /// Returns `true` when this call released the last owner; the release
    /// callback has run by the time it returns.
    pub fn release(&self) -> Result<bool> {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(FrameError::DisposedBuffer);
            }
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        if current != 1 {
            return Ok(false);
        }

        let already_released = self.released.swap(true, Ordering::AcqRel);
        debug_assert!(!already_released, "release callback would run twice");

        if let Some(callback) = self.on_release.lock().take() {
            callback();
        }
        Ok(true)
    }

    /// Fail with `DisposedBuffer` if the count already reached zero
    pub fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(FrameError::DisposedBuffer)
        }
    }

    pub fn is_alive(&self) -> bool {
        self.count.load(Ordering::Acquire) > 0
    }

    /// Current number of owners (racy; for diagnostics and tests)
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for RefCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefCount")
            .field("count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn counting_ref_count() -> (RefCount, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let rc = RefCount::new(Some(Box::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        })));
        (rc, calls)
    }

    #[test]
    fn test_single_owner_release() {
        let (rc, calls) = counting_ref_count();
        assert_eq!(rc.count(), 1);
        assert!(rc.release().unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!rc.is_alive());
    }

    #[test]
    fn test_use_after_zero_is_an_error() {
        let (rc, calls) = counting_ref_count();
        rc.release().unwrap();
        assert!(matches!(rc.retain(), Err(FrameError::DisposedBuffer)));
        assert!(matches!(rc.release(), Err(FrameError::DisposedBuffer)));
        assert!(matches!(rc.ensure_alive(), Err(FrameError::DisposedBuffer)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_random_sequences_release_exactly_once_at_zero() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let (rc, calls) = counting_ref_count();
            let mut owners = 1usize;
            while owners > 0 {
                if rng.random_bool(0.45) {
                    rc.retain().unwrap();
                    owners += 1;
                } else {
                    let hit_zero = rc.release().unwrap();
                    owners -= 1;
                    assert_eq!(hit_zero, owners == 0);
                    let expected = if owners == 0 { 1 } else { 0 };
                    assert_eq!(calls.load(Ordering::SeqCst), expected);
                }
            }
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_concurrent_retain_release() {
        let (rc, calls) = counting_ref_count();
        let rc = Arc::new(rc);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let rc = Arc::clone(&rc);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        rc.retain().unwrap();
                        rc.release().unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(rc.count(), 1);
        assert!(rc.release().unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
