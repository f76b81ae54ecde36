//! # Signal Buffer Module
//!
//! Per-signal double buffer sitting between the sampling producers and the
//! file writer thread. Each signal gets two fixed-capacity byte halves: the
//! producer appends into the active half, and a filled half is handed to the
//! writer as a unit.
//!
//! ## Ownership Protocol
//! - At most one half is active (producer-owned) and at most one half is
//!   pending flush (writer-owned) at any time.
//! - The writer never touches the active half; the producer never touches a
//!   half whose index is published in `pending`.
//! - Half selection and the pending marker are atomics because they sit on
//!   the hot producer path; the half contents live behind mutexes that are
//!   only ever locked by the half's current owner, so those locks never
//!   contend.
//!
//! ## Overflow Policy
//! A producer is never grown, blocked, or failed. If it fills a half while
//! the other half is still pending (writer behind), the remainder of the
//! batch is dropped and counted. Overflow drops data for the offending
//! signal only; the session keeps recording for every signal.

use std::sync::atomic::{AtomicIsize, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::signal::SignalKind;

/// No half is pending flush.
const PENDING_NONE: isize = -1;

/// Outcome of one `push_samples` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushResult {
    /// Samples appended to a half
    pub stored: u64,
    /// Samples dropped because the writer was behind
    pub dropped: u64,
    /// Half index that filled up and needs a flush request
    pub flush: Option<usize>,
}

/// Double buffer for one signal kind.
pub struct SignalBuffer {
    halves: [Mutex<Vec<u8>>; 2],
    capacity: usize,
    /// Index of the half the producer appends into (0 or 1)
    active: AtomicUsize,
    /// Index of the half awaiting flush, or `PENDING_NONE`
    pending: AtomicIsize,
    /// Samples accepted into a half since the last reset
    submitted: AtomicU64,
    /// Samples dropped on overflow since the last reset
    dropped: AtomicU64,
}

impl SignalBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            halves: [
                Mutex::new(Vec::with_capacity(capacity)),
                Mutex::new(Vec::with_capacity(capacity)),
            ],
            capacity,
            active: AtomicUsize::new(0),
            pending: AtomicIsize::new(PENDING_NONE),
            submitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    /// Appends whole samples to the active half. Producer-side, single
    /// caller per signal, never blocks on the writer.
    ///
    /// When a sample no longer fits, the active half is published as pending,
    /// the selector flips, and the caller is told to raise a flush request.
    /// If the other half is still pending the remaining samples are dropped
    /// and counted.
    pub fn push_samples(&self, sample_size: usize, payload: &[u8]) -> PushResult {
        debug_assert!(sample_size > 0 && payload.len() % sample_size == 0);

        let mut result = PushResult {
            stored: 0,
            dropped: 0,
            flush: None,
        };
        let mut active = self.active.load(Ordering::Acquire);
        let mut half: MutexGuard<'_, Vec<u8>> = match self.halves[active].lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut chunks = payload.chunks_exact(sample_size);
        while let Some(chunk) = chunks.next() {
            if half.len() + sample_size > self.capacity {
                if self.pending.load(Ordering::Acquire) != PENDING_NONE {
                    // Writer hasn't drained the other half: overflow.
                    result.dropped = 1 + chunks.count() as u64;
                    break;
                }
                // Hand the full half to the writer and flip.
                self.pending.store(active as isize, Ordering::Release);
                result.flush = Some(active);
                drop(half);
                active ^= 1;
                self.active.store(active, Ordering::Release);
                half = match self.halves[active].lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
            half.extend_from_slice(chunk);
            result.stored += 1;
        }
        drop(half);

        self.submitted.fetch_add(result.stored, Ordering::AcqRel);
        if result.dropped > 0 {
            self.dropped.fetch_add(result.dropped, Ordering::AcqRel);
        }
        result
    }

    /// Takes the pending half's contents, if any. Writer-side.
    ///
    /// The pending marker is released only after the half is emptied, so the
    /// producer cannot flip into a half that still holds data.
    pub fn take_pending(&self) -> Option<(usize, Vec<u8>)> {
        let idx = self.pending.load(Ordering::Acquire);
        if idx == PENDING_NONE {
            return None;
        }
        let idx = idx as usize;
        let mut half = match self.halves[idx].lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let data = std::mem::replace(&mut *half, Vec::with_capacity(self.capacity));
        drop(half);
        self.pending.store(PENDING_NONE, Ordering::Release);
        Some((idx, data))
    }

    /// Takes whatever remains in the active half. Finalize-only: callers
    /// must have already made producers inactive.
    pub fn drain_active(&self) -> Vec<u8> {
        let idx = self.active.load(Ordering::Acquire);
        let mut half = match self.halves[idx].lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *half, Vec::with_capacity(self.capacity))
    }

    /// Clears both halves and all markers for a new session.
    pub fn reset(&self) {
        for half in &self.halves {
            match half.lock() {
                Ok(mut g) => g.clear(),
                Err(poisoned) => poisoned.into_inner().clear(),
            }
        }
        self.pending.store(PENDING_NONE, Ordering::Release);
        self.active.store(0, Ordering::Release);
        self.submitted.store(0, Ordering::Release);
        self.dropped.store(0, Ordering::Release);
    }
}

/// One `SignalBuffer` per signal kind, indexed by `SignalKind`.
pub struct BufferSet {
    buffers: [SignalBuffer; SignalKind::COUNT],
}

impl BufferSet {
    pub fn new(half_capacity: usize) -> Self {
        Self {
            buffers: std::array::from_fn(|_| SignalBuffer::new(half_capacity)),
        }
    }

    pub fn get(&self, kind: SignalKind) -> &SignalBuffer {
        &self.buffers[kind.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity_stores_all() {
        let buf = SignalBuffer::new(64);
        let payload = vec![0xAB; 16]; // 4 samples of 4 bytes
        let result = buf.push_samples(4, &payload);

        assert_eq!(result.stored, 4);
        assert_eq!(result.dropped, 0);
        assert_eq!(result.flush, None);
        assert_eq!(buf.submitted(), 4);
        assert_eq!(buf.dropped(), 0);
    }

    #[test]
    fn test_fill_flips_and_requests_flush() {
        let buf = SignalBuffer::new(8);
        // 3 samples of 4 bytes: third one no longer fits in half 0
        let payload = vec![1u8; 12];
        let result = buf.push_samples(4, &payload);

        assert_eq!(result.stored, 3);
        assert_eq!(result.flush, Some(0));
        assert_eq!(result.dropped, 0);

        let (idx, data) = buf.take_pending().expect("half 0 should be pending");
        assert_eq!(idx, 0);
        assert_eq!(data.len(), 8);
        // Remaining sample landed in half 1
        assert_eq!(buf.drain_active().len(), 4);
    }

    #[test]
    fn test_overflow_drops_and_counts_when_writer_behind() {
        let buf = SignalBuffer::new(8);
        // Fill half 0 and flip into half 1
        assert_eq!(buf.push_samples(4, &vec![1u8; 12]).flush, Some(0));
        // Writer never drains. Fill half 1 too; the flip target is still
        // pending, so the overflowing samples are dropped.
        let result = buf.push_samples(4, &vec![2u8; 12]);

        assert_eq!(result.stored, 1); // one sample still fit in half 1
        assert_eq!(result.dropped, 2);
        assert_eq!(result.flush, None);
        assert_eq!(buf.dropped(), 2);
        // submitted counts only what was accepted
        assert_eq!(buf.submitted(), 4);
    }

    #[test]
    fn test_take_pending_is_noop_when_nothing_pending() {
        let buf = SignalBuffer::new(32);
        assert!(buf.take_pending().is_none());
        buf.push_samples(4, &[0u8; 8]);
        assert!(buf.take_pending().is_none());
    }

    #[test]
    fn test_flip_resumes_after_writer_drains() {
        let buf = SignalBuffer::new(8);
        assert_eq!(buf.push_samples(4, &vec![1u8; 8]).flush, None);
        // Ninth byte would exceed: flip on next push
        let result = buf.push_samples(4, &vec![2u8; 4]);
        assert_eq!(result.flush, Some(0));
        buf.take_pending().unwrap();

        // Half 0 drained; filling half 1 flips back without loss
        let result = buf.push_samples(4, &vec![3u8; 8]);
        assert_eq!(result.flush, Some(1));
        assert_eq!(result.dropped, 0);
        assert_eq!(buf.submitted(), 5);
    }

    #[test]
    fn test_reset_clears_state() {
        let buf = SignalBuffer::new(8);
        buf.push_samples(4, &vec![1u8; 12]);
        buf.reset();

        assert_eq!(buf.submitted(), 0);
        assert_eq!(buf.dropped(), 0);
        assert!(buf.take_pending().is_none());
        assert!(buf.drain_active().is_empty());
    }

    #[test]
    fn test_round_trip_no_loss_without_overflow() {
        let buf = SignalBuffer::new(40);
        let mut written = 0u64;
        let mut flushed_bytes = 0usize;

        for i in 0..50u8 {
            let result = buf.push_samples(4, &[i; 8]); // 2 samples per push
            written += result.stored;
            assert_eq!(result.dropped, 0);
            if result.flush.is_some() {
                let (_, data) = buf.take_pending().unwrap();
                flushed_bytes += data.len();
            }
        }
        flushed_bytes += buf.drain_active().len();

        assert_eq!(written, 100);
        assert_eq!(flushed_bytes, 400);
        assert_eq!(buf.submitted(), 100);
    }
}
