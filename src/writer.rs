//! # File Writer Module
//!
//! Background thread that drains filled buffer halves to the per-signal
//! files of the active session. Runs at a lower priority than the sampling
//! producers: it only ever consumes halves the producers have already
//! published as pending, so it can fall behind without blocking anyone.
//!
//! ## Command Protocol
//! - `Begin`: receives the files the session controller opened (headers
//!   already written) and resets the per-signal running sample counts.
//! - `Flush`: counting signal raised by a producer when a half fills. On
//!   wake the writer drains every pending half across every open signal, so
//!   a spurious wake with nothing pending is a no-op.
//! - `Finalize`: drains remaining pending halves, writes each signal's
//!   partial active-half remainder with its actual byte count, seeks back to
//!   each header's `num_samples` field and rewrites the true count, syncs
//!   and closes every file, then replies with the per-signal totals.
//! - `Shutdown`: exits the loop (engine teardown only).
//!
//! Mid-session write failures are absorbed: the fault cell is raised for the
//! timer thread to observe and the loop keeps running. The writer thread
//! never terminates on its own.

use crossbeam_channel::{Receiver, Sender};
use std::fs::File;
use std::io;
use std::io::{Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use crate::buffer::BufferSet;
use crate::error::StorageError;
use crate::header::NUM_SAMPLES_OFFSET;
use crate::session::FaultCode;
use crate::signal::SignalKind;

/// Commands consumed by the writer thread.
pub enum WriterCommand {
    /// Adopt the freshly opened files of a starting session
    Begin { files: Vec<(SignalKind, File)> },
    /// At least one buffer half is pending; drain everything pending
    Flush,
    /// Finish the session: final partial writes, header rewrites, close
    Finalize {
        reply: Sender<Result<FinalizeReport, StorageError>>,
    },
    /// Exit the writer loop
    Shutdown,
}

/// Per-signal totals reported back after a successful finalize.
#[derive(Debug, Clone)]
pub struct FinalizeReport {
    pub per_signal: Vec<(SignalKind, u32)>,
}

impl FinalizeReport {
    pub fn total_samples(&self) -> u64 {
        self.per_signal.iter().map(|(_, n)| u64::from(*n)).sum()
    }

    pub fn samples_for(&self, kind: SignalKind) -> Option<u32> {
        self.per_signal
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
    }
}

/// One open per-signal file plus its running sample count.
///
/// Only the writer thread ever touches these, so no synchronization.
struct OpenSignalFile {
    kind: SignalKind,
    file: File,
    samples_written: u32,
}

impl OpenSignalFile {
    /// Appends one drained half (full or, at finalize, partial) and advances
    /// the sample count by the actual bytes written.
    fn write_block(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.samples_written += (data.len() / self.kind.sample_size()) as u32;
        Ok(())
    }
}

/// Spawns the writer thread. `fault` is raised (never lowered) by the writer
/// on mid-session write failures; the timer thread reacts to it.
pub fn spawn(
    command_rx: Receiver<WriterCommand>,
    buffers: Arc<BufferSet>,
    fault: Arc<AtomicU8>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || writer_loop(command_rx, buffers, fault))
}

fn writer_loop(command_rx: Receiver<WriterCommand>, buffers: Arc<BufferSet>, fault: Arc<AtomicU8>) {
    let mut open: Vec<OpenSignalFile> = Vec::new();

    loop {
        match command_rx.recv() {
            Ok(WriterCommand::Begin { files }) => {
                open = files
                    .into_iter()
                    .map(|(kind, file)| OpenSignalFile {
                        kind,
                        file,
                        samples_written: 0,
                    })
                    .collect();
                log::debug!("Writer: session began with {} signal files", open.len());
            }
            Ok(WriterCommand::Flush) => {
                drain_pending(&mut open, &buffers, &fault);
            }
            Ok(WriterCommand::Finalize { reply }) => {
                let result = finalize(&mut open, &buffers);
                // Dropping the files closes them, success or not
                open.clear();
                let _ = reply.send(result);
            }
            Ok(WriterCommand::Shutdown) | Err(_) => {
                log::info!("Writer thread stopped");
                break;
            }
        }
    }
}

/// Drains every pending half across all open signals. A wake with nothing
/// pending is a no-op; the flush command is a counting signal, not per-signal.
fn drain_pending(open: &mut [OpenSignalFile], buffers: &BufferSet, fault: &AtomicU8) {
    for entry in open.iter_mut() {
        while let Some((half, data)) = buffers.get(entry.kind).take_pending() {
            log::trace!(
                "Writer: flushing {:?} half {} ({} bytes)",
                entry.kind,
                half,
                data.len()
            );
            if let Err(e) = entry.write_block(&data) {
                log::error!("Writer: failed to write {:?} data: {}", entry.kind, e);
                fault.store(FaultCode::FileWrite.as_u8(), Ordering::Release);
            }
        }
    }
}

/// Session-end sequence: remaining pending halves, the one partial write per
/// signal, then the seek-and-rewrite of each header's `num_samples`.
fn finalize(
    open: &mut [OpenSignalFile],
    buffers: &BufferSet,
) -> Result<FinalizeReport, StorageError> {
    for entry in open.iter_mut() {
        let buffer = buffers.get(entry.kind);
        while let Some((_, data)) = buffer.take_pending() {
            entry.write_block(&data).map_err(StorageError::FileWrite)?;
        }
        // Producers are already inactive; whatever remains in the active
        // half is the final, possibly partial, block.
        let remainder = buffer.drain_active();
        if !remainder.is_empty() {
            entry
                .write_block(&remainder)
                .map_err(StorageError::FileWrite)?;
        }

        entry
            .file
            .seek(SeekFrom::Start(NUM_SAMPLES_OFFSET))
            .map_err(StorageError::HeaderRewrite)?;
        entry
            .file
            .write_all(&entry.samples_written.to_le_bytes())
            .map_err(StorageError::HeaderRewrite)?;
        entry.file.sync_all().map_err(StorageError::FileWrite)?;

        log::debug!(
            "Writer: finalized {:?} with {} samples",
            entry.kind,
            entry.samples_written
        );
    }

    Ok(FinalizeReport {
        per_signal: open
            .iter()
            .map(|e| (e.kind, e.samples_written))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{FileHeader, HEADER_LEN};
    use crossbeam_channel::{bounded, unbounded};
    use std::io::Read;
    use tempfile::tempdir;

    fn open_with_header(dir: &std::path::Path, kind: SignalKind) -> File {
        let mut file = File::create(dir.join(kind.file_name())).unwrap();
        file.write_all(&FileHeader::new(kind, 1_700_000_000).encode())
            .unwrap();
        file
    }

    fn read_back(dir: &std::path::Path, kind: SignalKind) -> (FileHeader, Vec<u8>) {
        let mut bytes = Vec::new();
        File::open(dir.join(kind.file_name()))
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);
        (
            FileHeader::decode(&header).unwrap(),
            bytes[HEADER_LEN..].to_vec(),
        )
    }

    #[test]
    fn test_flush_then_finalize_counts_samples() {
        let dir = tempdir().unwrap();
        let buffers = Arc::new(BufferSet::new(16));
        let fault = Arc::new(AtomicU8::new(0));
        let (tx, rx) = unbounded();
        let handle = spawn(rx, buffers.clone(), fault.clone());

        let file = open_with_header(dir.path(), SignalKind::Gsr);
        tx.send(WriterCommand::Begin {
            files: vec![(SignalKind::Gsr, file)],
        })
        .unwrap();

        // 6 GSR samples of 4 bytes: half (16 bytes / 4 samples) fills once
        let gsr = buffers.get(SignalKind::Gsr);
        let result = gsr.push_samples(4, &[7u8; 24]);
        assert!(result.flush.is_some());
        tx.send(WriterCommand::Flush).unwrap();

        let (reply_tx, reply_rx) = bounded(1);
        tx.send(WriterCommand::Finalize { reply: reply_tx }).unwrap();
        let report = reply_rx.recv().unwrap().unwrap();
        assert_eq!(report.samples_for(SignalKind::Gsr), Some(6));
        assert_eq!(report.total_samples(), 6);

        let (header, payload) = read_back(dir.path(), SignalKind::Gsr);
        assert_eq!(header.num_samples, 6);
        assert!(!header.is_placeholder());
        assert_eq!(payload.len(), 24);

        tx.send(WriterCommand::Shutdown).unwrap();
        handle.join().unwrap();
        assert_eq!(fault.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_spurious_flush_is_noop() {
        let dir = tempdir().unwrap();
        let buffers = Arc::new(BufferSet::new(64));
        let fault = Arc::new(AtomicU8::new(0));
        let (tx, rx) = unbounded();
        let handle = spawn(rx, buffers.clone(), fault);

        let file = open_with_header(dir.path(), SignalKind::ImuAccel);
        tx.send(WriterCommand::Begin {
            files: vec![(SignalKind::ImuAccel, file)],
        })
        .unwrap();

        // Nothing pending: the wake must not write or count anything
        tx.send(WriterCommand::Flush).unwrap();
        tx.send(WriterCommand::Flush).unwrap();

        let (reply_tx, reply_rx) = bounded(1);
        tx.send(WriterCommand::Finalize { reply: reply_tx }).unwrap();
        let report = reply_rx.recv().unwrap().unwrap();
        assert_eq!(report.samples_for(SignalKind::ImuAccel), Some(0));

        let (header, payload) = read_back(dir.path(), SignalKind::ImuAccel);
        assert!(header.is_placeholder());
        assert!(payload.is_empty());

        drop(tx);
        handle.join().unwrap();
    }

    #[test]
    fn test_final_partial_write_uses_actual_length() {
        let dir = tempdir().unwrap();
        let buffers = Arc::new(BufferSet::new(64));
        let fault = Arc::new(AtomicU8::new(0));
        let (tx, rx) = unbounded();
        let handle = spawn(rx, buffers.clone(), fault);

        let file = open_with_header(dir.path(), SignalKind::PpgWrist);
        tx.send(WriterCommand::Begin {
            files: vec![(SignalKind::PpgWrist, file)],
        })
        .unwrap();

        // 3 wrist PPG samples of 12 bytes: nowhere near the 64-byte half, so
        // everything rides the final partial flush
        buffers
            .get(SignalKind::PpgWrist)
            .push_samples(12, &[1u8; 36]);

        let (reply_tx, reply_rx) = bounded(1);
        tx.send(WriterCommand::Finalize { reply: reply_tx }).unwrap();
        let report = reply_rx.recv().unwrap().unwrap();
        assert_eq!(report.samples_for(SignalKind::PpgWrist), Some(3));

        let (header, payload) = read_back(dir.path(), SignalKind::PpgWrist);
        assert_eq!(header.num_samples, 3);
        assert_eq!(payload.len(), 36);

        drop(tx);
        handle.join().unwrap();
    }
}
