//! # Session State Module
//!
//! The session lifecycle sum type, the singleton session record, and the
//! status snapshot published to external observers.
//!
//! ## Lifecycle
//! ```text
//! Idle --configure--> Armed --start--> Recording --stop/timeout-->
//! Finalizing --> Idle
//! ```
//! Any stage failing lands in `Error`; the only way out of `Error` is a
//! fresh `configure()`. Transitions are matched exhaustively so the compiler
//! enforces that every state is handled.

use crate::signal::SignalMask;
use serde::Serialize;

/// Finite lifecycle state of the (singleton) recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Armed,
    Recording,
    Finalizing,
    Error,
}

/// Stable fault codes stored when a session aborts to `Error`.
///
/// Published through an atomic u8 so the writer thread can raise a fault
/// without taking the session lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FaultCode {
    None,
    FileCreate,
    FileWrite,
}

impl FaultCode {
    pub fn as_u8(self) -> u8 {
        match self {
            FaultCode::None => 0,
            FaultCode::FileCreate => 1,
            FaultCode::FileWrite => 2,
        }
    }

    pub fn from_u8(code: u8) -> FaultCode {
        match code {
            1 => FaultCode::FileCreate,
            2 => FaultCode::FileWrite,
            _ => FaultCode::None,
        }
    }
}

/// The singleton session record. Created on start, mutated once a second by
/// the timer thread and on every state transition, reset when finalization
/// completes.
#[derive(Debug, Clone)]
pub struct Session {
    pub state: SessionState,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub duration_s: u16,
    pub elapsed_s: u32,
    pub signal_mask: SignalMask,
    pub samples_written: u64,
    pub fault: FaultCode,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            start_timestamp: 0,
            end_timestamp: 0,
            duration_s: 0,
            elapsed_s: 0,
            signal_mask: SignalMask::EMPTY,
            samples_written: 0,
            fault: FaultCode::None,
        }
    }
}

impl Session {
    pub fn remaining_s(&self) -> u32 {
        u32::from(self.duration_s).saturating_sub(self.elapsed_s)
    }
}

/// Point-in-time view of the session, safe to hand to external consumers.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: SessionState,
    pub active: bool,
    pub elapsed_s: u32,
    pub remaining_s: u32,
    pub total_s: u32,
    pub signal_mask: u8,
    pub samples_written: u64,
    pub fault: FaultCode,
}

impl StatusSnapshot {
    pub fn from_session(session: &Session, active: bool) -> Self {
        Self {
            state: session.state,
            active,
            elapsed_s: session.elapsed_s,
            remaining_s: session.remaining_s(),
            total_s: u32::from(session.duration_s),
            signal_mask: session.signal_mask.bits(),
            samples_written: session.samples_written,
            fault: session.fault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalKind;

    #[test]
    fn test_fault_code_round_trip() {
        for code in [FaultCode::None, FaultCode::FileCreate, FaultCode::FileWrite] {
            assert_eq!(FaultCode::from_u8(code.as_u8()), code);
        }
        assert_eq!(FaultCode::from_u8(200), FaultCode::None);
    }

    #[test]
    fn test_remaining_saturates() {
        let mut session = Session {
            duration_s: 10,
            elapsed_s: 4,
            ..Session::default()
        };
        assert_eq!(session.remaining_s(), 6);
        session.elapsed_s = 12;
        assert_eq!(session.remaining_s(), 0);
    }

    #[test]
    fn test_snapshot_reflects_session() {
        let session = Session {
            state: SessionState::Recording,
            duration_s: 30,
            elapsed_s: 5,
            signal_mask: SignalMask::from_kinds(&[SignalKind::Gsr]),
            samples_written: 160,
            ..Session::default()
        };
        let snap = StatusSnapshot::from_session(&session, true);
        assert_eq!(snap.state, SessionState::Recording);
        assert!(snap.active);
        assert_eq!(snap.remaining_s, 25);
        assert_eq!(snap.signal_mask, SignalKind::Gsr.bit());
    }
}
