//! # vitalrec
//!
//! Background multi-signal recording engine for a wrist-worn health
//! monitor. Ingests heterogeneous physiological sample streams (wrist and
//! finger PPG, IMU accel/gyro, GSR) arriving at different rates, buffers
//! them losslessly under real-time constraints, and persists them to disk
//! as self-describing binary files, one directory per session.
//!
//! ## Architecture
//! - **`signal`**: the five signal kinds, their fixed rate/size tables, and
//!   typed samples with explicit little-endian packing
//! - **`buffer`**: per-signal double buffers with atomic half handoff and a
//!   drop-and-count overflow policy
//! - **`header`**: the bit-exact 32-byte file header, finalized in place
//! - **`writer`**: the background flush/finalize thread
//! - **`engine`**: the session state machine, timer/status publisher, and
//!   ingest API
//! - **`store`**: session directory enumeration, deletion, and indexing
//!
//! The BLE command layer, display, and sensor drivers are external
//! collaborators: commands call into [`RecordingEngine`]'s control API,
//! sampling threads call its per-signal submit functions, and status and
//! index records flow back out over a bounded event channel.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod header;
pub mod session;
pub mod signal;
pub mod store;
pub mod writer;

pub use config::{RecordingConfig, Settings};
pub use engine::{EngineEvent, RecordingEngine};
pub use session::{FaultCode, SessionState, StatusSnapshot};
pub use signal::{
    GsrSample, ImuSample, PpgFingerSample, PpgWristSample, SignalKind, SignalMask,
};
pub use store::SessionIndexRecord;
