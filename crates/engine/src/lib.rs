#![deny(unsafe_code)]

//! # Overview
//!
//! `engine` drives the protocol. The probe module runs the
//! discovery / capability / rate-switch handshake in both roles; the sender
//! and receiver modules move one file with stop-and-wait acknowledgements,
//! retries and adaptive chunk sizing; the batch modules wrap a per-file name
//! handshake around them; and the orchestrator strings the phases together
//! into one session.
//!
//! # Design
//!
//! All protocol logic is single-threaded and synchronous. The only
//! suspension points are port reads and writes, backoff sleeps and disk
//! I/O. Collaborators that would make tests nondeterministic sit behind
//! narrow seams: [`Clock`] for sleeps, [`IdSource`] for identifiers and
//! jitter, [`ProgressSink`] for byte accounting and [`CancelToken`] for
//! interrupt handling. Receive deadlines bound real port I/O and run on
//! monotonic wall time.
//!
//! # Errors
//!
//! Probe failures surface as [`ProbeError`], transfer failures as
//! [`TransferError`]; the orchestrator folds both into [`SessionError`].
//! Every fatal path logs one structured event naming the phase and the
//! session it belonged to.

pub mod batch;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod orchestrator;
pub mod paths;
pub mod probe;
pub mod progress;
pub mod receiver;
pub mod retry;
pub mod sender;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cancel::CancelToken;
pub use clock::{Clock, SystemClock};
pub use config::{ProbeConfig, TransferConfig};
pub use error::{ProbeError, SessionError, TransferError};
pub use ids::{IdSource, SystemIds};
pub use orchestrator::{ReceiveOutcome, run_receiver, run_sender};
pub use progress::{NullProgress, ProgressSink, SpeedMeter};
pub use session::{Session, SessionOffer, TransferMode};
