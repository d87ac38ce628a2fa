//! Session orchestration: probe, switch, then transfer.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::batch::{batch_receive, batch_send, collect_batch};
use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::config::{ProbeConfig, TransferConfig};
use crate::error::{SessionError, TransferError};
use crate::ids::IdSource;
use crate::paths::{create_safe_path, describe_source, ensure_dir, sanitize_file_name};
use crate::probe;
use crate::progress::ProgressSink;
use crate::receiver::FileReceiver;
use crate::sender::FileSender;
use crate::session::{Session, SessionOffer, TransferMode};
use transport::{FramedConnection, SerialLink, adaptive_read_timeout};

/// What a receiving session produced.
#[derive(Debug)]
pub struct ReceiveOutcome {
    /// The negotiated session.
    pub session: Session,
    /// Files written, in arrival order.
    pub files: Vec<PathBuf>,
}

/// Runs a complete sending session over `link`.
///
/// Describes `source`, probes for the peer at the baseline rate, performs
/// the synchronized switch and then serves the single file or the batch.
#[allow(clippy::too_many_arguments)]
pub fn run_sender<L: SerialLink>(
    link: L,
    source: &Path,
    transfer_cfg: &TransferConfig,
    probe_cfg: &ProbeConfig,
    clock: &dyn Clock,
    ids: &mut dyn IdSource,
    cancel: &CancelToken,
    progress: &mut dyn ProgressSink,
) -> Result<Session, SessionError> {
    let (root_path, is_dir) = describe_source(source).map_err(|err| SessionError::Source {
        path: source.to_path_buf(),
        source: err,
    })?;

    let offer = if is_dir {
        let (names, total_size) = collect_batch(source).map_err(|err| SessionError::Source {
            path: source.to_path_buf(),
            source: err,
        })?;
        SessionOffer {
            mode: TransferMode::Batch,
            file_count: names.len() as u32,
            total_size,
            root_path,
        }
    } else {
        let total_size = std::fs::metadata(source)
            .map_err(|err| SessionError::Source {
                path: source.to_path_buf(),
                source: err,
            })?
            .len();
        SessionOffer {
            mode: TransferMode::Single,
            file_count: 1,
            total_size,
            root_path: String::new(),
        }
    };
    info!(
        source = %source.display(),
        mode = ?offer.mode,
        files = offer.file_count,
        bytes = offer.total_size,
        "sending session starting"
    );

    let mut conn = FramedConnection::new(link);
    let session = probe::run_active(&mut conn, probe_cfg, &offer, clock, ids, cancel)?;
    retune_read_timeout(conn.link_mut(), session.baudrate);

    let file_cfg = transfer_cfg.with_chunk_size(session.chunk_size);
    match offer.mode {
        TransferMode::Single => {
            let mut sender = FileSender::open(source, &file_cfg).map_err(SessionError::Transfer)?;
            sender.serve(&mut conn, clock, ids, cancel, progress)?;
        }
        TransferMode::Batch => {
            batch_send(&mut conn, source, &file_cfg, clock, ids, cancel, progress)?;
        }
    }

    info!(
        session_id = format_args!("{:#010x}", session.id),
        "sending session complete"
    );
    Ok(session)
}

/// Runs a complete receiving session over `link`.
///
/// Listens at the baseline rate, follows the switch, then stores the
/// single file or the batch under `save`.
#[allow(clippy::too_many_arguments)]
pub fn run_receiver<L: SerialLink>(
    link: L,
    save: &Path,
    transfer_cfg: &TransferConfig,
    probe_cfg: &ProbeConfig,
    clock: &dyn Clock,
    ids: &mut dyn IdSource,
    cancel: &CancelToken,
    progress: &mut dyn ProgressSink,
) -> Result<ReceiveOutcome, SessionError> {
    let mut conn = FramedConnection::new(link);
    let session = probe::run_passive(&mut conn, probe_cfg, clock, cancel)?;
    retune_read_timeout(conn.link_mut(), session.baudrate);

    let base = if session.root_path.is_empty() {
        save.to_path_buf()
    } else {
        save.join(sanitize_file_name(&session.root_path))
    };

    let file_cfg = transfer_cfg.with_chunk_size(session.chunk_size);
    let files = match session.mode {
        TransferMode::Single => {
            let dest = single_destination(save, &base, session.id)?;
            info!(dest = %dest.display(), "receiving single file");
            let mut receiver = FileReceiver::new(&file_cfg);
            receiver.receive(&mut conn, &dest, clock, ids, cancel, progress)?;
            vec![dest]
        }
        TransferMode::Batch => {
            ensure_dir(&base).map_err(|err| {
                SessionError::Transfer(TransferError::Path {
                    path: base.clone(),
                    source: err,
                })
            })?;
            batch_receive(&mut conn, &base, &file_cfg, clock, ids, cancel, progress)?
        }
    };

    info!(
        session_id = format_args!("{:#010x}", session.id),
        files = files.len(),
        "receiving session complete"
    );
    Ok(ReceiveOutcome { session, files })
}

/// Picks the destination of a single-file session.
///
/// The wire protocol carries no file name in single mode, so a directory
/// target gets a synthesized, collision-safe name derived from the session
/// id; an explicit file target is used as given.
fn single_destination(save: &Path, base: &Path, session_id: u32) -> Result<PathBuf, SessionError> {
    let save_is_dir = std::fs::metadata(save).map(|m| m.is_dir()).unwrap_or(false);
    if save_is_dir {
        ensure_dir(base).map_err(|err| {
            SessionError::Transfer(TransferError::Path {
                path: base.to_path_buf(),
                source: err,
            })
        })?;
        Ok(create_safe_path(
            base,
            &format!("received_file_{session_id:08x}"),
        ))
    } else {
        Ok(save.to_path_buf())
    }
}

/// Re-applies the adaptive read timeout after a rate switch.
fn retune_read_timeout<L: SerialLink>(link: &mut L, baudrate: u32) {
    let timeout = adaptive_read_timeout(baudrate);
    if let Err(err) = link.set_read_timeout(timeout) {
        warn!(error = %err, "cannot retune read timeout after switch");
    }
}
