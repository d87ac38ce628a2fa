//! Directory transfer: a per-file name handshake around the single-file
//! engines, terminated by an empty name.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use protocol::TransferCommand;
use protocol::transfer::{self, MAX_FILE_NAME_LEN};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::ids::IdSource;
use crate::paths::create_safe_path;
use crate::progress::ProgressSink;
use crate::receiver::FileReceiver;
use crate::retry::retry_call;
use crate::sender::FileSender;
use transport::{FramedConnection, SerialLink};

/// Granularity of receive waits between cancellation checks.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Enumerates the files a directory transfer will carry.
///
/// Top-level regular files only, sorted by name so both the declared count
/// and the transfer order are deterministic.
pub fn collect_batch(dir: &Path) -> io::Result<(Vec<String>, u64)> {
    let mut names = Vec::new();
    let mut total = 0u64;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
        total += metadata.len();
    }
    names.sort_unstable();
    Ok((names, total))
}

/// Sends every top-level file of `dir`, then the end-of-batch terminator.
///
/// A failure that is not session-fatal skips that file: both peers fall
/// back into step at the next name handshake.
pub fn batch_send<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    dir: &Path,
    config: &TransferConfig,
    clock: &dyn Clock,
    ids: &mut dyn IdSource,
    cancel: &CancelToken,
    progress: &mut dyn ProgressSink,
) -> Result<u32, TransferError> {
    let (names, total) = collect_batch(dir).map_err(|source| TransferError::Path {
        path: dir.to_path_buf(),
        source,
    })?;
    info!(files = names.len(), bytes = total, "starting batch send");

    let mut sent = 0u32;
    for name in &names {
        wait_for_name_request(conn, config.request_timeout, cancel)?;
        let wire_name = truncate_wire_name(name);
        conn.send(TransferCommand::ReplyFileName, &transfer::encode_file_name(&wire_name))?;
        info!(file = %wire_name, "file announced");

        let path = dir.join(name);
        let mut sender = match FileSender::open(&path, config) {
            Ok(sender) => sender,
            Err(err) if err.is_session_fatal() => return Err(err),
            Err(err) => {
                warn!(file = %name, error = %err, "cannot open file, skipping");
                continue;
            }
        };
        match sender.serve(conn, clock, ids, cancel, progress) {
            Ok(()) => sent += 1,
            Err(err) if err.is_session_fatal() => return Err(err),
            Err(err) => warn!(file = %name, error = %err, "file failed, continuing batch"),
        }
    }

    wait_for_name_request(conn, config.request_timeout, cancel)?;
    conn.send(TransferCommand::ReplyFileName, &transfer::encode_file_name(""))?;
    info!(files = sent, "batch send complete");
    Ok(sent)
}

/// Receives files until the empty-name terminator, returning what was
/// written.
pub fn batch_receive<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    base: &Path,
    config: &TransferConfig,
    clock: &dyn Clock,
    ids: &mut dyn IdSource,
    cancel: &CancelToken,
    progress: &mut dyn ProgressSink,
) -> Result<Vec<PathBuf>, TransferError> {
    info!(base = %base.display(), "starting batch receive");
    let mut written = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let name = request_name(conn, config, clock, ids, cancel)?;
        if name.is_empty() {
            info!(files = written.len(), "batch receive complete");
            return Ok(written);
        }

        let dest = create_safe_path(base, &name);
        info!(file = %name, dest = %dest.display(), "file announced");

        let mut receiver = FileReceiver::new(config);
        match receiver.receive(conn, &dest, clock, ids, cancel, progress) {
            Ok(_) => written.push(dest),
            Err(err) if err.is_session_fatal() => return Err(err),
            Err(err) => warn!(file = %name, error = %err, "file failed, continuing batch"),
        }
    }
}

/// Blocks until the peer asks for the next file name.
fn wait_for_name_request<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<(), TransferError> {
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            error!(phase = "name", "peer never asked for a file name");
            return Err(TransferError::Timeout {
                phase: "name request",
            });
        }

        let Some(frame) = conn.recv((deadline - now).min(POLL_SLICE))? else {
            continue;
        };
        match TransferCommand::from_byte(frame.command) {
            Some(TransferCommand::RequestFileName) => {
                if !transfer::is_request_marker(&frame.payload) {
                    debug!("name request without the usual marker accepted anyway");
                }
                return Ok(());
            }
            other => debug!(command = ?other, "frame before name request ignored"),
        }
    }
}

/// Pulls the next file name with retry and backoff.
fn request_name<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    config: &TransferConfig,
    clock: &dyn Clock,
    ids: &mut dyn IdSource,
    cancel: &CancelToken,
) -> Result<String, TransferError> {
    let response_timeout = config.response_timeout;
    let outcome = retry_call(
        clock,
        ids,
        config.max_retries,
        config.backoff_base,
        || request_name_once(conn, response_timeout, cancel),
    );

    match outcome {
        Some(Ok(name)) => Ok(name),
        Some(Err(err)) => Err(err),
        None => {
            error!(phase = "name", "no file name from peer");
            Err(TransferError::Timeout { phase: "name reply" })
        }
    }
}

fn request_name_once<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    response_timeout: Duration,
    cancel: &CancelToken,
) -> Option<Result<String, TransferError>> {
    if let Err(err) = conn.send(
        TransferCommand::RequestFileName,
        &transfer::encode_request_marker(),
    ) {
        return Some(Err(err.into()));
    }

    let deadline = Instant::now() + response_timeout;
    loop {
        if cancel.is_cancelled() {
            return Some(Err(TransferError::Cancelled));
        }
        let now = Instant::now();
        if now >= deadline {
            debug!("no file name before timeout");
            return None;
        }

        let frame = match conn.recv((deadline - now).min(POLL_SLICE)) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(err) => return Some(Err(err.into())),
        };

        match TransferCommand::from_byte(frame.command) {
            Some(TransferCommand::ReplyFileName) => {
                match transfer::decode_file_name(&frame.payload) {
                    Ok(name) => return Some(Ok(name)),
                    Err(err) => warn!(error = %err, "malformed file name ignored"),
                }
            }
            other => debug!(command = ?other, "frame while awaiting file name ignored"),
        }
    }
}

/// Clips a name to the wire limit on a char boundary.
fn truncate_wire_name(name: &str) -> String {
    if name.len() <= MAX_FILE_NAME_LEN {
        return name.to_owned();
    }
    let mut end = MAX_FILE_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    warn!(name = %name, kept = end, "file name exceeds the wire limit, truncating");
    name[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_batch_is_sorted_and_files_only() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("b.txt"), b"bb").expect("write");
        std::fs::write(tmp.path().join("a.txt"), b"a").expect("write");
        std::fs::create_dir(tmp.path().join("subdir")).expect("mkdir");
        std::fs::write(tmp.path().join("subdir").join("nested.txt"), b"xyz").expect("write");

        let (names, total) = collect_batch(tmp.path()).expect("collect");
        assert_eq!(names, vec!["a.txt".to_owned(), "b.txt".to_owned()]);
        assert_eq!(total, 3);
    }

    #[test]
    fn wire_names_are_clipped_to_128_bytes() {
        let long = "n".repeat(200);
        assert_eq!(truncate_wire_name(&long).len(), 128);
        assert_eq!(truncate_wire_name("short.txt"), "short.txt");

        let wide = "猫".repeat(60); // 180 bytes of three-byte chars
        let clipped = truncate_wire_name(&wide);
        assert!(clipped.len() <= 128);
        assert!(clipped.chars().all(|c| c == '猫'));
    }
}
