//! # Overview
//!
//! `cli` is the thin boundary around the engine: it parses the `send` and
//! `receive` verbs, installs the tracing subscriber and the interrupt
//! handler, opens the serial device at the baseline rate and maps session
//! results onto process exit codes. Everything protocol-shaped lives in
//! the `engine` and `protocol` crates.

mod args;
mod exit_code;
mod logging;
mod progress;
mod signal;

use std::path::Path;

use clap::Parser;
use tracing::{error, info};

use engine::orchestrator::{run_receiver, run_sender};
use engine::{CancelToken, ProbeConfig, SessionError, SystemClock, SystemIds, TransferConfig};
use transport::{BASELINE_BAUDRATE, LinkConfig, SerialDevice};

use crate::args::{Cli, Command};
pub use crate::exit_code::ExitCode;
use crate::progress::LogProgress;

/// Parses the command line, runs one session and returns the exit code.
#[must_use]
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version are successful exits by convention.
            let code = if err.use_stderr() {
                ExitCode::Usage
            } else {
                ExitCode::Ok
            };
            let _ = err.print();
            return code;
        }
    };

    logging::init(cli.verbose);

    let result = match cli.command {
        Command::Send {
            ref port,
            ref path,
            baudrate,
        } => send(port, path, baudrate),
        Command::Receive {
            ref port,
            ref save,
            baudrate,
        } => receive(port, save, baudrate),
    };

    match result {
        Ok(()) => ExitCode::Ok,
        Err(err) => {
            error!(error = %err, "session failed");
            ExitCode::from_session_error(&err)
        }
    }
}

fn open_link(port: &str, baudrate: Option<u32>) -> Result<SerialDevice, SessionError> {
    let config = LinkConfig::new(port, baudrate.unwrap_or(BASELINE_BAUDRATE));
    Ok(SerialDevice::open(&config)?)
}

fn send(port: &str, path: &Path, baudrate: Option<u32>) -> Result<(), SessionError> {
    let link = open_link(port, baudrate)?;
    let cancel = CancelToken::new();
    signal::install(&cancel);

    let session = run_sender(
        link,
        path,
        &TransferConfig::default(),
        &ProbeConfig::default(),
        &SystemClock,
        &mut SystemIds::new(),
        &cancel,
        &mut LogProgress::new(),
    )?;
    info!(
        session_id = format_args!("{:#010x}", session.id),
        baudrate = session.baudrate,
        "send finished"
    );
    Ok(())
}

fn receive(port: &str, save: &Path, baudrate: Option<u32>) -> Result<(), SessionError> {
    let link = open_link(port, baudrate)?;
    let cancel = CancelToken::new();
    signal::install(&cancel);

    let outcome = run_receiver(
        link,
        save,
        &TransferConfig::default(),
        &ProbeConfig::default(),
        &SystemClock,
        &mut SystemIds::new(),
        &cancel,
        &mut LogProgress::new(),
    )?;
    info!(
        session_id = format_args!("{:#010x}", outcome.session.id),
        files = outcome.files.len(),
        "receive finished"
    );
    Ok(())
}
