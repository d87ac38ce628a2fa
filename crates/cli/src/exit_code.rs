//! Process exit codes, one per failure class.

use engine::{ProbeError, SessionError, TransferError};

/// Exit codes returned by the `sft` binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful completion.
    Ok = 0,
    /// Bad command line or unusable source path.
    Usage = 1,
    /// No peer answered the probe.
    Probe = 10,
    /// Peers found each other but could not agree on a session.
    Negotiation = 11,
    /// The transfer phase violated the protocol or starved.
    Protocol = 12,
    /// Local file I/O failed.
    FileIo = 13,
    /// The serial port failed.
    Port = 14,
    /// The user interrupted the session.
    Interrupted = 20,
}

impl ExitCode {
    /// Numeric value handed to `process::exit`.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Classifies a session failure.
    #[must_use]
    pub fn from_session_error(err: &SessionError) -> Self {
        match err {
            SessionError::Probe(probe) => match probe {
                ProbeError::Timeout { .. } => Self::Probe,
                ProbeError::NoCommonBaudrate
                | ProbeError::Rejected { .. }
                | ProbeError::UnsupportedRate { .. }
                | ProbeError::SessionMismatch { .. }
                | ProbeError::RateMismatch { .. }
                | ProbeError::InvalidTransferMode(_) => Self::Negotiation,
                ProbeError::Port(_) => Self::Port,
                ProbeError::Cancelled => Self::Interrupted,
            },
            SessionError::Transfer(transfer) => match transfer {
                TransferError::Timeout { .. }
                | TransferError::InvalidRequest { .. }
                | TransferError::AckExhausted { .. }
                | TransferError::TransferFailed { .. }
                | TransferError::SizeMismatch { .. } => Self::Protocol,
                TransferError::FileTooLarge { .. } => Self::Usage,
                TransferError::Path { .. } | TransferError::Io(_) => Self::FileIo,
                TransferError::Port(_) => Self::Port,
                TransferError::Cancelled => Self::Interrupted,
            },
            SessionError::Source { .. } => Self::Usage,
            SessionError::Port(_) => Self::Port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_timeout_maps_to_probe() {
        let err = SessionError::Probe(ProbeError::Timeout { phase: "probe response" });
        assert_eq!(ExitCode::from_session_error(&err), ExitCode::Probe);
    }

    #[test]
    fn negotiation_failures_map_to_negotiation() {
        let err = SessionError::Probe(ProbeError::NoCommonBaudrate);
        assert_eq!(ExitCode::from_session_error(&err), ExitCode::Negotiation);
        assert_eq!(ExitCode::Negotiation.as_i32(), 11);
    }

    #[test]
    fn size_mismatch_maps_to_protocol() {
        let err = SessionError::Transfer(TransferError::SizeMismatch {
            declared: 10,
            stored: 9,
        });
        assert_eq!(ExitCode::from_session_error(&err), ExitCode::Protocol);
    }

    #[test]
    fn cancellation_maps_to_interrupted() {
        let err = SessionError::Transfer(TransferError::Cancelled);
        assert_eq!(ExitCode::from_session_error(&err), ExitCode::Interrupted);
    }
}
