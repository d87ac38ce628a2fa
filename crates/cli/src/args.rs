//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Reliable file transfer over a point-to-point serial link.
#[derive(Debug, Parser)]
#[command(name = "sft", version, about)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// The two session roles.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Offer a file or directory to a listening peer.
    Send {
        /// Serial device, e.g. /dev/ttyUSB0.
        #[arg(long)]
        port: String,

        /// File or directory to send.
        #[arg(long)]
        path: PathBuf,

        /// Probe-phase baudrate (default 115200).
        #[arg(long)]
        baudrate: Option<u32>,
    },

    /// Listen for a sending peer and store what arrives.
    Receive {
        /// Serial device, e.g. /dev/ttyUSB0.
        #[arg(long)]
        port: String,

        /// Destination file or directory.
        #[arg(long)]
        save: PathBuf,

        /// Probe-phase baudrate (default 115200).
        #[arg(long)]
        baudrate: Option<u32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_verb_parses() {
        let cli = Cli::try_parse_from([
            "sft", "send", "--port", "/dev/ttyUSB0", "--path", "./data",
        ])
        .expect("parse");
        match cli.command {
            Command::Send { port, path, baudrate } => {
                assert_eq!(port, "/dev/ttyUSB0");
                assert_eq!(path, PathBuf::from("./data"));
                assert_eq!(baudrate, None);
            }
            Command::Receive { .. } => panic!("wrong verb"),
        }
    }

    #[test]
    fn receive_verb_parses_with_baudrate() {
        let cli = Cli::try_parse_from([
            "sft", "receive", "--port", "COM3", "--save", "inbox", "--baudrate", "460800", "-vv",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Receive { port, save, baudrate } => {
                assert_eq!(port, "COM3");
                assert_eq!(save, PathBuf::from("inbox"));
                assert_eq!(baudrate, Some(460_800));
            }
            Command::Send { .. } => panic!("wrong verb"),
        }
    }

    #[test]
    fn missing_port_is_a_usage_error() {
        assert!(Cli::try_parse_from(["sft", "send", "--path", "x"]).is_err());
    }
}
