//! Command line interface for the `linkframe` diagnostic binary.
//!
//! Decodes captured link-service frames given as hexadecimal text.

use clap::{Parser, Subcommand};

/// Command line arguments for the `linkframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "linkframe",
    version,
    about = "Inspect Fibre Channel link-service frames"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode one frame and print its fields.
    Decode {
        /// Treat the frame as a host request instead of a controller reply.
        #[arg(short, long)]
        request: bool,
        /// Frame bytes as hexadecimal; whitespace is ignored.
        #[arg(required = true, num_args = 1..)]
        hex: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn parses_decode_with_split_hex() {
        let cli = Cli::parse_from(["linkframe", "decode", "0a00", "060b"]);
        let Command::Decode { request, hex } = cli.command;
        assert!(!request);
        assert_eq!(hex, ["0a00", "060b"]);
    }

    #[test]
    fn parses_request_flag() {
        let cli = Cli::parse_from(["linkframe", "decode", "--request", "00"]);
        let Command::Decode { request, .. } = cli.command;
        assert!(request);
    }

    #[test]
    fn decode_requires_bytes() {
        assert!(Cli::try_parse_from(["linkframe", "decode"]).is_err());
    }
}
