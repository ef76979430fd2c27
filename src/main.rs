//! Diagnostic binary for `linkframe`.
//!
//! Parses CLI arguments and prints decoded link-service frames.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Command};
use linkframe::message::{Reply, Request};

fn decode(request: bool, hex: &[String]) -> Result<String, Box<dyn std::error::Error>> {
    let text: String = hex.concat().split_whitespace().collect();
    let bytes = hex::decode(text)?;
    if request {
        let (token, request) = Request::decode(&bytes)?;
        Ok(format!("message context {token}\n{request:#?}"))
    } else {
        let reply = Reply::decode(&bytes)?;
        let outcome = reply.outcome();
        Ok(format!(
            "message context {}\nstatus {}\n{reply:#?}",
            reply.message_context(),
            outcome.status()
        ))
    }
}

fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Decode { request, hex } => match decode(request, &hex) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(error) => {
                eprintln!("linkframe: {error}");
                ExitCode::FAILURE
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use linkframe::{
        message::{FunctionCode, REPLY_HEADER_LEN, Reply, ReplyHeader, StatusReply},
        token::ExchangeToken,
    };

    use super::decode;

    #[test]
    fn decodes_reply_hex_split_across_arguments() {
        let header = ReplyHeader::new(FunctionCode::FcAbort, ExchangeToken::new(7), REPLY_HEADER_LEN);
        let text = hex::encode(Reply::Abort(StatusReply { header }).to_bytes());
        let (head, tail) = text.split_at(8);

        let printed = decode(false, &[head.to_owned(), tail.to_owned()]).expect("valid frame");

        assert!(printed.starts_with("message context 0x00000007"));
    }

    #[test]
    fn rejects_invalid_hex() {
        assert!(decode(true, &["zz".to_owned()]).is_err());
    }
}
