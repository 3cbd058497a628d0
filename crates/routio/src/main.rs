mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "routio", version, about = "Typed publish/subscribe messaging CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_publish_subcommand() {
        let cli = Cli::try_parse_from([
            "routio",
            "publish",
            "/tmp/test.sock",
            "--channel",
            "temp",
            "--type",
            "f",
            "--data",
            "21.5",
        ])
        .expect("publish args should parse");

        match cli.command {
            Command::Publish(args) => {
                assert_eq!(args.channel, "temp");
                assert_eq!(args.signature, "f");
                assert_eq!(args.count, 1);
                assert!(!args.peer);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "routio",
            "publish",
            "/tmp/test.sock",
            "--channel",
            "x",
            "--file",
            "/tmp/payload.bin",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_tcp_endpoint_for_router() {
        let cli = Cli::try_parse_from(["routio", "router", "tcp://127.0.0.1:5600"])
            .expect("router args should parse");
        match cli.command {
            Command::Router(args) => {
                assert_eq!(args.endpoint.transport_name(), "tcp");
                assert_eq!(args.max_sessions, 1024);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_endpoint() {
        let err = Cli::try_parse_from(["routio", "subscribe", "ftp://nowhere", "--channel", "x"])
            .expect_err("unsupported scheme should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
