use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use routio_peer::{Client, IoLoop};
use routio_transport::{Endpoint, DEFAULT_ENDPOINT, ENDPOINT_ENV};

use crate::exit::{peer_error, CliError, CliResult, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod publish;
pub mod router;
pub mod subscribe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a router until interrupted.
    Router(RouterArgs),
    /// Publish messages on a channel.
    Publish(PublishArgs),
    /// Subscribe to a channel and print received messages.
    Subscribe(SubscribeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Router(args) => router::run(args, format),
        Command::Publish(args) => publish::run(args),
        Command::Subscribe(args) => subscribe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RouterArgs {
    /// Endpoint to bind (socket path, unix:/path or tcp://host:port).
    #[arg(env = ENDPOINT_ENV, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: Endpoint,
    /// Name announced to clients.
    #[arg(long, default_value = "routio-router")]
    pub name: String,
    /// Maximum concurrent sessions.
    #[arg(long, default_value_t = 1024)]
    pub max_sessions: usize,
    /// How often to log statistics (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub stats_interval: String,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Router endpoint, or a listening peer with --peer.
    #[arg(env = ENDPOINT_ENV, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: Endpoint,
    /// Channel name.
    #[arg(long, short = 'c')]
    pub channel: String,
    /// Channel type signature (e.g. string, i32, f64, header).
    #[arg(long = "type", short = 't', default_value = "string")]
    pub signature: String,
    /// Message value, interpreted according to --type.
    #[arg(long, short = 'd', conflicts_with = "file")]
    pub data: Option<String>,
    /// Read the value from a file (raw contents for bytes, text otherwise).
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Number of messages to send.
    #[arg(long, default_value_t = 1)]
    pub count: u64,
    /// Delay between messages (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub interval: String,
    /// Connect directly to a listening subscriber instead of a router.
    #[arg(long)]
    pub peer: bool,
    /// How long to wait for the connection (and, with --peer, a subscriber).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    /// Router endpoint, or the endpoint to listen on with --listen.
    #[arg(env = ENDPOINT_ENV, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: Endpoint,
    /// Channel name.
    #[arg(long, short = 'c')]
    pub channel: String,
    /// Channel type signature.
    #[arg(long = "type", short = 't', default_value = "string")]
    pub signature: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<u64>,
    /// Give up if nothing arrives within this time (e.g. 5s).
    #[arg(long)]
    pub timeout: Option<String>,
    /// Accept direct connections from publishers instead of using a router.
    #[arg(long)]
    pub listen: bool,
    /// Directory of compiled schema descriptors for schema:<id> channels.
    #[arg(long, value_name = "DIR")]
    pub schema_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Turn the event loop until `done` holds or `timeout` passes.
///
/// Returns `Ok(false)` when a handler asked the loop to stop.
pub(crate) fn pump_until(
    ioloop: &mut IoLoop,
    timeout: Duration,
    what: &str,
    mut done: impl FnMut() -> bool,
) -> CliResult<bool> {
    let deadline = Instant::now() + timeout;
    while !done() {
        let now = Instant::now();
        if now >= deadline {
            return Err(CliError::new(TIMEOUT, format!("timed out waiting for {what}")));
        }
        let slice = (deadline - now).min(Duration::from_millis(50));
        let running = ioloop
            .wait(slice.as_millis() as u64)
            .map_err(|err| peer_error("event loop failed", err))?;
        if !running {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Wait for the session hello on every connection of `client`.
pub(crate) fn await_established(
    ioloop: &mut IoLoop,
    client: &Client,
    timeout: Duration,
) -> CliResult<()> {
    let mut failure = None;
    pump_until(ioloop, timeout, "session hello", || {
        if let Some(err) = client.take_errors().into_iter().next() {
            failure = Some(err);
            return true;
        }
        client.connection_count() > 0 && client.established_count() == client.connection_count()
    })?;
    match failure {
        Some(err) => Err(peer_error("session failed", err)),
        None => Ok(()),
    }
}
