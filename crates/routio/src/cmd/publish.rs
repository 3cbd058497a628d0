use std::fs;
use std::time::{Duration, Instant};

use bytes::Bytes;
use routio_message::{Dictionary, Header, MessageWriter, Timestamp, TypeSignature, Value};
use routio_peer::{Channel, Client, ClientConfig, IoLoop, PeerError};
use tracing::{debug, warn};

use crate::cmd::{await_established, parse_duration, pump_until, PublishArgs};
use crate::exit::{io_error, peer_error, CliError, CliResult, SUCCESS};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

pub fn run(args: PublishArgs) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let interval = parse_duration(&args.interval)?;
    let channel = Channel::parse(args.channel.clone(), &args.signature)
        .map_err(|err| peer_error("invalid channel", err))?;
    let value = resolve_value(&args, channel.signature())?;

    let client = Client::new(ClientConfig {
        name: "routio-publish".to_string(),
        loopback: false,
        exit_on_disconnect: !args.peer,
        ..ClientConfig::default()
    });
    let mut ioloop = IoLoop::new();
    ioloop
        .add_handler(client.clone())
        .map_err(|err| peer_error("event loop setup failed", err))?;

    let opened = if args.peer {
        client.connect_peer(&args.endpoint)
    } else {
        client.connect(&args.endpoint)
    };
    opened.map_err(|err| peer_error("connect failed", err))?;
    await_established(&mut ioloop, &client, timeout)?;

    let publisher = client
        .publisher(channel.clone())
        .map_err(|err| peer_error("advertise failed", err))?;
    if args.peer {
        pump_until(&mut ioloop, timeout, "a subscriber", || {
            client.peer_subscriptions(&channel) > 0
        })?;
    }

    for sequence in 0..args.count {
        let mut writer = MessageWriter::new();
        value.write(&mut writer);
        let report = publisher
            .send_writer(writer)
            .map_err(|err| peer_error("publish failed", err))?;
        if !report.is_complete() {
            warn!(%channel, dropped = report.dropped, "message dropped under backpressure");
        }
        debug!(%channel, sequence, queued = report.queued, "published");

        let next = Instant::now() + interval;
        let connected = pump_until(&mut ioloop, interval + FLUSH_TIMEOUT, "the send interval", || {
            Instant::now() >= next && client.pending_bytes() == 0
        })?;
        if !connected {
            return Err(peer_error("publish failed", PeerError::Closed));
        }
    }

    for err in client.take_errors() {
        warn!(error = %err, "connection error");
    }
    client.close();
    Ok(SUCCESS)
}

fn resolve_value(args: &PublishArgs, signature: &TypeSignature) -> CliResult<Value> {
    if let Some(path) = &args.file {
        let raw = fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        if *signature == TypeSignature::Bytes {
            return Ok(Value::Bytes(Bytes::from(raw)));
        }
        let text = String::from_utf8(raw)
            .map_err(|_| CliError::usage(format!("{} is not valid UTF-8", path.display())))?;
        return parse_value(signature, text.trim_end_matches('\n'));
    }
    match &args.data {
        Some(text) => parse_value(signature, text),
        None => Err(CliError::usage("one of --data or --file is required")),
    }
}

/// Interpret command-line text as a value of `signature`.
pub(crate) fn parse_value(signature: &TypeSignature, text: &str) -> CliResult<Value> {
    let invalid = || CliError::usage(format!("'{text}' is not a valid {signature} value"));
    let value = match signature {
        TypeSignature::Bool => Value::Bool(match text {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => return Err(invalid()),
        }),
        TypeSignature::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Value::Char(c),
                _ => return Err(invalid()),
            }
        }
        TypeSignature::I8 => Value::I8(text.parse().map_err(|_| invalid())?),
        TypeSignature::I16 => Value::I16(text.parse().map_err(|_| invalid())?),
        TypeSignature::I32 => Value::I32(text.parse().map_err(|_| invalid())?),
        TypeSignature::I64 => Value::I64(text.parse().map_err(|_| invalid())?),
        TypeSignature::U8 => Value::U8(text.parse().map_err(|_| invalid())?),
        TypeSignature::U16 => Value::U16(text.parse().map_err(|_| invalid())?),
        TypeSignature::U32 => Value::U32(text.parse().map_err(|_| invalid())?),
        TypeSignature::U64 => Value::U64(text.parse().map_err(|_| invalid())?),
        TypeSignature::F32 => Value::F32(text.parse().map_err(|_| invalid())?),
        TypeSignature::F64 => Value::F64(text.parse().map_err(|_| invalid())?),
        TypeSignature::String => Value::String(text.to_string()),
        TypeSignature::Bytes => Value::Bytes(Bytes::copy_from_slice(text.as_bytes())),
        TypeSignature::Timestamp => Value::Timestamp(parse_timestamp(text).ok_or_else(invalid)?),
        TypeSignature::Header => Value::Header(Header::now(text)),
        TypeSignature::Dictionary => Value::Dictionary(parse_dictionary(text).ok_or_else(invalid)?),
        TypeSignature::Tensor | TypeSignature::Schema(_) => {
            return Err(CliError::usage(format!(
                "publishing {signature} values from the command line is not supported"
            )))
        }
    };
    Ok(value)
}

fn parse_timestamp(text: &str) -> Option<Timestamp> {
    if text == "now" {
        return Some(Timestamp::now());
    }
    text.parse().ok().map(Timestamp::from_nanos)
}

/// `key=value` pairs separated by commas, or a JSON object of strings.
fn parse_dictionary(text: &str) -> Option<Dictionary> {
    if text.trim_start().starts_with('{') {
        return serde_json::from_str(text).ok();
    }
    let mut dict = Dictionary::new();
    for pair in text.split(',').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=')?;
        dict.insert(key.trim().to_string(), value.trim().to_string());
    }
    Some(dict)
}
