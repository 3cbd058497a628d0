use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use routio_message::{DecodeError, MessageReader, TypeSignature, Value};
use routio_peer::{Channel, Client, ClientConfig, IoLoop};
use routio_schema::SchemaRegistry;
use tracing::{info, warn};

use crate::cmd::{await_established, parse_duration, pump_until, SubscribeArgs};
use crate::exit::{peer_error, schema_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_message, OutputFormat, Received};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
// Effectively unbounded when no --timeout is given.
const FOREVER: Duration = Duration::from_secs(60 * 60 * 24 * 365);

pub fn run(args: SubscribeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
    let channel = Channel::parse(args.channel.clone(), &args.signature)
        .map_err(|err| peer_error("invalid channel", err))?;

    let registry = match &args.schema_dir {
        Some(dir) => Some(Arc::new(
            SchemaRegistry::from_directory(dir).map_err(|err| schema_error("schema load failed", err))?,
        )),
        None => None,
    };
    if let (TypeSignature::Schema(id), Some(registry)) = (channel.signature(), &registry) {
        if !registry.has_schema(id) {
            return Err(CliError::usage(format!(
                "schema {id} not found in the schema directory"
            )));
        }
    }

    let client = Client::new(ClientConfig {
        name: "routio-subscribe".to_string(),
        loopback: false,
        exit_on_disconnect: !args.listen,
        ..ClientConfig::default()
    });
    if let Some(registry) = &registry {
        client.set_schema_registry(registry.clone());
    }

    let mut ioloop = IoLoop::new();
    ioloop
        .add_handler(client.clone())
        .map_err(|err| peer_error("event loop setup failed", err))?;

    if args.listen {
        let endpoint = client
            .listen(&args.endpoint)
            .map_err(|err| peer_error("listen failed", err))?;
        info!(%endpoint, "waiting for publishers");
    } else {
        client
            .connect(&args.endpoint)
            .map_err(|err| peer_error("connect failed", err))?;
        await_established(&mut ioloop, &client, CONNECT_TIMEOUT)?;
    }

    let received = Rc::new(Cell::new(0u64));
    let counter = received.clone();
    let name = channel.name().to_string();
    let signature = channel.signature_text().to_string();
    let decode_as = channel.signature().clone();
    let decoder = registry.clone();
    let _subscriber = client
        .subscriber(channel, move |mut reader| {
            let payload = reader.payload().clone();
            let value = decode_payload(&mut reader, &decode_as, decoder.as_deref())?;
            let sequence = counter.get();
            counter.set(sequence + 1);
            print_message(
                &Received::new(&name, &signature, sequence, &payload, value),
                format,
            );
            Ok(())
        })
        .map_err(|err| peer_error("subscribe failed", err))?;

    let target = args.count.unwrap_or(u64::MAX);
    let connected = pump_until(&mut ioloop, timeout.unwrap_or(FOREVER), "messages", || {
        for err in client.take_errors() {
            warn!(error = %err, "message not delivered");
        }
        received.get() >= target
    })?;

    client.close();
    if !connected {
        return Err(CliError::new(FAILURE, "router closed the connection"));
    }
    Ok(SUCCESS)
}

/// Decode one payload into JSON for display.
///
/// Schema channels decode through the registry when one is loaded;
/// otherwise the fields are listed in order as they appear on the wire.
fn decode_payload(
    reader: &mut MessageReader,
    signature: &TypeSignature,
    registry: Option<&SchemaRegistry>,
) -> Result<serde_json::Value, routio_peer::BoxError> {
    match signature {
        TypeSignature::Schema(id) => match registry {
            Some(registry) => Ok(registry.decode(id, reader)?.into_value().to_json()),
            None => Ok(read_fields(reader)?.to_json()),
        },
        builtin => Ok(Value::read(reader, builtin)?.to_json()),
    }
}

fn read_fields(reader: &mut MessageReader) -> Result<Value, DecodeError> {
    let mut fields = Vec::new();
    while !reader.is_empty() {
        fields.push(Value::read_any(reader)?);
    }
    Ok(Value::Repeated(fields))
}
