use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use routio_peer::{RouterStatistics, SessionInfo};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One message taken off a subscribed channel.
#[derive(Debug, Serialize)]
pub struct Received<'a> {
    pub channel: &'a str,
    pub signature: &'a str,
    pub sequence: u64,
    pub payload_size: usize,
    pub value: serde_json::Value,
    pub timestamp: String,
    #[serde(skip)]
    pub payload: &'a [u8],
}

impl<'a> Received<'a> {
    pub fn new(
        channel: &'a str,
        signature: &'a str,
        sequence: u64,
        payload: &'a [u8],
        value: serde_json::Value,
    ) -> Self {
        Self {
            channel,
            signature,
            sequence,
            payload_size: payload.len(),
            value,
            timestamp: now_unix_seconds(),
            payload,
        }
    }
}

pub fn print_message(message: &Received<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "CHANNEL", "TYPE", "SIZE", "VALUE"])
                .add_row(vec![
                    message.sequence.to_string(),
                    message.channel.to_string(),
                    message.signature.to_string(),
                    message.payload_size.to_string(),
                    value_text(&message.value),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{} {}[{}] size={} value={}",
                message.sequence,
                message.channel,
                message.signature,
                message.payload_size,
                value_text(&message.value)
            );
        }
        OutputFormat::Raw => print_raw(message.payload),
    }
}

#[derive(Serialize)]
struct StatisticsOutput<'a> {
    statistics: &'a RouterStatistics,
    sessions: &'a [SessionInfo],
}

pub fn print_statistics(stats: &RouterStatistics, sessions: &[SessionInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let out = StatisticsOutput {
                statistics: stats,
                sessions,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SESSION", "NAME", "STATE", "SUBSCRIPTIONS", "PENDING"]);
            for session in sessions {
                table.add_row(vec![
                    session.peer_id.clone(),
                    session.name.clone().unwrap_or_default(),
                    format!("{:?}", session.state).to_lowercase(),
                    session.subscriptions.join(", "),
                    session.pending_bytes.to_string(),
                ]);
            }
            println!("{table}");
            println!("{}", statistics_line(stats));
        }
        OutputFormat::Pretty => println!("{}", statistics_line(stats)),
    }
}

pub fn statistics_line(stats: &RouterStatistics) -> String {
    format!(
        "sessions={} accepted={} rejected={} received={} forwarded={} bytes={} dropped={} protocol_errors={}",
        stats.sessions_active,
        stats.sessions_accepted,
        stats.sessions_rejected,
        stats.frames_received,
        stats.frames_forwarded,
        stats.bytes_forwarded,
        stats.frames_dropped,
        stats.protocol_errors
    )
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
