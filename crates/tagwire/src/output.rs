use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use tagwire_frame::Packet;

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

#[derive(Serialize)]
struct PacketOutput<'a> {
    kind: &'a str,
    payload_size: usize,
    payload: String,
    peer: &'a str,
    timestamp: String,
}

pub fn print_packet(packet: &Packet, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                kind: packet.kind().as_str(),
                payload_size: packet.payload().len(),
                payload: payload_preview(packet),
                peer,
                timestamp: now_unix_seconds(),
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
                .set_header(vec!["KIND", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    packet.kind().as_str().to_string(),
                    packet.payload().len().to_string(),
                    peer.to_string(),
                    payload_preview(packet),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "kind={} size={} peer={} payload={}",
                packet.kind().as_str(),
                packet.payload().len(),
                peer,
                payload_preview(packet)
            );
        }
        OutputFormat::Raw => {
            print_raw(packet.payload());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Text payloads verbatim, binary payloads hex-encoded.
fn payload_preview(packet: &Packet) -> String {
    match packet {
        Packet::Text(text) => text.clone(),
        Packet::Binary(bytes) => hex::encode(bytes),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
