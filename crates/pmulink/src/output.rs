use std::fmt::Write as _;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pmulink_frame::command::command_name;
use pmulink_frame::{Delivery, Frame, TelemetryView};
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

#[derive(Serialize)]
struct FrameOutput<'a> {
    id: u8,
    command: &'a str,
    delivery: Delivery,
    payload_size: usize,
    payload: String,
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    let command = command_name(frame.id);
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                id: frame.id,
                command,
                delivery: frame.delivery,
                payload_size: frame.payload.len(),
                payload: to_hex(&frame.payload),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "COMMAND", "DELIVERY", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    format!("0x{:02X}", frame.id),
                    command.to_string(),
                    delivery_name(frame.delivery).to_string(),
                    frame.payload.len().to_string(),
                    to_hex(&frame.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "id=0x{:02X} ({}) delivery={} size={} payload={}",
                frame.id,
                command,
                delivery_name(frame.delivery),
                frame.payload.len(),
                to_hex(&frame.payload)
            );
        }
        OutputFormat::Raw => print_raw(&frame.payload),
    }
}

pub fn print_telemetry(view: &TelemetryView, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(view),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in telemetry_rows(view) {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");

            if !view.channels.is_empty() {
                let mut channels = Table::new();
                channels
                    .load_preset(UTF8_FULL)
                    .set_header(vec!["CHANNEL", "VALUE"]);
                for channel in &view.channels {
                    channels.add_row(vec![
                        format!("0x{:04X}", channel.id),
                        channel.value.to_string(),
                    ]);
                }
                println!("{channels}");
            }
        }
        OutputFormat::Pretty => {
            for (field, value) in telemetry_rows(view) {
                println!("{field}: {value}");
            }
            for channel in &view.channels {
                println!("channel 0x{:04X}: {}", channel.id, channel.value);
            }
        }
    }
}

fn telemetry_rows(view: &TelemetryView) -> Vec<(&'static str, String)> {
    vec![
        ("stream_counter", view.stream_counter.to_string()),
        ("timestamp_ms", view.timestamp_ms.to_string()),
        ("uptime_sec", view.uptime_sec.to_string()),
        ("outputs_on", bit_list(&view.outputs)),
        ("output_faults", format!("0b{:08b}", view.output_faults)),
        ("digital_inputs", bit_list(&view.digital_inputs)),
        ("input_voltage_mv", view.input_voltage_mv.to_string()),
        ("board_temp_c", view.board_temp_c.to_string()),
        ("channel_count", view.channel_count.to_string()),
    ]
}

/// Key/value report. JSON prints `value`; the other formats print `rows`.
pub fn print_fields<T: Serialize>(value: &T, rows: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(value),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in rows {
                table.add_row(vec![field.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (field, value) in rows {
                println!("{field}: {value}");
            }
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn delivery_name(delivery: Delivery) -> &'static str {
    match delivery {
        Delivery::Reliable => "reliable",
        Delivery::Unreliable => "unreliable",
    }
}

/// Indices of set flags, e.g. `0,3,7`, or `-` when none are set.
fn bit_list(bits: &[bool]) -> String {
    let on: Vec<String> = bits
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(i, _)| i.to_string())
        .collect();
    if on.is_empty() {
        "-".to_string()
    } else {
        on.join(",")
    }
}

pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parse hex text. Whitespace, `:` separators and `0x` prefixes are ignored.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ':' || c == ',')
        .map(|token| token.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();

    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(format!("invalid hex digit '{bad}'"));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", digits.len()));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|err| format!("invalid hex byte '{}': {err}", &digits[i..i + 2]))
        })
        .collect()
}
