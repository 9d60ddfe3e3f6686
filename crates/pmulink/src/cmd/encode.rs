use bytes::BytesMut;
use pmulink_frame::command::{command_name, parse_command};
use pmulink_frame::{encode_frame, Delivery, FrameWriter};
use serde::Serialize;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS};
use crate::output::{delivery_name, parse_hex, print_fields, to_hex, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput {
    id: u8,
    command: &'static str,
    delivery: Delivery,
    payload_size: usize,
    wire: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let id = parse_command(&args.command)
        .ok_or_else(|| CliError::usage(format!("unknown command: {}", args.command)))?;
    let payload = parse_hex(&args.payload)
        .map_err(|err| CliError::usage(format!("--payload: {err}")))?;
    let delivery = if args.reliable {
        Delivery::Reliable
    } else {
        Delivery::Unreliable
    };

    if let OutputFormat::Raw = format {
        let mut writer = FrameWriter::new(std::io::stdout().lock());
        writer
            .send(id, delivery, &payload)
            .map_err(|err| frame_error("write failed", err))?;
        return Ok(SUCCESS);
    }

    let mut wire = BytesMut::new();
    encode_frame(id, delivery, &payload, &mut wire).map_err(|err| frame_error("encode failed", err))?;

    let out = EncodeOutput {
        id,
        command: command_name(id),
        delivery,
        payload_size: payload.len(),
        wire: to_hex(&wire),
    };
    let rows = [
        ("id", format!("0x{id:02X}")),
        ("command", out.command.to_string()),
        ("delivery", delivery_name(delivery).to_string()),
        ("payload_size", out.payload_size.to_string()),
        ("wire", out.wire.clone()),
    ];
    print_fields(&out, &rows, format);
    Ok(SUCCESS)
}
