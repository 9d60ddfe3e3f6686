use pmulink_frame::command::DATA;
use pmulink_frame::{decode_telemetry_with, FrameParser};

use crate::cmd::{read_input, telemetry_layout, DecodeArgs};
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_telemetry, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let layout = telemetry_layout(args.config.as_deref())?;
    let input = read_input(&args.input, args.hex)?;
    let payload = if args.frame {
        extract_data_payload(&input)?
    } else {
        input
    };

    let view = decode_telemetry_with(&payload, &layout).map_err(|err| frame_error("decode failed", err))?;
    print_telemetry(&view, format);
    Ok(SUCCESS)
}

/// Payload of the first DATA frame in `wire`.
fn extract_data_payload(wire: &[u8]) -> CliResult<Vec<u8>> {
    FrameParser::new()
        .extend(wire)
        .into_iter()
        .find(|frame| frame.id == DATA)
        .map(|frame| frame.payload.to_vec())
        .ok_or_else(|| CliError::new(DATA_INVALID, "input holds no DATA frame"))
}

#[cfg(test)]
mod tests {
    use pmulink_frame::command::PONG;
    use pmulink_frame::{Delivery, FrameWriter};

    use super::*;

    #[test]
    fn skips_frames_that_are_not_telemetry() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.send(PONG, Delivery::Unreliable, &[]).unwrap();
        writer.send(DATA, Delivery::Unreliable, &[7; 110]).unwrap();

        let payload = extract_data_payload(&writer.into_inner()).unwrap();
        assert_eq!(payload, vec![7; 110]);
    }

    #[test]
    fn missing_data_frame_is_invalid() {
        let err = extract_data_payload(&[0x00, 0x01]).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }
}
