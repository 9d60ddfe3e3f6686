//! Command ids and NACK reason codes.
//!
//! Ids occupy the low 6 bits of the frame header, so the space is 0x00-0x3F.

pub const PING: u8 = 0x01;
pub const PONG: u8 = 0x02;
/// Reset the device after acknowledging.
pub const RESET: u8 = 0x03;

/// Read back the stored configuration blob.
pub const GET_CONFIG: u8 = 0x10;
pub const CONFIG_DATA: u8 = 0x11;
/// Legacy text-config upload. Reserved, not handled.
pub const LOAD_CONFIG: u8 = 0x12;
/// Legacy text-config acknowledgement. Reserved.
pub const CONFIG_ACK: u8 = 0x13;
pub const SAVE_CONFIG: u8 = 0x14;
pub const FLASH_ACK: u8 = 0x15;
pub const CLEAR_CONFIG: u8 = 0x16;
pub const CLEAR_CONFIG_ACK: u8 = 0x17;
/// Chunked binary configuration upload.
pub const LOAD_BINARY: u8 = 0x18;
pub const BINARY_ACK: u8 = 0x19;

pub const START_STREAM: u8 = 0x20;
pub const STOP_STREAM: u8 = 0x21;
/// Periodic telemetry snapshot.
pub const DATA: u8 = 0x22;

pub const SET_OUTPUT: u8 = 0x28;
pub const OUTPUT_ACK: u8 = 0x29;

pub const GET_CAPABILITIES: u8 = 0x30;
pub const CAPABILITIES: u8 = 0x31;

pub const ACK: u8 = 0x3E;
pub const NACK: u8 = 0x3F;

/// Highest id representable in the header.
pub const MAX_ID: u8 = 0x3F;

/// NACK reason: the command id is not handled.
pub const NACK_UNKNOWN_COMMAND: u8 = 0x01;
/// NACK reason: the payload is shorter than the command requires.
pub const NACK_MALFORMED: u8 = 0x02;
/// NACK reason: a parameter is out of range.
pub const NACK_INVALID_PARAMETER: u8 = 0x03;

/// Returns a human-readable name for a command id.
pub fn command_name(id: u8) -> &'static str {
    match id {
        PING => "PING",
        PONG => "PONG",
        GET_CONFIG => "GET_CONFIG",
        CONFIG_DATA => "CONFIG_DATA",
        LOAD_CONFIG => "LOAD_CONFIG",
        CONFIG_ACK => "CONFIG_ACK",
        SAVE_CONFIG => "SAVE_CONFIG",
        FLASH_ACK => "FLASH_ACK",
        CLEAR_CONFIG => "CLEAR_CONFIG",
        CLEAR_CONFIG_ACK => "CLEAR_CONFIG_ACK",
        LOAD_BINARY => "LOAD_BINARY",
        BINARY_ACK => "BINARY_ACK",
        START_STREAM => "START_STREAM",
        STOP_STREAM => "STOP_STREAM",
        DATA => "DATA",
        SET_OUTPUT => "SET_OUTPUT",
        OUTPUT_ACK => "OUTPUT_ACK",
        GET_CAPABILITIES => "GET_CAPABILITIES",
        CAPABILITIES => "CAPABILITIES",
        RESET => "RESET",
        ACK => "ACK",
        NACK => "NACK",
        _ => "UNKNOWN",
    }
}

/// Parses a command name (case-insensitive) or a numeric id (`0x10`, `16`).
pub fn parse_command(input: &str) -> Option<u8> {
    let input = input.trim();
    let id = if let Some(hex) = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        u8::from_str_radix(hex, 16).ok()?
    } else if let Ok(dec) = input.parse::<u8>() {
        dec
    } else {
        let upper = input.to_ascii_uppercase().replace('-', "_");
        (0..=MAX_ID).find(|id| command_name(*id) == upper)?
    };
    (id <= MAX_ID).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_parse() {
        for id in [PING, GET_CONFIG, LOAD_BINARY, START_STREAM, SET_OUTPUT, NACK] {
            assert_eq!(parse_command(command_name(id)), Some(id));
        }
    }

    #[test]
    fn parse_accepts_numeric_forms() {
        assert_eq!(parse_command("0x30"), Some(GET_CAPABILITIES));
        assert_eq!(parse_command("1"), Some(PING));
        assert_eq!(parse_command("start-stream"), Some(START_STREAM));
    }

    #[test]
    fn parse_rejects_out_of_range() {
        assert_eq!(parse_command("0x40"), None);
        assert_eq!(parse_command("bogus"), None);
    }
}
