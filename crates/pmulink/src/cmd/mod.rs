use clap::{Args, Subcommand};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use pmulink_frame::TelemetryLayout;
use pmulink_port::PortConfig;

use crate::exit::{io_error, port_error, CliError, CliResult, USAGE};
use crate::output::{parse_hex, OutputFormat};

pub mod decode;
pub mod encode;
pub mod flash;
pub mod monitor;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a telemetry snapshot.
    Decode(DecodeArgs),
    /// Encode a command frame and print its wire bytes.
    Encode(EncodeArgs),
    /// Build or inspect configuration flash images.
    #[command(subcommand)]
    Flash(FlashCommand),
    /// Run a simulated port against recorded request bytes.
    Simulate(SimulateArgs),
    /// Print frames from a capture file or stdin.
    Monitor(MonitorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Flash(command) => flash::run(command, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Snapshot file, or `-` for stdin.
    pub input: PathBuf,
    /// Input is hex text rather than binary.
    #[arg(long)]
    pub hex: bool,
    /// Input is a complete DATA wire frame rather than a bare payload.
    #[arg(long)]
    pub frame: bool,
    /// Port configuration (JSON) whose I/O counts set the snapshot layout.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Command name (e.g. `ping`, `set_output`) or numeric id (`0x28`).
    pub command: String,
    /// Payload as hex.
    #[arg(long, default_value = "")]
    pub payload: String,
    /// Mark the frame reliable.
    #[arg(long)]
    pub reliable: bool,
}

#[derive(Subcommand, Debug)]
pub enum FlashCommand {
    /// Write a flash image holding a valid configuration record.
    Pack(FlashPackArgs),
    /// Validate a flash image and describe its record.
    Inspect(FlashInspectArgs),
}

#[derive(Args, Debug)]
pub struct FlashPackArgs {
    /// Configuration blob to store.
    pub blob: PathBuf,
    /// Output image path.
    #[arg(long, short = 'o')]
    pub output: PathBuf,
    /// Sector size in bytes.
    #[arg(long, default_value_t = flash::DEFAULT_SECTOR_SIZE)]
    pub sector_size: usize,
}

#[derive(Args, Debug)]
pub struct FlashInspectArgs {
    /// Flash image to inspect.
    pub image: PathBuf,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Request bytes to feed the port, or `-` for stdin.
    pub wire: PathBuf,
    /// Request file is hex text rather than binary.
    #[arg(long)]
    pub hex: bool,
    /// Number of update ticks to run after the requests.
    #[arg(long, default_value_t = 0)]
    pub ticks: u32,
    /// Simulated milliseconds per tick.
    #[arg(long, default_value_t = 10)]
    pub tick_ms: u32,
    /// Port configuration (JSON).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Boot from this flash image instead of an erased sector.
    #[arg(long, value_name = "IMAGE")]
    pub flash: Option<PathBuf>,
    /// Write the resulting flash image here.
    #[arg(long, value_name = "IMAGE")]
    pub save_flash: Option<PathBuf>,
    /// Also write reply frames to this file as a wire capture.
    #[arg(long, value_name = "FILE")]
    pub capture: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Capture file, or `-` for stdin.
    pub input: PathBuf,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Only print frames with this command (name or id).
    #[arg(long)]
    pub command: Option<String>,
    /// Decode DATA payloads as telemetry.
    #[arg(long)]
    pub telemetry: bool,
    /// Port configuration (JSON) whose I/O counts set the snapshot layout.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Read a whole input file (or stdin), decoding hex text when asked.
pub(crate) fn read_input(path: &Path, hex: bool) -> CliResult<Vec<u8>> {
    let raw = if is_stdin(path) {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|err| io_error("failed reading stdin", err))?;
        buf
    } else {
        fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?
    };

    if !hex {
        return Ok(raw);
    }
    let text = String::from_utf8(raw)
        .map_err(|_| CliError::new(crate::exit::DATA_INVALID, "hex input is not UTF-8"))?;
    parse_hex(&text).map_err(|err| CliError::new(crate::exit::DATA_INVALID, err))
}

/// Load and validate a port configuration; defaults when no file is given.
pub(crate) fn load_config(path: Option<&Path>) -> CliResult<PortConfig> {
    let Some(path) = path else {
        return Ok(PortConfig::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    let config: PortConfig = serde_json::from_str(&text)
        .map_err(|err| CliError::new(USAGE, format!("invalid config {}: {err}", path.display())))?;
    config
        .validate()
        .map_err(|err| port_error(&format!("invalid config {}", path.display()), err))?;
    Ok(config)
}

/// Snapshot layout of the configured device.
pub(crate) fn telemetry_layout(config: Option<&Path>) -> CliResult<TelemetryLayout> {
    Ok(load_config(config)?.device.telemetry_layout())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pmulink-cmd-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join("port.json")
    }

    #[test]
    fn config_file_overrides_defaults() {
        let path = scratch("overrides");
        fs::write(&path, r#"{"default_rate_hz": 50}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.default_rate_hz, 50);
        assert_eq!(config.tx_capacity, PortConfig::default().tx_capacity);

        fs::write(&path, "not json").unwrap();
        assert_eq!(load_config(Some(&path)).unwrap_err().code, USAGE);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn config_that_overflows_telemetry_is_refused() {
        let path = scratch("overflow");
        fs::write(&path, r#"{"device": {"analog_in_count": 80}}"#).unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert_eq!(err.code, USAGE);
        assert!(err.message.contains("226-byte"));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn layout_follows_configured_io_counts() {
        assert_eq!(telemetry_layout(None).unwrap(), TelemetryLayout::default());

        let path = scratch("layout");
        fs::write(&path, r#"{"device": {"output_count": 4, "analog_in_count": 1}}"#).unwrap();
        assert_eq!(
            telemetry_layout(Some(&path)).unwrap(),
            TelemetryLayout::new(4, 1)
        );
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
