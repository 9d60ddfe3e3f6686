use std::fs;

use pmulink_frame::crc32;
use pmulink_port::store::RECORD_HEADER_SIZE;
use pmulink_port::{
    ChannelExecutor, ConfigStore, Flash, MemFlash, StaticExecutor, Watchdog, CONFIG_MAGIC,
};
use serde::Serialize;
use tracing::info;

use crate::cmd::{FlashCommand, FlashInspectArgs, FlashPackArgs};
use crate::exit::{io_error, store_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_fields, OutputFormat};

pub const DEFAULT_SECTOR_SIZE: usize = 4096;

/// Host builds have no watchdog to feed.
struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn refresh(&mut self) {}
}

pub fn run(command: FlashCommand, format: OutputFormat) -> CliResult<i32> {
    match command {
        FlashCommand::Pack(args) => pack(args, format),
        FlashCommand::Inspect(args) => inspect(args, format),
    }
}

#[derive(Serialize)]
struct PackOutput {
    image: String,
    sector_size: usize,
    blob_size: usize,
    blob_crc32: String,
}

fn pack(args: FlashPackArgs, format: OutputFormat) -> CliResult<i32> {
    if args.sector_size <= RECORD_HEADER_SIZE || args.sector_size % 4 != 0 {
        return Err(CliError::usage(format!(
            "sector size must be a multiple of 4 larger than {RECORD_HEADER_SIZE}"
        )));
    }
    let blob = fs::read(&args.blob)
        .map_err(|err| io_error(&format!("failed reading {}", args.blob.display()), err))?;

    let image = pack_image(&blob, args.sector_size)?;
    fs::write(&args.output, &image)
        .map_err(|err| io_error(&format!("failed writing {}", args.output.display()), err))?;
    info!(path = %args.output.display(), size = blob.len(), "flash image written");

    let out = PackOutput {
        image: args.output.display().to_string(),
        sector_size: args.sector_size,
        blob_size: blob.len(),
        blob_crc32: format!("{:08x}", crc32(&blob)),
    };
    let rows = [
        ("image", out.image.clone()),
        ("sector_size", out.sector_size.to_string()),
        ("blob_size", out.blob_size.to_string()),
        ("blob_crc32", out.blob_crc32.clone()),
    ];
    print_fields(&out, &rows, format);
    Ok(SUCCESS)
}

pub(crate) fn pack_image(blob: &[u8], sector_size: usize) -> CliResult<Vec<u8>> {
    let mut store = ConfigStore::new(MemFlash::new(sector_size), sector_size);
    store
        .save(blob, &mut NoWatchdog)
        .map_err(|err| store_error("cannot pack configuration", err))?;
    Ok(store.into_flash().into_image())
}

#[derive(Serialize)]
struct InspectOutput {
    image_size: usize,
    magic: String,
    magic_ok: bool,
    record_size: u16,
    stored_crc16: String,
    valid: bool,
    blob_crc32: Option<String>,
    channels: Option<u16>,
}

fn inspect(args: FlashInspectArgs, format: OutputFormat) -> CliResult<i32> {
    let image = fs::read(&args.image)
        .map_err(|err| io_error(&format!("failed reading {}", args.image.display()), err))?;
    let out = inspect_image(image)?;

    let rows = [
        ("image_size", out.image_size.to_string()),
        ("magic", format!("{} ({})", out.magic, ok_str(out.magic_ok))),
        ("record_size", out.record_size.to_string()),
        ("stored_crc16", out.stored_crc16.clone()),
        ("valid", out.valid.to_string()),
        ("blob_crc32", out.blob_crc32.clone().unwrap_or_else(|| "-".into())),
        (
            "channels",
            out.channels.map_or_else(|| "-".into(), |c| c.to_string()),
        ),
    ];
    print_fields(&out, &rows, format);

    Ok(if out.valid { SUCCESS } else { DATA_INVALID })
}

fn inspect_image(image: Vec<u8>) -> CliResult<InspectOutput> {
    if image.len() < RECORD_HEADER_SIZE {
        return Err(CliError::new(
            DATA_INVALID,
            format!("image is {} bytes, smaller than a record header", image.len()),
        ));
    }
    let image_size = image.len();
    let mut store = ConfigStore::new(MemFlash::from_image(image), image_size);
    let header = store
        .header()
        .ok_or_else(|| CliError::new(DATA_INVALID, "record header unreadable"))?;

    let (blob_crc32, channels) = match store.load() {
        Some(blob) => {
            let mut executor = StaticExecutor::default();
            (
                Some(format!("{:08x}", crc32(blob))),
                Some(executor.load(blob)),
            )
        }
        None => (None, None),
    };

    Ok(InspectOutput {
        image_size: store.flash().size(),
        magic: format!("0x{:08X}", header.magic),
        magic_ok: header.magic == CONFIG_MAGIC,
        record_size: header.size,
        stored_crc16: format!("0x{:04X}", header.crc16),
        valid: blob_crc32.is_some(),
        blob_crc32,
        channels,
    })
}

fn ok_str(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "bad"
    }
}
