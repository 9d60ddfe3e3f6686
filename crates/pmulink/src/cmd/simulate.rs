use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use pmulink_frame::{FrameParser, FrameWriter};
use pmulink_port::{MemFlash, Port, PortConfig, ResetRequested, SimBoard, StaticExecutor};
use pmulink_transport::MemoryLink;
use tracing::{info, warn};

use crate::cmd::flash::DEFAULT_SECTOR_SIZE;
use crate::cmd::{load_config, read_input, SimulateArgs};
use crate::exit::{frame_error, io_error, port_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

type SimPort = Port<MemoryLink, MemFlash, SimBoard, StaticExecutor>;

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let requests = read_input(&args.wire, args.hex)?;
    let config = load_config(args.config.as_deref())?;
    let flash = match &args.flash {
        Some(path) => MemFlash::from_image(
            fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        ),
        None => MemFlash::new(DEFAULT_SECTOR_SIZE),
    };

    let mut link = MemoryLink::new();
    link.push_inbound(&requests);

    install_reset_hook();
    let mut port = boot(link, flash, &config);
    let mut resets = 0u32;

    loop {
        match catch_reset(|| port.poll_link())? {
            Some(result) => {
                result.map_err(|err| port_error("link failed", err))?;
                break;
            }
            None => {
                resets += 1;
                port = reboot(port, &config);
            }
        }
    }

    let mut tick = 0;
    while tick < args.ticks {
        port.board().advance(args.tick_ms);
        match catch_reset(|| port.update())? {
            Some(()) => tick += 1,
            None => {
                resets += 1;
                port = reboot(port, &config);
            }
        }
    }

    let written = port.link().written().to_vec();
    let mut parser = FrameParser::new();
    let frames = parser.extend(&written);
    for frame in &frames {
        print_frame(frame, format);
    }

    if let Some(path) = &args.capture {
        write_capture(path, &frames)?;
    }
    if let Some(path) = &args.save_flash {
        let image = port.into_parts().flash.into_image();
        fs::write(path, image)
            .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))?;
    }

    info!(
        requests = requests.len(),
        replies = frames.len(),
        resets,
        "simulation finished"
    );
    Ok(SUCCESS)
}

fn boot(link: MemoryLink, flash: MemFlash, config: &PortConfig) -> SimPort {
    let layout = config.device.telemetry_layout();
    let board = SimBoard::with_io(layout.outputs, layout.analog_inputs);
    let mut port = Port::new(link, flash, board, StaticExecutor::default(), config.clone());
    port.boot();
    port
}

/// A reset wipes RAM: fresh board and executor, same link and flash.
fn reboot(port: SimPort, config: &PortConfig) -> SimPort {
    let parts = port.into_parts();
    info!("port reset, rebooting");
    boot(parts.link, parts.flash, config)
}

/// Run `f`, turning a simulated reset into `Ok(None)`. Any other panic keeps
/// unwinding.
fn catch_reset<T>(f: impl FnOnce() -> T) -> CliResult<Option<T>> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(Some(value)),
        Err(payload) if is_reset(payload.as_ref()) => Ok(None),
        Err(payload) => panic::resume_unwind(payload),
    }
}

fn is_reset(payload: &(dyn Any + Send)) -> bool {
    payload.downcast_ref::<ResetRequested>().is_some()
}

/// Keep the default panic report for real panics only.
fn install_reset_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if !is_reset(info.payload()) {
            default_hook(info);
        }
    }));
}

fn write_capture(path: &Path, frames: &[pmulink_frame::Frame]) -> CliResult<()> {
    let file = fs::File::create(path)
        .map_err(|err| io_error(&format!("failed creating {}", path.display()), err))?;
    let mut writer = FrameWriter::new(std::io::BufWriter::new(file));
    for frame in frames {
        writer
            .write_frame(frame)
            .map_err(|err| frame_error("capture write failed", err))?;
    }
    if frames.is_empty() {
        warn!("no reply frames to capture");
    }
    Ok(())
}
