use std::fs::File;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pmulink_frame::command::{parse_command, DATA};
use pmulink_frame::{decode_telemetry_with, FrameError, FrameReader};
use tracing::{debug, warn};

use crate::cmd::{is_stdin, telemetry_layout, MonitorArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS};
use crate::output::{print_frame, print_telemetry, OutputFormat};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let filter = match &args.command {
        Some(name) => Some(
            parse_command(name)
                .ok_or_else(|| CliError::usage(format!("unknown command: {name}")))?,
        ),
        None => None,
    };

    let layout = telemetry_layout(args.config.as_deref())?;

    let input: Box<dyn Read> = if is_stdin(&args.input) {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(&args.input).map_err(|err| {
            io_error(&format!("failed opening {}", args.input.display()), err)
        })?)
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut reader = FrameReader::new(input);
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(frame_error("read failed", err)),
        };

        if filter.is_some_and(|id| id != frame.id) {
            continue;
        }

        if args.telemetry && frame.id == DATA {
            match decode_telemetry_with(&frame.payload, &layout) {
                Ok(view) => print_telemetry(&view, format),
                Err(err) => {
                    warn!(error = %err, "undecodable telemetry frame");
                    print_frame(&frame, format);
                }
            }
        } else {
            print_frame(&frame, format);
        }
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    debug!(printed, discarded = reader.discarded(), "monitor finished");
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
