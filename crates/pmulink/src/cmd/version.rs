use pmulink_frame::{MAX_FRAME_SIZE, MAX_PAYLOAD};
use pmulink_port::{DeviceInfo, DEFAULT_CONFIG_CAPACITY};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("pmulink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let device = DeviceInfo::default();
    println!("name: pmulink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("PMULINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("max_payload: {MAX_PAYLOAD}");
    println!("max_frame: {MAX_FRAME_SIZE}");
    println!("config_capacity: {DEFAULT_CONFIG_CAPACITY}");
    println!(
        "default_device: type={} fw={}.{}.{} outputs={}",
        device.device_type, device.fw_major, device.fw_minor, device.fw_patch, device.output_count
    );

    Ok(SUCCESS)
}
