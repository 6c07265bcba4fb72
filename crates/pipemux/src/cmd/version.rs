use pipemux_frame::{HEADER_SIZE, MAX_PACKET_SIZE};
use pipemux_protocol::MAX_CONTENT_FEEDS;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("pipemux {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: pipemux");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("PIPEMUX_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("PIPEMUX_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("transport: {}", transport_kind());
    println!("packet_header_bytes: {HEADER_SIZE}");
    println!("max_packet_content_bytes: {MAX_PACKET_SIZE}");
    println!("max_content_feeds: {MAX_CONTENT_FEEDS}");

    Ok(SUCCESS)
}

fn transport_kind() -> &'static str {
    if cfg!(windows) {
        "named-pipe"
    } else {
        "unix-domain-socket"
    }
}
