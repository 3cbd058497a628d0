use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("routio {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: routio");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "protocol: {} {}",
        routio_peer::PROTOCOL_NAME,
        routio_peer::PROTOCOL_VERSION
    );
    println!(
        "target: {}",
        option_env!("ROUTIO_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "features: peer={}, schema={}, async={}, cli=true",
        cfg!(feature = "peer"),
        cfg!(feature = "schema"),
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
