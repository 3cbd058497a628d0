use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use routio_peer::{IoLoop, Router, RouterConfig};
use tracing::info;

use crate::cmd::{parse_duration, RouterArgs};
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_statistics, statistics_line, OutputFormat};

const TICK_MS: u64 = 100;

pub fn run(args: RouterArgs, format: OutputFormat) -> CliResult<i32> {
    let stats_interval = parse_duration(&args.stats_interval)?;
    let router = Router::new(RouterConfig {
        name: args.name,
        max_sessions: args.max_sessions,
        ..RouterConfig::default()
    });
    let endpoint = router
        .bind(&args.endpoint)
        .map_err(|err| peer_error("bind failed", err))?;
    info!(%endpoint, "router ready");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut ioloop = IoLoop::new();
    ioloop
        .add_handler(router.clone())
        .map_err(|err| peer_error("event loop setup failed", err))?;

    let mut last_report = Instant::now();
    while running.load(Ordering::SeqCst) {
        ioloop
            .wait(TICK_MS)
            .map_err(|err| peer_error("event loop failed", err))?;

        if !stats_interval.is_zero() && last_report.elapsed() >= stats_interval {
            info!(stats = %statistics_line(&router.statistics()), "router statistics");
            last_report = Instant::now();
        }
    }

    info!("shutting down");
    let sessions = router.sessions();
    router.close();
    print_statistics(&router.statistics(), &sessions, format);
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
