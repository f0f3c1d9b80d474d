//! Crawl a DHT network and log the address of every node found.

use clap::Parser;
use dht_crawler::{
    BootstrapSelection, CrawlerBuilder, LogDestination, SessionConfiguration, UdpTransport,
    DEFAULT_CROSS_REQUESTS_PER_NODE, DEFAULT_MAX_CONCURRENT_CRAWLS, DEFAULT_MAX_REQUESTS_PER_TICK,
    DEFAULT_MIN_PASSES, DEFAULT_REGISTRY_CAPACITY,
};
use log::LevelFilter;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Maximum number of crawls running at once.
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_CRAWLS)]
    max_concurrent_crawls: usize,

    /// Seconds between starting two crawls.
    #[arg(long, default_value_t = 180)]
    spawn_interval_seconds: u64,

    /// Full registry sweeps before a crawl may finish.
    #[arg(long, default_value_t = DEFAULT_MIN_PASSES)]
    min_passes: usize,

    /// Seconds without a new node before a crawl may finish.
    #[arg(long, default_value_t = 10)]
    node_discovery_timeout_seconds: u64,

    /// Seconds between two request batches of one crawl.
    #[arg(long, default_value_t = 0)]
    request_interval_seconds: u64,

    /// Nodes targeted per request batch.
    #[arg(long, default_value_t = DEFAULT_MAX_REQUESTS_PER_TICK)]
    max_requests_per_tick: usize,

    /// Random nodes paired with each targeted node.
    #[arg(long, default_value_t = DEFAULT_CROSS_REQUESTS_PER_NODE)]
    cross_requests_per_node: usize,

    /// Initial number of registry slots per crawl.
    #[arg(long, default_value_t = DEFAULT_REGISTRY_CAPACITY)]
    initial_registry_capacity: usize,

    /// File each finished crawl replaces.
    #[arg(long, default_value = "crawler.log")]
    log_path: PathBuf,

    /// Write one log per crawl under DIR/YYYY-MM-DD/ instead of --log-path.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Contact a random subset of this many bootstrap nodes instead of all.
    #[arg(long)]
    bootstrap_subset: Option<usize>,

    /// Local address crawl sessions bind to.
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Run a single crawl and exit.
    #[arg(long)]
    once: bool,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} - {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply()?;

    log::info!("CRAWLING THE DHT");

    let destination = match args.log_dir {
        Some(dir) => LogDestination::Dated(dir),
        None => LogDestination::File(args.log_path),
    };
    log::debug!("Writing results to {destination:?}");

    let selection = match args.bootstrap_subset {
        Some(count) => BootstrapSelection::Random(count),
        None => BootstrapSelection::All,
    };

    let transport = UdpTransport::new(SessionConfiguration::bound_to(args.bind));
    let crawler = CrawlerBuilder::new(transport)
        .with_max_concurrent_crawls(args.max_concurrent_crawls)
        .with_spawn_interval(Duration::from_secs(args.spawn_interval_seconds))
        .with_min_passes(args.min_passes)
        .with_node_discovery_timeout(Duration::from_secs(args.node_discovery_timeout_seconds))
        .with_request_interval(Duration::from_secs(args.request_interval_seconds))
        .with_max_requests_per_tick(args.max_requests_per_tick)
        .with_cross_requests_per_node(args.cross_requests_per_node)
        .with_initial_registry_capacity(args.initial_registry_capacity)
        .with_bootstrap_selection(selection)
        .with_log_destination(destination)
        .build()?;

    if args.once {
        let pool = crawler.pool().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, stopping crawl");
                pool.request_exit();
            }
        });

        let outcome = crawler
            .crawl_once()
            .await
            .map_err(|e| format!("Crawl error: {e}"))?;
        log::info!(
            "Crawl found {} nodes in {} passes",
            outcome.nodes,
            outcome.passes
        );
        return Ok(());
    }

    crawler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("Unable to listen for interrupt signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
