use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};

use netsprint::{
    catalog,
    config::{SprintConfig, SprintConfigLoadError},
    probe,
    protocol::Connection,
    report::SpeedReport,
    retry::Retry,
    select,
    throughput::{self, Direction},
    transport::{Dialer, DirectDialer, ProxyConfig, Socks5Dialer},
};

/// Line-protocol network speed test with automatic server selection.
#[derive(Parser)]
#[command(name = "netsprint", version)]
struct Cli {
    /// Print progress logs
    #[arg(long)]
    log: bool,

    /// Route every connection through a SOCKS5 proxy (host:port)
    #[arg(long)]
    proxy: Option<String>,

    /// Path to the TOML config file
    #[arg(long, default_value = "netsprint.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    env_logger::builder()
        .filter_level(if cli.log {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Error
        })
        .parse_default_env()
        .init();

    let config = match SprintConfig::load(&cli.config) {
        Ok(config) => config,
        // No file next to the binary means defaults; a broken file is fatal.
        Err(SprintConfigLoadError::Io(_)) => SprintConfig::default(),
        Err(err @ SprintConfigLoadError::Parse(_)) => return Err(err.into()),
    };

    let proxy = cli.proxy.as_deref().map(ProxyConfig::parse).transpose()?;
    let dialer: Box<dyn Dialer> = match proxy.clone() {
        Some(proxy) => Box::new(Socks5Dialer::new(proxy)),
        None => Box::new(DirectDialer),
    };
    let dialer = dialer.as_ref();
    let http = catalog::http_client(proxy.as_ref())?;
    let retry = Retry::timed(config.retry_attempts, config.retry_delay_ms);

    let mut report = SpeedReport::default();

    let user = retry
        .on(|| {
            let http = http.clone();
            async move { catalog::fetch_user(&http).await }
        })
        .await?;
    info!("caller is {} ({})", user.ip, user.isp);
    report.ip = user.ip;

    let select_samples = config.select_samples;
    let server = retry
        .on(|| {
            let http = http.clone();
            async move {
                let servers = catalog::fetch_servers(&http).await?;
                select::select_best(dialer, servers, select_samples).await
            }
        })
        .await?;
    info!(
        "selected server {} ({}, {}) with {}ms mean ping",
        server.id, server.sponsor, server.name, server.latency_ms
    );

    let ping_samples = config.ping_samples;
    match retry
        .on(|| {
            let host = server.host.clone();
            async move {
                let mut conn = Connection::new(dialer.dial(&host).await?);
                probe::probe(&mut conn, ping_samples).await
            }
        })
        .await
    {
        Ok(ping) => {
            report.ping = ping;
            report.server.latency = ping;
        }
        Err(err) => warn!("ping test failed: {err}"),
    }

    report.download =
        throughput::measure(dialer, &server, Direction::Download, config.workers, config.window())
            .await
            .unwrap_or_else(|err| {
                warn!("download test failed: {err}");
                0.0
            });
    report.upload =
        throughput::measure(dialer, &server, Direction::Upload, config.workers, config.window())
            .await
            .unwrap_or_else(|err| {
                warn!("upload test failed: {err}");
                0.0
            });

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
