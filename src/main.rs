use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use std::io::stdout;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hopstat::cli::Args;
use hopstat::config::Config;
use hopstat::probe::IcmpProber;
use hopstat::render::Renderer;
use hopstat::state::Session;
use hopstat::trace::{EngineError, ProbeEngine};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let config = Config::from(&args);

    let target = resolve_target(&args.target)
        .with_context(|| format!("Failed to resolve target: {}", args.target))?;
    let source = match &args.address {
        Some(addr) => addr
            .parse()
            .with_context(|| format!("Invalid source address: {}", addr))?,
        None => default_source(target),
    };

    let state = Arc::new(RwLock::new(Session::new(target, source, config.clone())));
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        cancel_clone.cancel();
    });

    let (updates_tx, updates_rx) = mpsc::channel(1);
    let engine = ProbeEngine::new(
        config.clone(),
        target,
        source,
        state.clone(),
        IcmpProber,
        cancel.clone(),
        updates_tx,
    );

    let result = if args.json {
        run_json_mode(engine, updates_rx, state.clone(), config.count).await?
    } else {
        run_interactive_mode(engine, updates_rx, state.clone(), cancel, &config).await?
    };

    // A run cut short by silence still produced a valid partial trace.
    if let Err(err) = result {
        match err {
            EngineError::MaxUnknownHops => eprintln!("Warning: {}", err),
            other => return Err(other.into()),
        }
    }

    Ok(())
}

/// Run the engine to completion while silently draining update signals, then
/// print the snapshot as JSON.
async fn run_json_mode(
    engine: ProbeEngine<IcmpProber>,
    mut updates: mpsc::Receiver<()>,
    state: Arc<RwLock<Session>>,
    count: u64,
) -> Result<Result<(), EngineError>> {
    let drain = tokio::spawn(async move { while updates.recv().await.is_some() {} });

    let result = engine.run(count).await;
    drain.await.ok();

    let report = state.read().snapshot();
    serde_json::to_writer_pretty(stdout(), &report)?;
    println!();

    Ok(result)
}

/// Run the engine with the live table repainting on every update.
async fn run_interactive_mode(
    engine: ProbeEngine<IcmpProber>,
    updates: mpsc::Receiver<()>,
    state: Arc<RwLock<Session>>,
    cancel: CancellationToken,
    config: &Config,
) -> Result<Result<(), EngineError>> {
    println!("Start: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));

    let renderer = Renderer::new(state, config.ptr_lookup);
    let render_handle = tokio::spawn(renderer.run(updates, cancel));

    let result = engine.run(config.count).await;

    render_handle
        .await
        .map_err(|_| anyhow::anyhow!("Renderer task panicked"))??;
    println!();

    Ok(result)
}

fn resolve_target(target: &str) -> Result<IpAddr> {
    // Try parsing as IP address first
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    // Resolve hostname; take the first returned address
    format!("{}:0", target)
        .to_socket_addrs()?
        .map(|s| s.ip())
        .next()
        .context("No addresses found for hostname")
}

fn default_source(target: IpAddr) -> IpAddr {
    if target.is_ipv6() {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    } else {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }
}
