use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use detlink::config::Config;
use detlink::detection::{DetectionView, load_replay};
use detlink::net::{ChannelListener, IngestClient, ReplayPeer, ReplayPeerConfig, StreamEvent, validate_host};

mod cli;

use cli::Cli;
use cli::commands::{Commands, WatchArgs};
use cli::console::{ConsoleRenderer, print_status};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("detlink")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("detlink.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // Setup env_logger with file output
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;

    match &cli.command {
        // Default: watch the configured peer
        None => runtime.block_on(run_watch(&WatchArgs::default(), config)),
        Some(Commands::Watch(args)) => runtime.block_on(run_watch(args, config)),
        Some(Commands::Replay {
            file,
            listen,
            interval_ms,
            framing,
            repeat,
        }) => {
            let peer_config = ReplayPeerConfig {
                framing: *framing,
                interval: Duration::from_millis(*interval_ms),
                repeat: *repeat,
            };
            runtime.block_on(run_replay(file, listen, peer_config))
        }
        Some(Commands::CheckHost { host }) => handle_check_host(host),
    }
}

async fn run_watch(args: &WatchArgs, mut config: Config) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let mut client = IngestClient::from_config(&config);
    client.set_status_indicator(print_status);

    // View draws detections; the channel watcher notices disconnects
    let view = Rc::new(RefCell::new(DetectionView::new(
        ConsoleRenderer::default(),
        config.model.resolution(),
        config.canvas.size(),
    )));
    client.subscribe(Rc::clone(&view));

    let (watcher, mut events) = ChannelListener::new();
    client.subscribe(Rc::new(RefCell::new(watcher)));

    println!(
        "{} {}:{} ({} framing)",
        "Connecting to".cyan(),
        config.connection.host,
        config.connection.port,
        client.framing()
    );
    client.connect_and_wait().await.context("Failed to connect")?;

    // Stop on Ctrl-C or when the peer goes away
    let shutdown = async move {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Interrupted, shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(StreamEvent::Disconnected) | None => break,
                    Some(StreamEvent::Message(_)) => {}
                },
            }
        }
    };

    let stats = client.run_until(shutdown).await;
    let view = view.borrow();
    info!("Ingest stats: {:?}, view stats: {:?}", stats, view.stats());
    println!(
        "{} {} frames, {} applied, {} rejected",
        "Done:".green(),
        stats.frames_dispatched,
        view.stats().applied,
        view.stats().rejected
    );
    Ok(())
}

async fn run_replay(file: &PathBuf, listen: &str, peer_config: ReplayPeerConfig) -> Result<()> {
    let messages = load_replay(file).context(format!("Failed to load replay file {}", file.display()))?;
    let peer = ReplayPeer::bind(listen, peer_config).await?;
    println!(
        "{} {} messages on {}",
        "Replaying".cyan(),
        messages.len(),
        peer.local_addr()?
    );

    tokio::select! {
        result = peer.serve_forever(&messages) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping replay"),
    }
    Ok(())
}

fn handle_check_host(host: &str) -> Result<()> {
    match validate_host(host) {
        Ok(()) => {
            println!("{} {}", "Valid:".green(), host);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "Invalid:".red(), e);
            Err(e.into())
        }
    }
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, config).context("Application failed")?;

    Ok(())
}
