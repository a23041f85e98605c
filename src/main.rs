use {
    dotenv::dotenv,
    proxwatch::{ui, Config, Observer},
    tokio::signal::unix::{signal, Signal, SignalKind},
    tokio_util::sync::CancellationToken,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = Config::from_env()?.apply_args(std::env::args().skip(1))?;

    // Logs go to stderr; the table owns stdout via the alternate screen.
    // RUST_LOG overrides the --debug default.
    let default_filter = if config.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("Starting proxwatch");
    log::info!("   ├─ Socket: {}", config.socket_path.display());
    match &config.scanner_path {
        Some(path) => log::info!("   ├─ Scanner: {} on {}", path.display(), config.hci_device),
        None => log::info!("   ├─ Scanner: none (listen-only)"),
    }
    log::info!(
        "   └─ Refresh every {}s, expire after {}s idle",
        config.refresh_interval.as_secs(),
        config.idle_timeout.as_secs()
    );

    let shutdown = CancellationToken::new();
    let sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(wait_for_signal(sigterm, shutdown.clone()));

    let mut observer = Observer::new(config);
    observer.start().await?;

    let mut terminal = match ui::TerminalUi::enter() {
        Ok(terminal) => terminal,
        Err(e) => {
            observer.stop().await;
            return Err(e.into());
        }
    };

    let ui_result = ui::run_ui(&mut terminal, observer.snapshots(), shutdown.clone()).await;

    // Scanner, socket and aggregator go first; the terminal is released last
    observer.stop().await;
    terminal.leave()?;

    ui_result?;
    log::info!("proxwatch stopped");
    Ok(())
}

async fn wait_for_signal(mut sigterm: Signal, shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("SIGINT received"),
        _ = sigterm.recv() => log::info!("SIGTERM received"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}
