//! IPMI temperature monitor entry point: CLI dispatch, signal handlers, async runtime.

mod app;
mod config;
mod control;
mod daemon;
mod error;
mod hardware;
mod scheduler;
mod system;
mod test_utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use app::cli::{Args, HELP_TEXT};
use app::logging::{init_tracing, reload_level, resolve_level};
use config::persistence::{load_config, resolve_config_path};
use scheduler::Scheduler;
use system::executor::{CommandChannel, ProcessChannel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if err.kind() == clap::error::ErrorKind::DisplayHelp {
                print!("{}", HELP_TEXT);
                std::process::exit(0);
            }
            if err.kind() == clap::error::ErrorKind::DisplayVersion {
                println!("ipmi-temp-monitor {} ({})", env!("CARGO_PKG_VERSION"), std::env::consts::ARCH);
                std::process::exit(0);
            }

            eprintln!("{}", err);
            eprintln!("\nFor more information, try '--help'.");
            std::process::exit(1);
        }
    };

    let config_path = resolve_config_path(args.config.as_deref())?;

    // Service management runs before any async setup
    #[cfg(target_os = "linux")]
    if args.install_service {
        return daemon::systemd::install_systemd_service(&config_path);
    }

    #[cfg(target_os = "linux")]
    if args.uninstall_service {
        return daemon::systemd::uninstall_systemd_service();
    }

    #[cfg(not(target_os = "linux"))]
    if args.install_service || args.uninstall_service {
        eprintln!("Service installation is only supported on Linux with systemd.");
        std::process::exit(1);
    }

    // Priority: 1. --log-level flag, 2. LOG_LEVEL env, 3. config file, 4. default (info)
    let env_level = std::env::var("LOG_LEVEL").ok();
    let early_filter = resolve_level(args.log_level.as_deref(), env_level.as_deref(), None);
    init_tracing(early_filter);

    let config = match load_config(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    let filter = resolve_level(
        args.log_level.as_deref(),
        env_level.as_deref(),
        Some(config.settings.log_level.as_str()),
    );
    if filter != early_filter {
        if let Err(e) = reload_level(filter) {
            warn!("Failed to apply configured log level: {}", e);
        }
    }

    if args.show_config {
        println!("\n{}", serde_json::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    info!("IPMI Temp Monitor v{} starting ({})", env!("CARGO_PKG_VERSION"), std::env::consts::OS);
    if args.dry_run {
        warn!("Dry run: fan commands will be logged, not sent");
    }

    let channel: Arc<dyn CommandChannel> = Arc::new(ProcessChannel::new(config.settings.timeouts()));
    let mut scheduler = Scheduler::from_config(&config, channel, args.dry_run)?;
    let cancel = CancellationToken::new();

    if args.test {
        info!("Running in test mode");
        let readings = scheduler.probe(&cancel).await;
        let mut failed = false;
        for (host, reading) in readings {
            match reading {
                Ok(temp) => println!("{}: {} C", host, temp),
                Err(e) => {
                    failed = true;
                    println!("{}: {}", host, e);
                }
            }
        }
        scheduler.shutdown().await;
        std::process::exit(if failed { 1 } else { 0 });
    }

    #[cfg(unix)]
    spawn_log_level_reloader(config_path.clone(), args.log_level.clone(), env_level.clone())?;

    spawn_shutdown_listener(cancel.clone())?;

    scheduler.start(&cancel).await;
    scheduler.run(&cancel).await;

    Ok(())
}

/// SIGHUP re-reads the config file and applies its log level, unless a flag
/// or `LOG_LEVEL` already pins it.
#[cfg(unix)]
fn spawn_log_level_reloader(config_path: PathBuf, flag: Option<String>, env_level: Option<String>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sighup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while sighup.recv().await.is_some() {
            info!("SIGHUP received, reloading log level configuration");
            match load_config(&config_path).await {
                Ok(new_config) => {
                    let level = new_config.settings.log_level;
                    let filter = resolve_level(flag.as_deref(), env_level.as_deref(), Some(level.as_str()));
                    match reload_level(filter) {
                        Ok(()) => info!("Log level reloaded: {}", filter.to_uppercase()),
                        Err(e) => error!("Failed to reload log level: {}", e),
                    }
                }
                Err(e) => error!("Failed to reload config: {:#}", e),
            }
        }
    });
    Ok(())
}

/// Ctrl+C, or SIGTERM on Unix, cancels the shared token.
fn spawn_shutdown_listener(cancel: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received (Ctrl+C)"),
                _ = sigterm.recv() => info!("Shutdown signal received (SIGTERM)"),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received (Ctrl+C)");
        }

        cancel.cancel();
    });
    Ok(())
}
