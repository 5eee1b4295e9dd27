//! Pied Piper binary entry point.

use clap::Parser;
use pied_piper_lb::config::{
    BasicValidator, ConfigLoader, LoadBalancerValidator, LogFormat, LogLevel, LoggingConfig,
};
use pied_piper_lb::controller::{ConfigReloader, ControllerServer, SwitchSettings};
use pied_piper_lb::module::{ModuleConfig, ModuleContract};
use pied_piper_lb::modules::load_balancer::LoadBalancer;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pied-piper-lb", version, about = "OpenFlow 1.3 L4 load-balancing controller")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, env = "PIED_PIPER_CONFIG", default_value = "pied-piper.toml")]
    config: PathBuf,

    /// Override the listener bind address.
    #[arg(long, env = "PIED_PIPER_BIND")]
    bind: Option<IpAddr>,

    /// Override the OpenFlow listener port.
    #[arg(long, env = "PIED_PIPER_PORT")]
    port: Option<u16>,

    /// Override the log level.
    #[arg(long, env = "PIED_PIPER_LOG_LEVEL")]
    log_level: Option<LogLevel>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_string()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            },
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            },
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::new().load_or_default(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.controller.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.controller.port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging);
    info!(
        name = %config.controller.name,
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "Starting controller"
    );

    let validating_loader = || {
        ConfigLoader::new()
            .with_validator(BasicValidator)
            .with_validator(LoadBalancerValidator)
    };
    validating_loader().validate(&config)?;

    let mut balancer = LoadBalancer::new();
    balancer.init(ModuleConfig::from_section(&config.load_balancer)?)?;
    balancer.start()?;
    info!(status = %balancer.status(), "Load balancer ready");

    let balancer = Arc::new(Mutex::new(balancer));
    let settings = SwitchSettings {
        echo_interval: config.controller.echo_interval,
    };
    let server =
        ControllerServer::bind(config.controller.listen_addr(), Arc::clone(&balancer), settings)
            .await?;

    let reloader = ConfigReloader::new(&cli.config, validating_loader(), Arc::clone(&balancer));
    #[cfg(unix)]
    let reload_task = Some(reloader.spawn_on_hangup()?);
    #[cfg(not(unix))]
    let reload_task: Option<tokio::task::JoinHandle<()>> = {
        drop(reloader);
        None
    };

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server = tokio::spawn(server.run(shutdown_rx));

    shutdown_signal().await;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(()).await;
    if let Some(task) = reload_task {
        task.abort();
    }

    match server.await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => error!(error = %e, "Controller exited with error"),
        Err(e) => error!(error = %e, "Controller task failed"),
    }

    let mut balancer = balancer.lock().await;
    balancer.stop()?;
    info!(
        "Final metrics:\n{}",
        balancer.metrics().to_prometheus("pied_piper")
    );

    Ok(())
}
