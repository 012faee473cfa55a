use anyhow::Context;
use clap::Parser;
use runecast::agent::HttpDispatcherFactory;
use runecast::api::{create_router, AppState};
use runecast::cli::{Cli, Commands};
use runecast::config::AppConfig;
use runecast::coordination::{install_signal_handlers, GracefulShutdown};
use runecast::error::{Result, RunecastError};
use std::sync::Arc;
use tracing::{error, info, warn};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.clone().unwrap_or_default() {
        Commands::Serve { port, host } => {
            let mut config = load_config(&cli.config)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            init_logging(&config.logging);
            run_server(config).await?;
        }
        Commands::CheckConfig => {
            init_logging_simple();
            let config = load_config(&cli.config)?;
            println!("Configuration OK ({})", cli.config);
            println!("  listen:     {}:{}", config.server.host, config.server.port);
            println!("  dispatcher: {}", config.dispatcher.base_url);
            println!(
                "  cadences:   blockchain {}s, social {}s, trading {}s",
                config.monitor.blockchain_interval_secs,
                config.monitor.social_interval_secs,
                config.monitor.trading_interval_secs
            );
        }
    }

    Ok(())
}

fn load_config(dir: &str) -> Result<AppConfig> {
    let config = AppConfig::load_from(dir)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("config error: {}", e);
        }
        return Err(RunecastError::Config(config::ConfigError::Message(format!(
            "{} invalid setting(s)",
            errors.len()
        ))));
    }
    Ok(config)
}

async fn run_server(config: AppConfig) -> Result<()> {
    let shutdown = Arc::new(GracefulShutdown::new(config.shutdown.clone()));
    install_signal_handlers(shutdown.clone());

    let factory = Arc::new(HttpDispatcherFactory::new(config.dispatcher.clone())?);
    let state = AppState::new(&config, factory, shutdown.clone());
    let router = create_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);
    info!("Dispatching agent commands to {}", config.dispatcher.base_url);

    let stop = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                stop.wait_for_request().await;
            })
            .await
    });

    tokio::select! {
        signal = shutdown.wait_for_request() => {
            info!("Stopping on {} signal", signal);
        }
        result = &mut server => {
            // The server only returns on its own if it failed
            let reason = match result {
                Ok(Ok(())) => "server exited".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };
            error!("Server stopped unexpectedly: {}", reason);
            shutdown.request_shutdown(runecast::coordination::ShutdownSignal::Emergency);
            let _ = shutdown.execute(&state.agents).await;
            return Err(RunecastError::Internal(reason));
        }
    }

    match shutdown.execute(&state.agents).await {
        Ok(report) => info!(
            sessions_abandoned = report.sessions_abandoned,
            monitor_loops_stopped = report.monitor_loops_stopped,
            "Shutdown complete"
        ),
        Err(e) => warn!("Shutdown sequence failed: {}", e),
    }

    match server.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(RunecastError::Internal(format!("server task failed: {}", e))),
    }
}
