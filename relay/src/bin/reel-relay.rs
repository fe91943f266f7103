use eyre::Context;
use reel_relay::{Config, Relay, server};
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // A missing .env is fine; the environment may already be set.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => tracing::debug!("no .env file"),
        Err(e) => return Err(e).context("load .env"),
    }

    let config = Config::from_env().context("read configuration")?;
    tracing::debug!(config = ?config, "got configuration");

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "listening for webhooks");

    let relay = Arc::new(Relay::new(config).context("set up relay")?);
    server::serve(listener, relay, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await
}
