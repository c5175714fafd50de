use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use onewiki::auth::credentials;
use onewiki::config::Config;
use onewiki::server;
use onewiki::wiki::Wiki;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    let store = credentials::ensure(&cfg.wiki.passwd_path, &cfg.wiki.realm)
        .with_context(|| format!("loading credentials from {}", cfg.wiki.passwd_path.display()))?;

    std::fs::create_dir_all(&cfg.wiki.data_dir)
        .with_context(|| format!("creating data directory {}", cfg.wiki.data_dir.display()))?;
    tracing::info!(data_dir = %cfg.wiki.data_dir.display(), "Serving wiki");

    let wiki = Arc::new(Wiki::from_config(&cfg, Arc::new(store)));

    tokio::select! {
        res = server::listener::run(&cfg.server, wiki) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
