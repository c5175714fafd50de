use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::http::connection::Connection;
use crate::wiki::Wiki;

pub async fn run(cfg: &ServerConfig, wiki: Arc<Wiki>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    serve(listener, wiki, cfg.max_body_bytes).await
}

/// Accepts connections forever, one task per connection.
pub async fn serve(listener: TcpListener, wiki: Arc<Wiki>, max_body: usize) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::debug!("Accepted connection from {}", peer);

        let wiki = Arc::clone(&wiki);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, wiki, max_body);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
