//! Development trivia server: in-memory store, uniform question catalog,
//! and the token-as-player-id dev authenticator. Connect a WebSocket
//! client and send `{"event":"auth","data":{"token":"1:alice"}}` to get
//! started.

use std::sync::Arc;

use quizcast::GatewayBuilder;
use quizcast_room::StaticCatalog;
use quizcast_session::DevAuthenticator;
use quizcast_store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let gateway = GatewayBuilder::new()
        .bind("0.0.0.0:9090")
        .build(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticCatalog::uniform(25)),
            DevAuthenticator,
        )
        .await?;

    tracing::info!("trivia server listening on 0.0.0.0:9090");
    gateway.run().await?;
    Ok(())
}
