//! # Quizcast
//!
//! Real-time multiplayer trivia backend. Players join short-code rooms
//! over WebSocket, the host starts a game, answers are scored server-side,
//! and every room broadcast is tracked until its recipients acknowledge
//! it.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use quizcast::GatewayBuilder;
//! use quizcast_room::StaticCatalog;
//! use quizcast_session::DevAuthenticator;
//! use quizcast_store::MemoryStore;
//!
//! # async fn run() -> Result<(), quizcast::GatewayError> {
//! let gateway = GatewayBuilder::new()
//!     .bind("0.0.0.0:9090")
//!     .build(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(StaticCatalog::uniform(25)),
//!         DevAuthenticator,
//!     )
//!     .await?;
//! gateway.run().await
//! # }
//! ```

mod api;
mod config;
mod dispatch;
mod error;
mod server;
mod ws;

pub use api::{Api, ApiResponse};
pub use config::GatewayConfig;
pub use error::{GatewayError, error_code};
pub use server::{Gateway, GatewayBuilder};
