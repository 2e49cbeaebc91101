//! Session layer for Quizcast: who a connection belongs to, and where
//! its outbound messages go.
//!
//! - [`Authenticator`] — seam to the deployment's identity provider;
//!   the gateway calls it once per connection, before anything else
//! - [`PeerRegistry`] — live connections: player to outbound channel,
//!   plus the room each connection is currently bound to

mod auth;
mod error;
mod registry;

pub use auth::{Authenticator, DevAuthenticator, Identity};
pub use error::SessionError;
pub use registry::{OutboundSender, PeerRegistry};
