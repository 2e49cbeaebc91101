//! Identity verification hook.
//!
//! Quizcast does not validate credentials itself; the deployment plugs
//! its provider in behind [`Authenticator`], and the gateway calls it
//! exactly once per connection, before any gameplay event is accepted.

use std::future::Future;

use quizcast_protocol::PlayerId;

use crate::SessionError;

/// A verified player identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub player_id: PlayerId,
    pub display_name: String,
    pub avatar: Option<String>,
}

/// Validates an auth token and resolves the player behind it.
///
/// Implementations must be cheap to share: the gateway holds one
/// instance for the whole server and calls it from every connection
/// task.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Identity, SessionError>> + Send;
}

/// Development-only authenticator: accepts `"<id>"` or `"<id>:<name>"`
/// tokens verbatim. Never deploy this.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevAuthenticator;

impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        let (id_part, name) = match token.split_once(':') {
            Some((id, name)) if !name.is_empty() => (id, Some(name.to_owned())),
            Some((id, _)) => (id, None),
            None => (token, None),
        };
        let id: u64 = id_part
            .parse()
            .map_err(|_| SessionError::InvalidToken("not a numeric player id".into()))?;
        let player_id = PlayerId(id);
        Ok(Identity {
            player_id,
            display_name: name.unwrap_or_else(|| format!("player-{id}")),
            avatar: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dev_auth_plain_id() {
        let identity = DevAuthenticator.authenticate("42").await.unwrap();
        assert_eq!(identity.player_id, PlayerId(42));
        assert_eq!(identity.display_name, "player-42");
    }

    #[tokio::test]
    async fn test_dev_auth_id_with_name() {
        let identity = DevAuthenticator.authenticate("7:alice").await.unwrap();
        assert_eq!(identity.player_id, PlayerId(7));
        assert_eq!(identity.display_name, "alice");
    }

    #[tokio::test]
    async fn test_dev_auth_rejects_garbage() {
        let result = DevAuthenticator.authenticate("not-a-number").await;
        assert!(matches!(result, Err(SessionError::InvalidToken(_))));
    }
}
