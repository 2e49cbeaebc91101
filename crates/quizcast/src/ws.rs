//! Per-connection WebSocket plumbing.
//!
//! Flow: accept, fail-closed auth handshake, then split the socket. A
//! writer task drains the connection's outbound channel; the reader loop
//! decodes client events and dispatches them. A drop guard runs the
//! disconnect teardown even if the handler exits early.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use quizcast_protocol::{
    ClientEvent, Codec, ErrorCode, JsonCodec, PlayerId, Reply, RoomCode, ServerEvent,
};
use quizcast_room::{QuestionCatalog, Room};
use quizcast_session::{Authenticator, Identity, OutboundSender};
use quizcast_store::Store;

use crate::GatewayConfig;
use crate::dispatch::{dispatch, handle_disconnect};
use crate::error::GatewayError;
use crate::server::GatewayState;

type WsStream = WebSocketStream<TcpStream>;

/// Runs the disconnect teardown when the handler exits, panics included.
/// `Drop` is synchronous, so the async cleanup is spawned.
struct DisconnectGuard<S, C, A>
where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
    A: Authenticator,
{
    player: PlayerId,
    channel: OutboundSender,
    state: Arc<GatewayState<S, C, A>>,
}

impl<S, C, A> Drop for DisconnectGuard<S, C, A>
where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
    A: Authenticator,
{
    fn drop(&mut self) {
        let player = self.player;
        let channel = self.channel.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            handle_disconnect(&state, player, &channel).await;
        });
    }
}

/// Handles one connection from TCP accept to close.
pub(crate) async fn handle_connection<S, C, A>(
    stream: TcpStream,
    state: Arc<GatewayState<S, C, A>>,
    config: GatewayConfig,
) -> Result<(), GatewayError>
where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
    A: Authenticator,
{
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();
    let codec = JsonCodec;

    let identity = match authenticate(&mut sink, &mut source, &state, &config).await? {
        Some(identity) => identity,
        None => return Err(GatewayError::HandshakeAborted),
    };
    let player = identity.player_id;
    tracing::info!(%player, name = %identity.display_name, "connection authenticated");

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    // A second login as the same player displaces the old connection;
    // its writer ends once the registry's sender clone is gone.
    state.registry.register(player, tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match encode_text(&codec, &event) {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "outbound event encoding failed");
                }
            }
        }
        let _ = sink.close().await;
    });

    if tx.send(ServerEvent::AuthOk { player_id: player }).is_err() {
        return Err(GatewayError::HandshakeAborted);
    }

    let _guard = DisconnectGuard {
        player,
        channel: tx.clone(),
        state: Arc::clone(&state),
    };

    loop {
        let frame = match timeout(config.idle_timeout, next_frame(&mut source)).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%player, "connection closed");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%player, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%player, "connection idle timeout");
                break;
            }
        };

        let event: ClientEvent = match codec.decode(&frame) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(%player, error = %e, "undecodable client event");
                let reply = Reply::err(ErrorCode::Validation, "malformed event");
                if tx.send(ServerEvent::Reply(reply)).is_err() {
                    break;
                }
                continue;
            }
        };

        let reply = dispatch(&state, &identity, event).await;
        if tx.send(ServerEvent::Reply(reply)).is_err() {
            break;
        }
    }

    drop(tx);
    drop(_guard);
    let _ = writer.await;
    Ok(())
}

/// Fail-closed handshake: the first decodable frame must be `auth`, it
/// must arrive within the handshake timeout, and the credential must
/// verify. Anything else gets an auth-failure reply and a closed socket.
/// Rejection reasons are logged, never sent to the peer.
async fn authenticate<S, C, A>(
    sink: &mut SplitSink<WsStream, Message>,
    source: &mut SplitStream<WsStream>,
    state: &Arc<GatewayState<S, C, A>>,
    config: &GatewayConfig,
) -> Result<Option<Identity>, GatewayError>
where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
    A: Authenticator,
{
    let codec = JsonCodec;
    let token = match timeout(config.handshake_timeout, next_frame(source)).await {
        Ok(Ok(Some(data))) => match codec.decode::<ClientEvent>(&data) {
            Ok(ClientEvent::Auth { token }) => token,
            Ok(other) => {
                tracing::info!(event = ?other, "pre-auth event rejected");
                refuse(sink, "authenticate first").await;
                return Ok(None);
            }
            Err(e) => {
                tracing::debug!(error = %e, "undecodable handshake frame");
                refuse(sink, "authenticate first").await;
                return Ok(None);
            }
        },
        Ok(Ok(None)) => return Ok(None),
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            tracing::info!("handshake timed out");
            refuse(sink, "authentication timed out").await;
            return Ok(None);
        }
    };

    match state.auth.authenticate(&token).await {
        Ok(identity) => Ok(Some(identity)),
        Err(e) => {
            tracing::info!(error = %e, "authentication rejected");
            refuse(sink, "authentication failed").await;
            Ok(None)
        }
    }
}

/// Sends an auth-failure reply and closes. Best effort on a connection
/// we are abandoning anyway.
async fn refuse(sink: &mut SplitSink<WsStream, Message>, message: &str) {
    let reply = ServerEvent::Reply(Reply::err(ErrorCode::Auth, message));
    if let Ok(text) = encode_text(&JsonCodec, &reply) {
        let _ = sink.send(Message::Text(text.into())).await;
    }
    let _ = sink.close().await;
}

/// Reads the next data frame, skipping ping/pong. `None` on clean close.
async fn next_frame(source: &mut SplitStream<WsStream>) -> Result<Option<Vec<u8>>, GatewayError> {
    while let Some(msg) = source.next().await {
        match msg? {
            Message::Text(text) => return Ok(Some(text.as_bytes().to_vec())),
            Message::Binary(data) => return Ok(Some(data.into())),
            Message::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

/// Encodes an event as a UTF-8 JSON text frame.
fn encode_text(codec: &JsonCodec, event: &ServerEvent) -> Result<String, GatewayError> {
    let bytes = codec.encode(event)?;
    String::from_utf8(bytes).map_err(|e| {
        GatewayError::Protocol(quizcast_protocol::ProtocolError::InvalidMessage(
            e.to_string(),
        ))
    })
}
