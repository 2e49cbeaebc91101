//! Gateway builder and accept loop.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use quizcast_delivery::DeliveryBuffers;
use quizcast_protocol::RoomCode;
use quizcast_room::{
    AnswerProcessor, CodeAllocator, QuestionCatalog, Room, RoomCache, RoomLifecycle,
};
use quizcast_session::{Authenticator, PeerRegistry};
use quizcast_store::{Cache, Store};

use crate::GatewayConfig;
use crate::error::GatewayError;
use crate::ws::handle_connection;

/// Shared server state, one `Arc` cloned into every connection task.
pub(crate) struct GatewayState<S, C, A> {
    pub(crate) lifecycle: Arc<RoomLifecycle<S, C>>,
    pub(crate) answers: Arc<AnswerProcessor<S, C>>,
    pub(crate) registry: PeerRegistry,
    pub(crate) buffers: Arc<DeliveryBuffers>,
    pub(crate) auth: A,
}

/// Configures and builds a [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
        }
    }

    /// Sets the listen address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and assembles the service stack.
    pub async fn build<S, C, A>(
        self,
        store: Arc<S>,
        catalog: Arc<C>,
        auth: A,
    ) -> Result<Gateway<S, C, A>, GatewayError>
    where
        S: Store<RoomCode, Room>,
        C: QuestionCatalog,
        A: Authenticator,
    {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "gateway listening");

        let cache = Arc::new(Cache::new(store, self.config.cache.clone()));
        let buffers = Arc::new(DeliveryBuffers::new(self.config.delivery.clone()));
        let lifecycle = Arc::new(
            RoomLifecycle::new(Arc::clone(&cache), Arc::clone(&catalog))
                .with_allocator(CodeAllocator::new(self.config.retry.clone())),
        );
        let answers = Arc::new(AnswerProcessor::new(Arc::clone(&cache), catalog));

        Ok(Gateway {
            listener,
            cache,
            config: self.config,
            state: Arc::new(GatewayState {
                lifecycle,
                answers,
                registry: PeerRegistry::new(),
                buffers,
                auth,
            }),
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound, ready-to-run trivia gateway.
pub struct Gateway<S, C, A> {
    listener: TcpListener,
    cache: Arc<RoomCache<S>>,
    config: GatewayConfig,
    state: Arc<GatewayState<S, C, A>>,
}

impl<S, C, A> Gateway<S, C, A>
where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
    A: Authenticator,
{
    /// The bound local address, useful when binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// A transport-free handle onto the same services this gateway runs.
    pub fn api(&self) -> crate::Api<S, C> {
        crate::Api::new(
            Arc::clone(&self.state.lifecycle),
            Arc::clone(&self.state.answers),
        )
    }

    /// Accepts connections until the task is dropped. Each connection
    /// gets its own handler task; maintenance (cache feed and sweep,
    /// buffer expiry) runs alongside.
    pub async fn run(self) -> Result<(), GatewayError> {
        let _maintenance = self.spawn_maintenance();
        tracing::info!("gateway running");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&self.state);
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state, config).await {
                            tracing::debug!(%addr, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }

    fn spawn_maintenance(&self) -> Vec<JoinHandle<()>> {
        let (feed, sweep) = self.cache.spawn_maintenance();
        let buffer_sweep = self.state.buffers.spawn_sweep();
        vec![feed, sweep, buffer_sweep]
    }
}
