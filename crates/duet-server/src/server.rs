//! `DuetServer` builder and accept loop.
//!
//! This is the entry point for running the service. It ties the layers
//! together: transport → protocol → broadcast → rooms, plus the reaper.

use std::sync::Arc;
use std::time::Duration;

use duet_broadcast::EventHub;
use duet_protocol::JsonCodec;
use duet_room::{Reaper, ReaperConfig, RoomConfig, RoomRegistry};
use duet_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::ServerError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) registry: Arc<Mutex<RoomRegistry>>,
    pub(crate) hub: Arc<EventHub>,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a duet server.
///
/// # Example
///
/// ```rust,no_run
/// use duet_server::DuetServer;
///
/// # async fn run() -> Result<(), duet_server::ServerError> {
/// let server = DuetServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct DuetServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
    reaper_config: ReaperConfig,
}

impl DuetServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_config: RoomConfig::default(),
            reaper_config: ReaperConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the age past which unpaired waiting rooms are evicted.
    pub fn waiting_ttl(mut self, ttl: Duration) -> Self {
        self.reaper_config.waiting_ttl = ttl;
        self
    }

    /// Sets the time between reaper sweeps.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.reaper_config.interval = interval;
        self
    }

    /// Sets the room configuration.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Binds the transport, wires up the registry and hub, and spawns
    /// the reaper.
    pub async fn build(self) -> Result<DuetServer, ServerError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let hub = Arc::new(EventHub::new());
        let registry = Arc::new(Mutex::new(RoomRegistry::new(
            self.room_config,
            Arc::clone(&hub),
        )));
        let reaper = Reaper::spawn(Arc::clone(&registry), self.reaper_config);

        let state = Arc::new(ServerState {
            registry,
            hub,
            codec: JsonCodec,
        });

        Ok(DuetServer {
            transport,
            state,
            _reaper: reaper,
        })
    }
}

impl Default for DuetServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running duet server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DuetServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
    /// Keeps the reaper alive for the server's lifetime; dropping the
    /// handle cancels the sweep task.
    _reaper: duet_room::ReaperHandle,
}

impl DuetServer {
    /// Creates a new builder.
    pub fn builder() -> DuetServerBuilder {
        DuetServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop.
    ///
    /// Each accepted connection gets its own handler task. Runs until
    /// the process is terminated.
    pub async fn run(mut self) -> Result<(), ServerError> {
        tracing::info!("duet server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
