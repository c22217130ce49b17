//! WebTransport server implementation
//!
//! Each client opens one bidirectional stream carrying framed text
//! records. The transport forwards records to the session host and
//! drains the connection's outbound queue back onto the stream.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::net::framing::{read_record, write_record, FramingError};
use crate::net::game_session::SessionCommand;
use crate::net::session::{ConnectionHandle, ConnectionId, Outbound};
use crate::net::tls::TlsIdentity;

/// WebTransport server
pub struct WebTransportServer {
    config: ServerConfig,
    tls: TlsIdentity,
    commands: mpsc::Sender<SessionCommand>,
    metrics: Arc<Metrics>,
}

impl WebTransportServer {
    /// Load TLS material and prepare the server
    pub async fn new(
        config: ServerConfig,
        commands: mpsc::Sender<SessionCommand>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let tls = TlsIdentity::load(&config).await?;
        Ok(Self {
            config,
            tls,
            commands,
            metrics,
        })
    }

    /// Get the certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        self.tls.cert_hash()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Accept connections until the endpoint fails
    pub async fn run(self) -> anyhow::Result<()> {
        use wtransport::Endpoint;

        let builder = wtransport::ServerConfig::builder();
        let builder = match explicit_bind(&self.config) {
            Some(addr) => builder.with_bind_address(addr),
            // Dual-stack bind so both localhost and LAN clients reach the pond
            None => builder.with_bind_default(self.config.port),
        };
        let bind_addr = self.bind_addr();
        let server_config = builder.with_identity(self.tls.identity).build();

        let server = Endpoint::server(server_config)?;
        info!("WebTransport server listening on {}", bind_addr);

        loop {
            let incoming = server.accept().await;
            let commands = self.commands.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, commands, metrics).await {
                    warn!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Socket to bind when the config names a specific interface.
/// An unspecified address means every interface on both IP stacks.
pub fn explicit_bind(config: &ServerConfig) -> Option<SocketAddr> {
    if config.bind_address.is_unspecified() {
        None
    } else {
        Some(SocketAddr::new(config.bind_address, config.port))
    }
}

/// Handle a single WebTransport connection
async fn handle_connection(
    incoming: wtransport::endpoint::IncomingSession,
    commands: mpsc::Sender<SessionCommand>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;
    debug!(
        "New session request: authority {}, path {}",
        session_request.authority(),
        session_request.path()
    );

    let connection = session_request.accept().await?;
    let (send, recv) = connection.accept_bi().await?;

    let id = serve_stream(recv, send, &commands, &metrics).await;
    debug!("Connection {} closed", id);

    // Dropping the last handle closes the QUIC connection
    drop(connection);
    Ok(())
}

/// Pump one client stream until either side ends it.
///
/// Registers the connection with the session host, forwards every inbound
/// record, writes queued outbound records, and always reports the
/// disconnect before returning.
pub async fn serve_stream<R, W>(
    mut recv: R,
    mut send: W,
    commands: &mpsc::Sender<SessionCommand>,
    metrics: &Metrics,
) -> ConnectionId
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (handle, mut outbound) = ConnectionHandle::channel();
    let id = handle.id;

    metrics.connection_opened();
    if commands.send(SessionCommand::Connect(handle)).await.is_err() {
        warn!("Session host is gone, dropping connection {}", id);
        metrics.connection_closed();
        return id;
    }

    let writer = async {
        while let Some(item) = outbound.recv().await {
            match item {
                Outbound::Text(text) => {
                    if let Err(e) = write_record(&mut send, &text).await {
                        debug!("Write to {} failed: {}", id, e);
                        return;
                    }
                }
                Outbound::Close => break,
            }
        }
        // Close requested, or the session released this connection
        let _ = send.shutdown().await;
    };

    let reader = async {
        loop {
            match read_record(&mut recv).await {
                Ok(text) => {
                    metrics.record_received(text.len());
                    let command = SessionCommand::Inbound { connection: id, text };
                    if commands.send(command).await.is_err() {
                        break;
                    }
                }
                Err(FramingError::ConnectionClosed) => break,
                Err(e) => {
                    warn!("Dropping connection {}: {}", id, e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    let _ = commands.send(SessionCommand::Disconnect(id)).await;
    metrics.connection_closed();
    id
}
