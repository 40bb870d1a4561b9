//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Parses client messages and routes them through the session directory.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::ServerConfig;
use crate::core::cell::Direction;
use crate::network::directory::{ConnectionId, SessionDirectory};
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage};
use crate::persistence::MatchRecorder;

/// Time given to a connection to flush its queue after leaving.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Remote address.
    addr: SocketAddr,
    /// Connection time.
    connected_at: Instant,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Rooms and memberships.
    directory: Arc<SessionDirectory>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>,
    /// Connection id source.
    next_connection: AtomicU64,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, recorder: Arc<dyn MatchRecorder>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let directory = Arc::new(SessionDirectory::new(config.room.clone(), recorder));

        Self {
            config,
            directory,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            next_connection: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    /// Bind and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Accept connections on `listener` until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr).await;
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.directory.shutdown().await;
        Ok(())
    }

    /// Handle a new WebSocket connection.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let connection = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let clients = self.clients.clone();
        let directory = self.directory.clone();
        let outbound_buffer = self.config.outbound_buffer.max(1);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // Register before the handshake so the limit counts pending clients
        clients.write().await.insert(connection, ConnectedClient {
            addr,
            connected_at: Instant::now(),
        });

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    clients.write().await.remove(&connection);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(outbound_buffer);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        Self::handle_client_message(connection, client_msg, &directory, &msg_tx).await;
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", connection, e);
                                        reply(&msg_tx, ServerMessage::error(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        ));
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                reply(&msg_tx, ServerMessage::error(
                                    ErrorCode::InvalidInput,
                                    "Binary frames are not supported",
                                ));
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        reply(&msg_tx, ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        });
                        break;
                    }
                }
            }

            // Cleanup: leave the room so it drops its sender clone, then let
            // the queue drain.
            directory.on_disconnect(connection).await;
            drop(msg_tx);
            if tokio::time::timeout(FLUSH_TIMEOUT, sender_task).await.is_err() {
                debug!("Outbound queue for {} did not drain in time", connection);
            }

            if let Some(client) = clients.write().await.remove(&connection) {
                info!(
                    "Client {} ({}) cleaned up after {:?}",
                    connection,
                    client.addr,
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        connection: ConnectionId,
        msg: ClientMessage,
        directory: &SessionDirectory,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::JoinRoom { room_code, display_name } => {
                let room_code = room_code.trim();
                if room_code.is_empty() {
                    reply(sender, ServerMessage::error(ErrorCode::InvalidInput, "Room code is required"));
                    return;
                }

                // Refusals are answered by the directory
                let _ = directory
                    .join(connection, room_code, display_name.trim(), sender.clone())
                    .await;
            }
            ClientMessage::LeaveRoom => {
                directory.leave(connection).await;
            }
            ClientMessage::Intent { direction } => match Direction::try_from(direction) {
                Ok(direction) => {
                    directory.route_intent(connection, direction).await;
                }
                Err(e) => {
                    debug!("Rejected intent from {}: {}", connection, e);
                    reply(sender, ServerMessage::error(ErrorCode::InvalidInput, e.to_string()));
                }
            },
            ClientMessage::StartGame => {
                directory.route_start(connection).await;
            }
            ClientMessage::Ping { timestamp } => {
                reply(sender, ServerMessage::Pong {
                    timestamp,
                    server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
                });
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get live room count.
    pub async fn room_count(&self) -> usize {
        self.directory.room_count().await
    }

    /// The session directory.
    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }
}

/// Queue a reply to the requesting connection without waiting.
fn reply(sender: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    if let Err(e) = sender.try_send(message) {
        debug!("Dropped reply: {}", e);
    }
}
