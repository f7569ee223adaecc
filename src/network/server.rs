//! WebSocket Game Server
//!
//! Async WebSocket server for turn submission and game administration.
//! Each text frame is one [`ClientMessage`] and receives one reply.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, RwLock, broadcast};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::ServerConfig;
use crate::network::protocol::{
    ClientMessage, ErrorCode, GameView, InputView, ServerError, ServerMessage, VersionView,
};
use crate::network::session::{SessionError, SessionManager};
use crate::persistence::error::StoreError;

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
    /// Last activity.
    last_activity: Instant,
    /// Asks the connection task to close; taken once fired.
    close: Option<oneshot::Sender<()>>,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Loaded games.
    sessions: Arc<SessionManager>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, sessions: Arc<SessionManager>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            sessions,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run until shutdown.
    #[instrument(skip(self), fields(server_id = %self.config.server_id))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);

        let cleanup_clients = self.clients.clone();
        let idle_timeout = self.config.idle_timeout;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, idle_timeout).await;
        });

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
                            self.handle_connection(stream, addr);
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

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let sessions = self.sessions.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
            let (close_tx, mut close_rx) = oneshot::channel();

            clients.write().await.insert(addr, ConnectedClient {
                last_activity: Instant::now(),
                close: Some(close_tx),
            });

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
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(client) = clients.write().await.get_mut(&addr) {
                                    client.last_activity = Instant::now();
                                }

                                let reply = match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => handle_client_message(&sessions, client_msg).await,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        ServerMessage::error(ErrorCode::InvalidMessage, format!("Invalid message format: {e}"))
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(ServerMessage::error(
                                    ErrorCode::InvalidMessage,
                                    "Binary frames are not supported",
                                )).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                    _ = &mut close_rx => {
                        debug!("Closing idle client {}", addr);
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Idle timeout".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Let queued replies flush before closing.
            drop(msg_tx);
            let _ = sender_task.await;

            clients.write().await.remove(&addr);
            info!("Client {} cleaned up", addr);
        });
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        idle_timeout: Duration,
    ) {
        let mut interval = interval(idle_timeout.clamp(Duration::from_millis(100), Duration::from_secs(60)));

        loop {
            interval.tick().await;

            let closed = close_idle(&mut *clients.write().await, idle_timeout, Instant::now());
            if closed > 0 {
                info!("Closing {} idle clients", closed);
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

    /// Get loaded game count.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}

/// Signal every client idle longer than `idle_timeout` to close.
///
/// Entries stay in the map until their connection task exits, so the
/// connection count covers sockets that are still open.
fn close_idle(
    clients: &mut BTreeMap<SocketAddr, ConnectedClient>,
    idle_timeout: Duration,
    now: Instant,
) -> usize {
    let mut closed = 0;
    for client in clients.values_mut() {
        if now.duration_since(client.last_activity) <= idle_timeout {
            continue;
        }
        if let Some(close) = client.close.take() {
            let _ = close.send(());
            closed += 1;
        }
    }
    closed
}

/// Handle one client message and produce its reply.
pub async fn handle_client_message(sessions: &SessionManager, msg: ClientMessage) -> ServerMessage {
    match dispatch(sessions, msg).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!("Request failed: {}", e);
            ServerMessage::Error(ServerError::from(&e))
        }
    }
}

async fn dispatch(sessions: &SessionManager, msg: ClientMessage) -> Result<ServerMessage, SessionError> {
    let db = sessions.database();
    let reply = match msg {
        ClientMessage::CreateGame(request) => {
            let id = sessions.create_game(request.into_game()).await?;
            let session = sessions.load_game(&id).await?;
            let view = GameView::from(session.read().await.game());
            ServerMessage::GameCreated(view)
        }
        ClientMessage::CloneGame { seed_game_id } => {
            let id = sessions.clone_game(&seed_game_id).await?;
            let session = sessions.load_game(&id).await?;
            let view = GameView::from(session.read().await.game());
            ServerMessage::GameCreated(view)
        }
        ClientMessage::LoadGame { game_id } => {
            let session = sessions.load_game(&game_id).await?;
            let view = GameView::from(session.read().await.game());
            ServerMessage::Game(view)
        }
        ClientMessage::WaitingFor { game_id } => {
            let input = sessions.waiting_for(&game_id).await?;
            ServerMessage::WaitingFor {
                game_id,
                input: input.as_ref().map(InputView::from),
            }
        }
        ClientMessage::Input { game_id, player_id, response } => {
            let outcome = sessions.submit_input(&game_id, &player_id, &response).await?;
            ServerMessage::InputAccepted {
                game_id,
                save_id: outcome.save_id,
                path: outcome.resolution.path,
                complete: outcome.resolution.complete,
                follow_up: outcome.follow_up,
            }
        }
        ClientMessage::Undo { game_id, count } => {
            let report = sessions.undo(&game_id, count).await?;
            ServerMessage::UndoApplied {
                game_id,
                removed: report.removed(),
            }
        }
        ClientMessage::Finalize { game_id } => {
            sessions.finalize(&game_id).await?;
            ServerMessage::Finalized { game_id }
        }
        ClientMessage::History { game_id } => {
            let save_ids = db.get_save_ids(&game_id).await?;
            if save_ids.is_empty() {
                return Err(StoreError::GameNotFound(game_id).into());
            }
            ServerMessage::History { game_id, save_ids }
        }
        ClientMessage::Version { game_id, save_id } => {
            let snapshot = db.get_game_version(&game_id, save_id).await?;
            ServerMessage::Version(VersionView::from_snapshot(&snapshot)?)
        }
        ClientMessage::Participant { participant_id } => {
            let game_id = sessions.game_for_participant(&participant_id).await?;
            ServerMessage::Participant { participant_id, game_id }
        }
        ClientMessage::Games => ServerMessage::Games {
            games: db.cloneable_games().await?,
        },
        ClientMessage::Stats => ServerMessage::Stats {
            stats: db.stats().await?,
        },
        ClientMessage::Ping { timestamp } => ServerMessage::Pong {
            timestamp,
            server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
        },
    };
    Ok(reply)
}
