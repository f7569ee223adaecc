//! Network Layer
//!
//! WebSocket server, wire messages and the registry of loaded games.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ErrorCode, InputView, PromptView, VersionView};
pub use session::{GameSession, SessionError, SessionManager, SubmitOutcome};
pub use server::{handle_client_message, GameServer, GameServerError};
