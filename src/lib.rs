//////////////////////////
// lib.rs
//////////////////////////

pub mod config;
pub mod fen;
pub mod game;
pub mod position;
pub mod service;
pub mod session;
pub mod store;
pub mod types;
pub mod uci;

pub use config::{ConfigError, CreationPolicy, ServiceConfig};
pub use fen::{FenError, STARTING_FEN};
pub use position::Position;
pub use service::{
    BoardView, Deleted, GameCreated, GameService, Joined, MoveAccepted, PositionView, StatusView,
};
pub use session::{AuthPolicy, GameSession, SessionError, SessionRecord, SessionStatus};
pub use store::{MemoryStore, SessionStore, StoreError};
pub use types::*;
pub use uci::MoveParseError;
