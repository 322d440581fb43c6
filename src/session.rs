//////////////////////////
// session.rs
//////////////////////////

//! One game between two seats: who may move, whose turn it is, and whether
//! the game is still running.
//!
//! Sessions are values. Every transition returns the successor session and
//! leaves `self` untouched, so a caller can drop the successor if persisting
//! it fails.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::fen::FenError;
use crate::position::Position;
use crate::types::*;
use crate::uci::MoveParseError;

pub const TOKEN_LENGTH: usize = 32;

/// How a caller proves which side it plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    /// Each seat gets a secret token at creation; moves must present it.
    #[default]
    Token,
    /// The caller names its colour and is trusted. Weaker; no secrets exist.
    ColorAssertion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Finished,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub token: Option<String>,
    pub joined: bool,
}

impl Seat {
    fn with_token(token: String) -> Self {
        Seat {
            token: Some(token),
            joined: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("'{0}' is not a valid game id")]
    InvalidIdentifier(String),
    #[error("game {0} not found")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid move text: {0}")]
    InvalidFormat(#[from] MoveParseError),
    #[error("illegal move: {0}")]
    IllegalMove(Move),
    #[error("{0} has already joined")]
    AlreadyJoined(Color),
    #[error("game is already over ({0})")]
    GameOver(String),
    #[error("could not load game {id}: {reason}")]
    ReadFailed { id: String, reason: String },
    #[error("could not save game {id}: {reason}")]
    WriteFailed { id: String, reason: String },
    #[error("game {0} already exists")]
    AlreadyExists(String),
    #[error("stored record for game {id} is unreadable: {source}")]
    CorruptRecord {
        id: String,
        #[source]
        source: FenError,
    },
}

impl SessionError {
    /// Stable label for transports to map onto their own status codes.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::InvalidIdentifier(_) => "invalid_identifier",
            SessionError::NotFound(_) => "not_found",
            SessionError::Forbidden(_) => "forbidden",
            SessionError::InvalidFormat(_) => "invalid_format",
            SessionError::IllegalMove(_) => "illegal_move",
            SessionError::AlreadyJoined(_) => "already_joined",
            SessionError::GameOver(_) => "game_over",
            SessionError::ReadFailed { .. } => "read_failed",
            SessionError::WriteFailed { .. } => "write_failed",
            SessionError::AlreadyExists(_) => "already_exists",
            SessionError::CorruptRecord { .. } => "corrupt_record",
        }
    }
}

/// Result of an accepted move: the session to persist and what happened.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub session: GameSession,
    pub played: Move,
    pub mover: Color,
}

impl MoveOutcome {
    /// Set when this move ended the game.
    pub fn finished(&self) -> Option<Outcome> {
        self.session.outcome
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameSession {
    pub id: Uuid,
    pub position: Position,
    pub white: Seat,
    pub black: Seat,
    pub status: SessionStatus,
    pub outcome: Option<Outcome>,
    pub version: u64,
}

impl GameSession {
    pub fn new(id: Uuid, auth: AuthPolicy) -> Self {
        let (white, black) = match auth {
            AuthPolicy::Token => (
                Seat::with_token(generate_token()),
                Seat::with_token(generate_token()),
            ),
            AuthPolicy::ColorAssertion => (Seat::default(), Seat::default()),
        };
        GameSession {
            id,
            position: Position::starting(),
            white,
            black,
            status: SessionStatus::InProgress,
            outcome: None,
            version: 0,
        }
    }

    pub fn seat(&self, color: Color) -> &Seat {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn seat_mut(&mut self, color: Color) -> &mut Seat {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == SessionStatus::Finished
    }

    pub fn turn(&self) -> Color {
        self.position.side_to_move()
    }

    /// Maps a presented credential to the side it speaks for.
    pub fn resolve(&self, credential: &str, auth: AuthPolicy) -> Result<Color, SessionError> {
        let color = match auth {
            AuthPolicy::Token => Color::ALL
                .into_iter()
                .find(|&c| self.seat(c).token.as_deref() == Some(credential)),
            AuthPolicy::ColorAssertion => Color::from_name(credential),
        };
        color.ok_or_else(|| {
            SessionError::Forbidden("credential does not match either side".to_string())
        })
    }

    /// Marks the credential's side as joined. Each side joins once.
    pub fn join(
        &self,
        credential: &str,
        auth: AuthPolicy,
    ) -> Result<(GameSession, Color), SessionError> {
        let color = self.resolve(credential, auth)?;
        if self.seat(color).joined {
            return Err(SessionError::AlreadyJoined(color));
        }
        let mut next = self.clone();
        next.seat_mut(color).joined = true;
        next.version += 1;
        Ok((next, color))
    }

    /// Validates and plays one move on behalf of `credential`.
    ///
    /// Checks run in a fixed order: credential, join requirement, game over,
    /// turn, move text, legality.
    pub fn request_move(
        &self,
        credential: &str,
        move_text: &str,
        auth: AuthPolicy,
        require_join: bool,
    ) -> Result<MoveOutcome, SessionError> {
        let mover = self.resolve(credential, auth)?;
        if require_join && !self.seat(mover).joined {
            return Err(SessionError::Forbidden(format!("{} has not joined", mover)));
        }
        if self.is_finished() {
            let result = self.outcome.map_or("*", |o| o.result_str());
            return Err(SessionError::GameOver(result.to_string()));
        }
        if mover != self.turn() {
            return Err(SessionError::Forbidden(format!(
                "it is {}'s turn",
                self.turn()
            )));
        }

        let played = Move::from_uci(move_text)?;
        let position = self
            .position
            .play(&played)
            .map_err(|MoveError::Illegal(mv)| SessionError::IllegalMove(mv))?;

        let mut next = self.clone();
        next.outcome = position.outcome();
        next.position = position;
        if next.outcome.is_some() {
            next.status = SessionStatus::Finished;
        }
        next.version += 1;

        Ok(MoveOutcome {
            session: next,
            played,
            mover,
        })
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            fen: self.position.to_fen(),
            metadata: SessionMetadata {
                white: self.white.clone(),
                black: self.black.clone(),
                status: self.status,
                outcome: self.outcome,
                version: self.version,
            },
        }
    }

    pub fn from_record(id: Uuid, record: SessionRecord) -> Result<GameSession, FenError> {
        let position = Position::from_fen(&record.fen)?;
        let SessionMetadata {
            white,
            black,
            status,
            outcome,
            version,
        } = record.metadata;
        Ok(GameSession {
            id,
            position,
            white,
            black,
            status,
            outcome,
            version,
        })
    }
}

/// What the store keeps per game: the encoded position plus seat and status data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub fen: String,
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub white: Seat,
    pub black: Seat,
    pub status: SessionStatus,
    pub outcome: Option<Outcome>,
    pub version: u64,
}

/// Fresh capability token drawn from the thread-local CSPRNG.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
