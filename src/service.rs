//////////////////////////
// service.rs
//////////////////////////

//! Caller-facing game operations over an injected `SessionStore`.
//!
//! Every mutation of a game runs load, validate and persist while holding
//! that game's lock. Locks are per id, so games never wait on each other.
//! Reads go straight to the store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{ConfigError, CreationPolicy, ServiceConfig};
use crate::session::{GameSession, SessionError};
use crate::store::{SessionStore, StoreError};
use crate::types::Color;

type GameLocks = Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>;

//////////////////////////
// Views
//////////////////////////

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameCreated {
    pub game_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Joined {
    pub role: Color,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionView {
    pub fen: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveAccepted {
    pub new_fen: String,
    pub turn: Color,
    pub is_game_over: bool,
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub turn: Color,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
    pub is_game_over: bool,
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardView {
    pub rows: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deleted {
    pub message: String,
}

//////////////////////////
// Service
//////////////////////////

pub struct GameService<S> {
    store: Arc<S>,
    config: ServiceConfig,
    locks: GameLocks,
}

impl<S> Clone for GameService<S> {
    fn clone(&self) -> Self {
        GameService {
            store: Arc::clone(&self.store),
            config: self.config,
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<S: SessionStore> GameService<S> {
    pub fn new(store: S, config: ServiceConfig) -> Result<Self, ConfigError> {
        Self::with_shared_store(Arc::new(store), config)
    }

    pub fn with_shared_store(store: Arc<S>, config: ServiceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(GameService {
            store,
            config,
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a game under a fresh id and returns the seat tokens, if any.
    pub async fn start_game(&self) -> Result<GameCreated, SessionError> {
        self.create_game(&Uuid::new_v4().to_string()).await
    }

    /// Creates a game under a caller-chosen id.
    pub async fn create_game(&self, game_id: &str) -> Result<GameCreated, SessionError> {
        let id = parse_game_id(game_id)?;
        let session = self.with_game_lock(id, || self.insert_new(id)).await?;
        Ok(GameCreated {
            game_id: id.to_string(),
            white_token: session.white.token,
            black_token: session.black.token,
        })
    }

    pub async fn join(&self, game_id: &str, credential: &str) -> Result<Joined, SessionError> {
        let id = parse_game_id(game_id)?;
        let role = self
            .with_game_lock(id, || {
                let session = self.load_for_update(id)?;
                let (next, role) = session.join(credential, self.config.auth)?;
                self.persist(&next)?;
                Ok(role)
            })
            .await?;

        info!("Game {}: {} joined", id, role);
        Ok(Joined { role })
    }

    pub async fn position(&self, game_id: &str) -> Result<PositionView, SessionError> {
        let session = self.read(game_id).await?;
        Ok(PositionView {
            fen: session.position.to_fen(),
        })
    }

    pub async fn submit_move(
        &self,
        game_id: &str,
        credential: &str,
        move_text: &str,
    ) -> Result<MoveAccepted, SessionError> {
        let id = parse_game_id(game_id)?;
        let outcome = self
            .with_game_lock(id, || {
                let session = self.load_for_update(id)?;
                let outcome = session.request_move(
                    credential,
                    move_text,
                    self.config.auth,
                    self.config.require_join,
                )?;
                self.persist(&outcome.session)?;
                Ok(outcome)
            })
            .await?;

        let next = &outcome.session;
        let new_fen = next.position.to_fen();
        debug!("Game {}: {} played {} -> {}", id, outcome.mover, outcome.played, new_fen);
        if let Some(result) = outcome.finished() {
            info!("Game {} finished: {} ({})", id, result, result.result_str());
        }

        Ok(MoveAccepted {
            new_fen,
            turn: next.turn(),
            is_game_over: next.is_finished(),
            result: next.outcome.map(|o| o.result_str().to_string()),
        })
    }

    pub async fn status(&self, game_id: &str) -> Result<StatusView, SessionError> {
        let session = self.read(game_id).await?;
        let position = &session.position;
        Ok(StatusView {
            turn: position.side_to_move(),
            is_check: position.is_check(),
            is_checkmate: position.is_checkmate(),
            is_stalemate: position.is_stalemate(),
            is_game_over: session.is_finished(),
            result: session.outcome.map(|o| o.result_str().to_string()),
        })
    }

    pub async fn board(&self, game_id: &str) -> Result<BoardView, SessionError> {
        let session = self.read(game_id).await?;
        Ok(BoardView {
            rows: session.position.ascii_rows(),
        })
    }

    pub async fn delete_game(&self, game_id: &str) -> Result<Deleted, SessionError> {
        let id = parse_game_id(game_id)?;
        self.with_game_lock(id, || {
            self.store.delete(&id.to_string()).map_err(|e| match e {
                StoreError::NotFound(_) => SessionError::NotFound(id.to_string()),
                other => write_failed(id, other),
            })
        })
        .await?;

        info!("Game {} deleted", id);
        Ok(Deleted {
            message: format!("Game {} deleted", id),
        })
    }

    /// Loads a game for reading. Under auto-create this may create it, which
    /// takes the game's lock.
    async fn read(&self, game_id: &str) -> Result<GameSession, SessionError> {
        let id = parse_game_id(game_id)?;
        match self.load(id) {
            Err(SessionError::NotFound(_)) if self.auto_create() => {
                self.with_game_lock(id, || self.load_for_update(id)).await
            }
            other => other,
        }
    }

    /// Runs `f` while holding the game's lock.
    async fn with_game_lock<T, F>(&self, id: Uuid, f: F) -> Result<T, SessionError>
    where
        F: FnOnce() -> Result<T, SessionError>,
    {
        let lease = self.lease(id);
        let _guard = lease.lock.lock().await;
        f()
    }

    /// Caller must hold the game's lock.
    fn load_for_update(&self, id: Uuid) -> Result<GameSession, SessionError> {
        match self.load(id) {
            Err(SessionError::NotFound(_)) if self.auto_create() => self.insert_new(id),
            other => other,
        }
    }

    fn load(&self, id: Uuid) -> Result<GameSession, SessionError> {
        let key = id.to_string();
        let record = self.store.get(&key).map_err(|e| match e {
            StoreError::NotFound(_) => SessionError::NotFound(key.clone()),
            other => read_failed(id, other),
        })?;
        GameSession::from_record(id, record).map_err(|source| {
            warn!("Game {}: stored record is corrupt: {}", id, source);
            SessionError::CorruptRecord { id: key, source }
        })
    }

    /// Caller must hold the game's lock.
    fn insert_new(&self, id: Uuid) -> Result<GameSession, SessionError> {
        let session = GameSession::new(id, self.config.auth);
        self.store
            .create(&id.to_string(), session.to_record())
            .map_err(|e| match e {
                StoreError::Conflict(_) => SessionError::AlreadyExists(id.to_string()),
                other => write_failed(id, other),
            })?;
        info!("Game {} created ({:?} auth)", id, self.config.auth);
        Ok(session)
    }

    fn persist(&self, session: &GameSession) -> Result<(), SessionError> {
        let id = session.id;
        self.store
            .put(&id.to_string(), session.to_record())
            .map_err(|e| match e {
                StoreError::NotFound(_) => SessionError::NotFound(id.to_string()),
                other => write_failed(id, other),
            })
    }

    fn auto_create(&self) -> bool {
        self.config.creation == CreationPolicy::AutoCreate
    }

    fn lease(&self, id: Uuid) -> LockLease {
        let lock = Arc::clone(lock_table(&self.locks).entry(id).or_default());
        LockLease {
            table: Arc::clone(&self.locks),
            id,
            lock,
        }
    }
}

/// A handle on one game's lock. The table entry is dropped together with
/// the last lease, so the table only holds games with callers in flight.
struct LockLease {
    table: GameLocks,
    id: Uuid,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for LockLease {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        let ours = table
            .get(&self.id)
            .map_or(false, |entry| Arc::ptr_eq(entry, &self.lock));
        // Leases are only created under the table lock, so a count of two
        // (table plus this lease) means nobody else holds or awaits it.
        if ours && Arc::strong_count(&self.lock) == 2 {
            table.remove(&self.id);
        }
    }
}

fn lock_table(locks: &GameLocks) -> MutexGuard<'_, HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn parse_game_id(text: &str) -> Result<Uuid, SessionError> {
    Uuid::parse_str(text).map_err(|_| SessionError::InvalidIdentifier(text.to_string()))
}

fn read_failed(id: Uuid, error: StoreError) -> SessionError {
    warn!("Game {}: store could not read the record: {}", id, error);
    SessionError::ReadFailed {
        id: id.to_string(),
        reason: error.to_string(),
    }
}

fn write_failed(id: Uuid, error: StoreError) -> SessionError {
    warn!("Game {}: store rejected the write: {}", id, error);
    SessionError::WriteFailed {
        id: id.to_string(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRecord;
    use crate::store::MemoryStore;

    fn service() -> GameService<MemoryStore> {
        GameService::new(MemoryStore::new(), ServiceConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn start_game_issues_tokens() {
        let service = service();
        let created = service.start_game().await.unwrap();
        assert!(Uuid::parse_str(&created.game_id).is_ok());
        assert!(created.white_token.is_some());
        assert_ne!(created.white_token, created.black_token);
        assert_eq!(service.store().len(), 1);
    }

    #[tokio::test]
    async fn malformed_id_is_not_a_lookup() {
        let service = service();
        let err = service.position("not-a-uuid").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_identifier");
        let err = service.position(&Uuid::new_v4().to_string()).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn create_game_refuses_existing_id() {
        let service = service();
        let id = Uuid::new_v4().to_string();
        service.create_game(&id).await.unwrap();
        assert!(matches!(
            service.create_game(&id).await,
            Err(SessionError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn views_serialize_like_the_wire_format() {
        let service = service();
        let created = service.start_game().await.unwrap();
        let white = created.white_token.clone().unwrap();
        let accepted = service
            .submit_move(&created.game_id, &white, "e2e4")
            .await
            .unwrap();
        let json = serde_json::to_value(&accepted).unwrap();
        assert_eq!(json["turn"], "black");
        assert_eq!(json["is_game_over"], false);
        assert!(json["result"].is_null());
        assert_eq!(
            json["new_fen"],
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );

        let joined = service.join(&created.game_id, &white).await.unwrap();
        assert_eq!(serde_json::to_value(&joined).unwrap()["role"], "white");
    }

    fn tracked_locks<S>(service: &GameService<S>) -> usize {
        lock_table(&service.locks).len()
    }

    #[tokio::test]
    async fn unknown_games_leave_no_lock_entries() {
        let service = service();
        for _ in 0..100 {
            let id = Uuid::new_v4().to_string();
            assert!(matches!(
                service.submit_move(&id, "token", "e2e4").await,
                Err(SessionError::NotFound(_))
            ));
            assert!(service.join(&id, "token").await.is_err());
            assert!(service.delete_game(&id).await.is_err());
        }
        assert_eq!(tracked_locks(&service), 0);

        let created = service.start_game().await.unwrap();
        let white = created.white_token.clone().unwrap();
        service
            .submit_move(&created.game_id, &white, "e2e4")
            .await
            .unwrap();
        assert_eq!(tracked_locks(&service), 0);
    }

    #[tokio::test]
    async fn held_lock_stays_in_the_table_until_released() {
        let service = service();
        let id = Uuid::new_v4();
        let first = service.lease(id);
        let guard = first.lock.lock().await;
        let second = service.lease(id);
        assert!(Arc::ptr_eq(&first.lock, &second.lock));
        drop(guard);
        drop(first);
        assert_eq!(tracked_locks(&service), 1);
        drop(second);
        assert_eq!(tracked_locks(&service), 0);
    }

    struct UnreadableStore;

    impl SessionStore for UnreadableStore {
        fn get(&self, id: &str) -> Result<SessionRecord, StoreError> {
            Err(StoreError::ReadFailed {
                id: id.to_string(),
                reason: "connection reset".to_string(),
            })
        }
        fn put(&self, _: &str, _: SessionRecord) -> Result<(), StoreError> {
            Ok(())
        }
        fn delete(&self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        fn create(&self, _: &str, _: SessionRecord) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn read_errors_are_not_reported_as_writes() {
        let service = GameService::new(UnreadableStore, ServiceConfig::default()).unwrap();
        let err = service
            .status(&Uuid::new_v4().to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ReadFailed { .. }));
        assert_eq!(err.kind(), "read_failed");
    }

    #[test]
    fn token_policy_cannot_auto_create() {
        let config = ServiceConfig {
            creation: CreationPolicy::AutoCreate,
            ..ServiceConfig::default()
        };
        assert!(GameService::new(MemoryStore::new(), config).is_err());
    }
}
