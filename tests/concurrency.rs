use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chess_sessions::{
    GameService, MemoryStore, SessionError, SessionRecord, SessionStore, ServiceConfig,
    StoreError, STARTING_FEN,
};

/// Wraps a `MemoryStore` and rejects every `put` while `failing` is set.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl SessionStore for FlakyStore {
    fn get(&self, id: &str) -> Result<SessionRecord, StoreError> {
        self.inner.get(id)
    }

    fn put(&self, id: &str, record: SessionRecord) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed {
                id: id.to_string(),
                reason: "disk full".to_string(),
            });
        }
        self.inner.put(id, record)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete(id)
    }

    fn create(&self, id: &str, record: SessionRecord) -> Result<(), StoreError> {
        self.inner.create(id, record)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_moves_on_one_game_apply_exactly_once() {
    let service = GameService::new(MemoryStore::new(), ServiceConfig::default()).unwrap();
    let created = service.start_game().await.unwrap();
    let white = created.white_token.clone().unwrap();

    // Every task tries a different first move for white; only one may land.
    let moves = ["e2e4", "d2d4", "c2c4", "g1f3", "b1c3", "f2f4", "a2a3", "h2h3"];
    let mut handles = Vec::new();
    for mv in moves {
        let service = service.clone();
        let id = created.game_id.clone();
        let white = white.clone();
        handles.push(tokio::spawn(async move {
            service.submit_move(&id, &white, mv).await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert!(matches!(e, SessionError::Forbidden(_)), "unexpected {}", e),
        }
    }
    assert_eq!(accepted, 1);

    let fen = service.position(&created.game_id).await.unwrap().fen;
    assert!(fen.contains(" b KQkq "), "{}", fen);
    assert_eq!(service.store().get(&created.game_id).unwrap().metadata.version, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_games_progress_independently() {
    let service = GameService::new(MemoryStore::new(), ServiceConfig::default()).unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let created = service.start_game().await?;
            let white = created.white_token.clone().unwrap_or_default();
            let black = created.black_token.clone().unwrap_or_default();
            for (credential, mv) in [
                (&white, "f2f3"),
                (&black, "e7e5"),
                (&white, "g2g4"),
                (&black, "d8h4"),
            ] {
                service.submit_move(&created.game_id, credential, mv).await?;
            }
            Ok::<_, SessionError>(service.status(&created.game_id).await?)
        }));
    }

    for handle in handles {
        let status = handle.await.unwrap().unwrap();
        assert!(status.is_checkmate);
        assert_eq!(status.result.as_deref(), Some("0-1"));
    }
    assert_eq!(service.store().len(), 16);
}

#[tokio::test]
async fn failed_write_leaves_game_unchanged() {
    let store = Arc::new(FlakyStore::default());
    let service = GameService::with_shared_store(Arc::clone(&store), ServiceConfig::default())
        .unwrap();
    let created = service.start_game().await.unwrap();
    let white = created.white_token.clone().unwrap();
    let id = &created.game_id;

    store.failing.store(true, Ordering::SeqCst);
    let err = service.submit_move(id, &white, "e2e4").await.unwrap_err();
    assert!(matches!(err, SessionError::WriteFailed { .. }));
    assert_eq!(err.kind(), "write_failed");
    assert_eq!(service.position(id).await.unwrap().fen, STARTING_FEN);

    // Nothing was half-applied: the same move succeeds once the store recovers.
    store.failing.store(false, Ordering::SeqCst);
    let accepted = service.submit_move(id, &white, "e2e4").await.unwrap();
    assert_eq!(
        accepted.new_fen,
        "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
    );
}

#[tokio::test]
async fn corrupt_record_is_isolated_to_its_game() {
    let store = Arc::new(MemoryStore::new());
    let service = GameService::with_shared_store(Arc::clone(&store), ServiceConfig::default())
        .unwrap();
    let broken = service.start_game().await.unwrap();
    let healthy = service.start_game().await.unwrap();

    let mut record = store.get(&broken.game_id).unwrap();
    record.fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP w KQkq - 0 1".to_string();
    store.insert_raw(&broken.game_id, record);

    let err = service.status(&broken.game_id).await.unwrap_err();
    assert!(matches!(err, SessionError::CorruptRecord { .. }));
    let err = service
        .submit_move(
            &broken.game_id,
            broken.white_token.as_deref().unwrap(),
            "e2e4",
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "corrupt_record");

    let white = healthy.white_token.clone().unwrap();
    service
        .submit_move(&healthy.game_id, &white, "e2e4")
        .await
        .unwrap();

    // A corrupt game can still be deleted.
    service.delete_game(&broken.game_id).await.unwrap();
}
