//! SQLite snapshot store.
//!
//! Tables:
//! - `games`: one row per `(game_id, save_id)` with the serialized game
//! - `participants`: access ledger, written once per game
//! - `completed_game`: completion times; finished games are never purged
//! - `game_results`: final standings of finalized games
//!
//! rusqlite is blocking, so every call runs on the blocking pool behind a
//! single shared connection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::core::ids::{GameId, ParticipantId};
use crate::game::state::GameStatus;

use super::error::{Result, StoreError};
use super::snapshot::{
    CloneableGame, GameResults, NewSnapshot, SaveId, Snapshot, UpsertOutcome, SEED_SAVE_ID,
};
use super::store::SnapshotStore;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS games (
        game_id TEXT NOT NULL,
        save_id INTEGER NOT NULL,
        players INTEGER NOT NULL,
        game TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'running',
        created_time INTEGER NOT NULL,
        PRIMARY KEY (game_id, save_id)
    );

    CREATE TABLE IF NOT EXISTS participants (
        game_id TEXT NOT NULL,
        participant TEXT NOT NULL,
        PRIMARY KEY (game_id, participant)
    );

    CREATE TABLE IF NOT EXISTS completed_game (
        game_id TEXT NOT NULL PRIMARY KEY,
        completed_time INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS game_results (
        game_id TEXT NOT NULL PRIMARY KEY,
        seed_game_id TEXT,
        players INTEGER NOT NULL,
        generations INTEGER NOT NULL,
        game_options TEXT NOT NULL,
        scores TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS ix_games_save_id ON games(save_id);
    CREATE INDEX IF NOT EXISTS ix_games_created_time ON games(created_time);
    CREATE INDEX IF NOT EXISTS ix_participants_participant ON participants(participant);
";

const SNAPSHOT_COLUMNS: &str = "game_id, save_id, game, players, status, created_time";

/// Snapshot store backed by a SQLite database.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
    /// Calls holding or waiting for the connection.
    in_flight: Arc<AtomicUsize>,
}

impl SqliteStore {
    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::initialize(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "Opened SQLite snapshot store");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?, None)
    }

    fn initialize(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Database file, if not in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let slot = InFlight::enter(&self.in_flight);
        tokio::task::spawn_blocking(move || {
            let _slot = slot;
            let mut guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&mut guard)
        })
        .await?
    }
}

/// Counts one call against the shared connection until dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct RawSnapshot {
    game_id: String,
    save_id: SaveId,
    game: String,
    players: u32,
    status: String,
    created_time: i64,
}

impl RawSnapshot {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            game_id: row.get(0)?,
            save_id: row.get(1)?,
            game: row.get(2)?,
            players: row.get(3)?,
            status: row.get(4)?,
            created_time: row.get(5)?,
        })
    }

    fn into_snapshot(self) -> Result<Snapshot> {
        let status = GameStatus::parse(&self.status)
            .ok_or_else(|| StoreError::CorruptedData(format!("unknown status {}", self.status)))?;
        let created_at = DateTime::from_timestamp_millis(self.created_time)
            .ok_or_else(|| StoreError::CorruptedData(format!("bad created_time {}", self.created_time)))?;
        Ok(Snapshot {
            game_id: GameId::new(self.game_id),
            save_id: self.save_id,
            game: self.game,
            players: self.players,
            created_at,
            status,
        })
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn game_ids(&self) -> Result<Vec<GameId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT game_id FROM games ORDER BY game_id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids.into_iter().map(GameId::new).collect())
        })
        .await
    }

    async fn latest(&self, game_id: &GameId) -> Result<Snapshot> {
        let game_id = game_id.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM games WHERE game_id = ?1 ORDER BY save_id DESC LIMIT 1"
            );
            conn.query_row(&sql, [game_id.as_str()], RawSnapshot::from_row)
                .optional()?
                .ok_or(StoreError::GameNotFound(game_id))?
                .into_snapshot()
        })
        .await
    }

    async fn version(&self, game_id: &GameId, save_id: SaveId) -> Result<Snapshot> {
        let game_id = game_id.clone();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM games WHERE game_id = ?1 AND save_id = ?2");
            conn.query_row(&sql, params![game_id.as_str(), save_id], RawSnapshot::from_row)
                .optional()?
                .ok_or(StoreError::VersionNotFound { game_id, save_id })?
                .into_snapshot()
        })
        .await
    }

    async fn save_ids(&self, game_id: &GameId) -> Result<Vec<SaveId>> {
        let game_id = game_id.clone();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT save_id FROM games WHERE game_id = ?1 ORDER BY save_id ASC")?;
            let ids = stmt
                .query_map([game_id.as_str()], |row| row.get::<_, SaveId>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn cloneable_games(&self) -> Result<Vec<CloneableGame>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT game_id, players FROM games WHERE save_id = ?1 ORDER BY game_id ASC",
            )?;
            let games = stmt
                .query_map([SEED_SAVE_ID], |row| {
                    Ok(CloneableGame {
                        game_id: GameId::new(row.get::<_, String>(0)?),
                        player_count: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(games)
        })
        .await
    }

    async fn upsert(&self, snapshot: NewSnapshot) -> Result<UpsertOutcome> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO games (game_id, save_id, players, game, created_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    snapshot.game_id.as_str(),
                    snapshot.save_id,
                    snapshot.players,
                    &snapshot.game,
                    snapshot.created_at.timestamp_millis(),
                ],
            )? == 1;
            if !inserted {
                tx.execute(
                    "UPDATE games SET game = ?3 WHERE game_id = ?1 AND save_id = ?2",
                    params![snapshot.game_id.as_str(), snapshot.save_id, &snapshot.game],
                )?;
            }
            tx.commit()?;
            Ok(UpsertOutcome { inserted })
        })
        .await
    }

    async fn delete_recent(&self, game_id: &GameId, count: u32) -> Result<usize> {
        let game_id = game_id.clone();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM games WHERE game_id = ?1 AND save_id IN (
                     SELECT save_id FROM games
                     WHERE game_id = ?1 AND save_id > ?2
                     ORDER BY save_id DESC
                     LIMIT ?3)",
                params![game_id.as_str(), SEED_SAVE_ID, count],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn delete_between(&self, game_id: &GameId, after: SaveId, before: SaveId) -> Result<usize> {
        let game_id = game_id.clone();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM games WHERE game_id = ?1 AND save_id > ?2 AND save_id < ?3",
                params![game_id.as_str(), after, before],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn mark_finished(&self, game_id: &GameId, completed_at: DateTime<Utc>) -> Result<()> {
        let game_id = game_id.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE games SET status = ?2 WHERE game_id = ?1",
                params![game_id.as_str(), GameStatus::Finished.as_str()],
            )?;
            if updated == 0 {
                return Err(StoreError::GameNotFound(game_id));
            }
            tx.execute(
                "INSERT OR IGNORE INTO completed_game (game_id, completed_time) VALUES (?1, ?2)",
                params![game_id.as_str(), completed_at.timestamp_millis()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn purge_unfinished_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<GameId>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let stale = {
                let mut stmt = tx.prepare(
                    "SELECT game_id FROM games
                     WHERE game_id NOT IN (SELECT game_id FROM completed_game)
                     GROUP BY game_id
                     HAVING MIN(created_time) < ?1
                     ORDER BY game_id",
                )?;
                let ids = stmt
                    .query_map([cutoff.timestamp_millis()], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };
            for game_id in &stale {
                tx.execute("DELETE FROM games WHERE game_id = ?1", [game_id])?;
            }
            tx.commit()?;
            Ok(stale.into_iter().map(GameId::new).collect())
        })
        .await
    }

    async fn store_participants(&self, game_id: &GameId, participants: &[ParticipantId]) -> Result<()> {
        let game_id = game_id.clone();
        let participants = participants.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM participants WHERE game_id = ?1",
                [game_id.as_str()],
                |row| row.get(0),
            )?;
            if existing > 0 {
                return Err(StoreError::ParticipantsExist(game_id));
            }
            for participant in &participants {
                tx.execute(
                    "INSERT INTO participants (game_id, participant) VALUES (?1, ?2)",
                    params![game_id.as_str(), participant.as_str()],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn participant_rows(&self) -> Result<Vec<(GameId, ParticipantId)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT game_id, participant FROM participants")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|(game_id, participant)| Ok((GameId::new(game_id), participant.parse()?)))
                .collect()
        })
        .await
    }

    async fn game_id_for(&self, participant: &ParticipantId) -> Result<GameId> {
        let participant = participant.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT game_id FROM participants WHERE participant = ?1 LIMIT 1",
                [participant.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(GameId::new)
            .ok_or_else(|| StoreError::ParticipantNotFound(participant.to_string()))
        })
        .await
    }

    async fn store_results(&self, results: &GameResults) -> Result<()> {
        let options = serde_json::to_string(&results.options)?;
        let scores = serde_json::to_string(&results.scores)?;
        let results = results.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO game_results
                     (game_id, seed_game_id, players, generations, game_options, scores)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    results.game_id.as_str(),
                    results.seed_game_id.as_ref().map(GameId::as_str),
                    results.players,
                    results.generations,
                    options,
                    scores,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn results(&self, game_id: &GameId) -> Result<GameResults> {
        let game_id = game_id.clone();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT seed_game_id, players, generations, game_options, scores
                     FROM game_results WHERE game_id = ?1",
                    [game_id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, u32>(1)?,
                            row.get::<_, u32>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()?;
            let Some((seed, players, generations, options, scores)) = row else {
                return Err(StoreError::ResultsNotFound(game_id));
            };
            Ok(GameResults {
                game_id,
                seed_game_id: seed.map(GameId::new),
                players,
                generations,
                options: serde_json::from_str(&options)?,
                scores: serde_json::from_str(&scores)?,
            })
        })
        .await
    }

    async fn storage_stats(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        let busy = self.in_flight.load(Ordering::SeqCst);
        self.with_conn(move |conn| {
            let count = |table: &str| -> rusqlite::Result<i64> {
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            };
            let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
            let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
            let game_bytes: i64 =
                conn.query_row("SELECT COALESCE(SUM(LENGTH(game)), 0) FROM games", [], |row| row.get(0))?;

            let mut map = BTreeMap::new();
            map.insert("row-count-games".to_string(), count("games")?.into());
            map.insert("row-count-participants".to_string(), count("participants")?.into());
            map.insert("row-count-completed".to_string(), count("completed_game")?.into());
            map.insert("row-count-results".to_string(), count("game_results")?.into());
            map.insert("size-bytes-games".to_string(), game_bytes.into());
            map.insert("size-bytes-database".to_string(), (page_count * page_size).into());
            map.insert("pool-size".to_string(), 1.into());
            map.insert("pool-total-count".to_string(), busy.min(1).into());
            map.insert("pool-idle-count".to_string(), (1 - busy.min(1)).into());
            map.insert("pool-waiting-count".to_string(), busy.saturating_sub(1).into());
            Ok(map)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(game: &str, save_id: SaveId, payload: &str) -> NewSnapshot {
        NewSnapshot {
            game_id: GameId::new(game),
            save_id,
            game: payload.to_string(),
            players: 3,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_insert_then_update() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = GameId::new("g1");

        assert!(store.upsert(row("g1", 0, "first")).await.unwrap().inserted);
        assert!(!store.upsert(row("g1", 0, "second")).await.unwrap().inserted);

        let seed = store.version(&id, 0).await.unwrap();
        assert_eq!(seed.game, "second");
        assert_eq!(seed.players, 3);
        assert_eq!(seed.status, GameStatus::Running);
    }

    #[tokio::test]
    async fn test_versions_and_rollback() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = GameId::new("g1");
        for v in 0..5 {
            store.upsert(row("g1", v, &format!("v{v}"))).await.unwrap();
        }
        assert_eq!(store.latest(&id).await.unwrap().game, "v4");

        assert_eq!(store.delete_recent(&id, 2).await.unwrap(), 2);
        assert_eq!(store.save_ids(&id).await.unwrap(), vec![0, 1, 2]);

        assert_eq!(store.delete_recent(&id, 9).await.unwrap(), 2);
        assert_eq!(store.save_ids(&id).await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_compaction_and_finish() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = GameId::new("g1");
        for v in 0..6 {
            store.upsert(row("g1", v, "x")).await.unwrap();
        }
        assert_eq!(store.delete_between(&id, 0, 5).await.unwrap(), 4);
        store.mark_finished(&id, Utc::now()).await.unwrap();

        assert_eq!(store.save_ids(&id).await.unwrap(), vec![0, 5]);
        assert_eq!(store.latest(&id).await.unwrap().status, GameStatus::Finished);
        assert!(store.mark_finished(&GameId::new("nope"), Utc::now()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_purge_unfinished() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut old = row("g-old", 0, "x");
        old.created_at = Utc::now() - Duration::days(20);
        let mut done = row("g-done", 0, "x");
        done.created_at = Utc::now() - Duration::days(20);
        store.upsert(old).await.unwrap();
        store.upsert(done).await.unwrap();
        store.upsert(row("g-new", 0, "x")).await.unwrap();
        store.mark_finished(&GameId::new("g-done"), Utc::now()).await.unwrap();

        let purged = store.purge_unfinished_before(Utc::now() - Duration::days(7)).await.unwrap();
        assert_eq!(purged, vec![GameId::new("g-old")]);
        assert_eq!(
            store.game_ids().await.unwrap(),
            vec![GameId::new("g-done"), GameId::new("g-new")]
        );
    }

    #[tokio::test]
    async fn test_participant_ledger() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = GameId::new("g1");
        let ids: Vec<ParticipantId> = vec!["p1".parse().unwrap(), "p2".parse().unwrap(), "s1".parse().unwrap()];

        store.store_participants(&id, &ids).await.unwrap();
        assert!(matches!(
            store.store_participants(&id, &ids).await,
            Err(StoreError::ParticipantsExist(_))
        ));
        assert_eq!(store.participant_rows().await.unwrap().len(), 3);
        assert_eq!(store.game_id_for(&ids[2]).await.unwrap(), id);

        let stranger: ParticipantId = "p404".parse().unwrap();
        assert!(store.game_id_for(&stranger).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_file_backed_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("games.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert(row("g1", 0, "persisted")).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert_eq!(store.latest(&GameId::new("g1")).await.unwrap().game, "persisted");

        let stats = store.storage_stats().await.unwrap();
        assert_eq!(stats["row-count-games"], 1);
        assert!(stats["size-bytes-database"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_pool_utilization_when_idle() {
        let store = SqliteStore::open_in_memory().unwrap();
        let stats = store.storage_stats().await.unwrap();
        assert_eq!(stats["pool-size"], 1);
        assert_eq!(stats["pool-total-count"], 0);
        assert_eq!(stats["pool-idle-count"], 1);
        assert_eq!(stats["pool-waiting-count"], 0);
        assert_eq!(store.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pool_counts_calls_waiting_on_the_connection() {
        let store = SqliteStore::open_in_memory().unwrap();
        let _running = InFlight::enter(&store.in_flight);
        let _queued = InFlight::enter(&store.in_flight);

        let stats = store.storage_stats().await.unwrap();
        assert_eq!(stats["pool-total-count"], 1);
        assert_eq!(stats["pool-idle-count"], 0);
        assert_eq!(stats["pool-waiting-count"], 1);
    }

    #[tokio::test]
    async fn test_game_results_round_trip_and_replace() {
        use crate::core::ids::PlayerId;
        use crate::game::state::GameOptions;
        use crate::persistence::snapshot::PlayerScore;

        let store = SqliteStore::open_in_memory().unwrap();
        let id = GameId::new("g1");
        assert!(store.results(&id).await.unwrap_err().is_not_found());

        let mut results = GameResults {
            game_id: id.clone(),
            seed_game_id: Some(GameId::new("g0")),
            players: 1,
            generations: 12,
            options: GameOptions { undo: true, ..Default::default() },
            scores: vec![PlayerScore {
                player: PlayerId::new("p1"),
                name: "Ada".to_string(),
                resources: BTreeMap::from([("mc".to_string(), 42)]),
            }],
        };
        store.store_results(&results).await.unwrap();
        assert_eq!(store.results(&id).await.unwrap(), results);

        results.generations = 13;
        results.seed_game_id = None;
        store.store_results(&results).await.unwrap();
        assert_eq!(store.results(&id).await.unwrap(), results);
        assert_eq!(store.storage_stats().await.unwrap()["row-count-results"], 1);
    }
}
