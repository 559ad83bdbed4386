//! SQLite-based cache implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use epg_core::{
    Channel, ChannelId, EpgCache, EpgError, ProgramDetail, ProgramId, ProgramStub, Result,
    SegmentKey, SyncWindow, segment_is_fresh,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

fn cache_err(e: impl std::fmt::Display) -> EpgError {
    EpgError::Cache(e.to_string())
}

fn to_datetime(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| EpgError::Cache(format!("Invalid stored timestamp: {}", ts)))
}

/// SQLite-based store for guide data.
///
/// This cache stores data in a SQLite database file, providing persistence across
/// runs. The connection sits behind a mutex that is held only for the duration
/// of a single statement or transaction, which serialises all writes.
#[derive(Debug)]
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Create a new SQLite cache at the given path.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(cache_err)?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Create an in-memory SQLite cache.
    ///
    /// Useful for testing; data is lost when the cache is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(cache_err)?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(cache_err)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                number INTEGER,
                logo TEXT,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS segments (
                channel_id TEXT NOT NULL,
                segment_start INTEGER NOT NULL,
                fetched_at INTEGER NOT NULL,
                PRIMARY KEY (channel_id, segment_start)
            );

            CREATE TABLE IF NOT EXISTS programs (
                channel_id TEXT NOT NULL,
                segment_start INTEGER NOT NULL,
                position INTEGER NOT NULL,
                program_id TEXT NOT NULL,
                title TEXT NOT NULL,
                start INTEGER NOT NULL,
                stop INTEGER,
                PRIMARY KEY (channel_id, segment_start, position)
            );

            CREATE INDEX IF NOT EXISTS idx_programs_channel_start
             ON programs(channel_id, start);

            CREATE INDEX IF NOT EXISTS idx_programs_program_id
             ON programs(program_id);

            CREATE TABLE IF NOT EXISTS program_details (
                program_id TEXT PRIMARY KEY,
                data_json TEXT NOT NULL,
                fetched_at INTEGER NOT NULL
            );",
        )
        .map_err(cache_err)?;

        debug!("SQLite cache schema initialized");
        Ok(())
    }

    fn segment_fetched_at(conn: &Connection, key: &SegmentKey) -> Result<Option<DateTime<Utc>>> {
        let fetched_at = conn
            .query_row(
                "SELECT fetched_at FROM segments
                 WHERE channel_id = ?1 AND segment_start = ?2",
                params![key.channel_id.as_str(), key.start.timestamp()],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(cache_err)?;

        fetched_at.map(to_datetime).transpose()
    }
}

#[async_trait]
impl EpgCache for SqliteCache {
    #[instrument(skip(self))]
    async fn get_channels(&self) -> Result<Vec<Channel>> {
        let conn = self.conn.lock().map_err(cache_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, name, number, logo FROM channels
                 ORDER BY number IS NULL, number, id",
            )
            .map_err(cache_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(Channel {
                    id: ChannelId::new(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    number: row.get(2)?,
                    logo: row.get(3)?,
                })
            })
            .map_err(cache_err)?;

        let channels = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(cache_err)?;
        debug!("Found {} cached channels", channels.len());
        Ok(channels)
    }

    #[instrument(skip(self, channels), fields(count = channels.len()))]
    async fn put_channels(&self, channels: &[Channel]) -> Result<()> {
        let updated_at = Utc::now().timestamp();

        let conn = self.conn.lock().map_err(cache_err)?;
        let tx = conn.unchecked_transaction().map_err(cache_err)?;

        for channel in channels {
            tx.execute(
                "INSERT OR REPLACE INTO channels (id, name, number, logo, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    channel.id.as_str(),
                    channel.name,
                    channel.number,
                    channel.logo,
                    updated_at
                ],
            )
            .map_err(cache_err)?;
        }

        tx.commit().map_err(cache_err)?;
        debug!("Cached {} channels", channels.len());
        Ok(())
    }

    #[instrument(skip(self), fields(segment = %key))]
    async fn is_segment_fresh(&self, key: &SegmentKey, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().map_err(cache_err)?;
        let fetched_at = Self::segment_fetched_at(&conn, key)?;
        Ok(segment_is_fresh(fetched_at, key.start, now))
    }

    #[instrument(skip(self, programs), fields(segment = %key, count = programs.len()))]
    async fn put_segment(
        &self,
        key: &SegmentKey,
        programs: &[ProgramStub],
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().map_err(cache_err)?;

        let existing = Self::segment_fetched_at(&conn, key)?;
        if segment_is_fresh(existing, key.start, fetched_at) {
            debug!("Segment already fresh, keeping cached programs");
            return Ok(());
        }

        let channel_id = key.channel_id.as_str();
        let segment_start = key.start.timestamp();
        let tx = conn.unchecked_transaction().map_err(cache_err)?;

        tx.execute(
            "INSERT OR REPLACE INTO segments (channel_id, segment_start, fetched_at)
             VALUES (?1, ?2, ?3)",
            params![channel_id, segment_start, fetched_at.timestamp()],
        )
        .map_err(cache_err)?;

        tx.execute(
            "DELETE FROM programs WHERE channel_id = ?1 AND segment_start = ?2",
            params![channel_id, segment_start],
        )
        .map_err(cache_err)?;

        for (position, program) in programs.iter().enumerate() {
            tx.execute(
                "INSERT INTO programs
                 (channel_id, segment_start, position, program_id, title, start, stop)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    channel_id,
                    segment_start,
                    position as i64,
                    program.id.as_str(),
                    program.title,
                    program.start.timestamp(),
                    program.stop.map(|stop| stop.timestamp())
                ],
            )
            .map_err(cache_err)?;
        }

        tx.commit().map_err(cache_err)?;
        debug!("Cached {} programs", programs.len());
        Ok(())
    }

    #[instrument(skip(self), fields(channel = %channel_id))]
    async fn get_programs(
        &self,
        channel_id: &ChannelId,
        window: &SyncWindow,
    ) -> Result<Vec<ProgramStub>> {
        let conn = self.conn.lock().map_err(cache_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT program_id, title, start, stop FROM programs
                 WHERE channel_id = ?1 AND segment_start >= ?2 AND segment_start < ?3
                 ORDER BY start ASC, segment_start ASC, position ASC",
            )
            .map_err(cache_err)?;

        let rows = stmt
            .query_map(
                params![
                    channel_id.as_str(),
                    window.start().timestamp(),
                    window.end().timestamp()
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .map_err(cache_err)?;

        let mut seen = HashSet::new();
        let mut programs = Vec::new();
        for row in rows {
            let (program_id, title, start, stop) = row.map_err(cache_err)?;
            if !seen.insert(program_id.clone()) {
                continue;
            }
            programs.push(ProgramStub {
                id: ProgramId::new(program_id),
                channel_id: channel_id.clone(),
                title,
                start: to_datetime(start)?,
                stop: stop.map(to_datetime).transpose()?,
            });
        }

        debug!("Found {} cached programs", programs.len());
        Ok(programs)
    }

    #[instrument(skip(self), fields(program = %program_id))]
    async fn has_detail(&self, program_id: &ProgramId) -> Result<bool> {
        let conn = self.conn.lock().map_err(cache_err)?;

        let found = conn
            .query_row(
                "SELECT 1 FROM program_details WHERE program_id = ?1",
                params![program_id.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map_err(cache_err)?;

        Ok(found.is_some())
    }

    #[instrument(skip(self, detail), fields(program = %program_id))]
    async fn put_detail(
        &self,
        program_id: &ProgramId,
        detail: &ProgramDetail,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let data_json = serde_json::to_string(detail).map_err(cache_err)?;

        let conn = self.conn.lock().map_err(cache_err)?;

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO program_details (program_id, data_json, fetched_at)
                 VALUES (?1, ?2, ?3)",
                params![program_id.as_str(), data_json, fetched_at.timestamp()],
            )
            .map_err(cache_err)?;

        if inserted == 0 {
            debug!("Detail already cached, keeping existing record");
        } else {
            debug!("Cached detail");
        }
        Ok(())
    }

    #[instrument(skip(self), fields(program = %program_id))]
    async fn get_detail(&self, program_id: &ProgramId) -> Result<Option<ProgramDetail>> {
        let conn = self.conn.lock().map_err(cache_err)?;

        let result = conn
            .query_row(
                "SELECT data_json FROM program_details WHERE program_id = ?1",
                params![program_id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(cache_err)?;

        match result {
            Some(json) => {
                let detail: ProgramDetail = serde_json::from_str(&json).map_err(cache_err)?;
                debug!("Found cached detail");
                Ok(Some(detail))
            }
            None => {
                debug!("No cached detail found");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), fields(program = %program_id))]
    async fn evict_detail(&self, program_id: &ProgramId) -> Result<bool> {
        let conn = self.conn.lock().map_err(cache_err)?;

        let deleted = conn
            .execute(
                "DELETE FROM program_details WHERE program_id = ?1",
                params![program_id.as_str()],
            )
            .map_err(cache_err)?;

        Ok(deleted > 0)
    }

    #[instrument(skip(self))]
    async fn prune(&self, before: DateTime<Utc>) -> Result<usize> {
        let cutoff = before.timestamp();

        let conn = self.conn.lock().map_err(cache_err)?;
        let tx = conn.unchecked_transaction().map_err(cache_err)?;

        tx.execute(
            "DELETE FROM programs WHERE segment_start < ?1",
            params![cutoff],
        )
        .map_err(cache_err)?;

        let segments = tx
            .execute(
                "DELETE FROM segments WHERE segment_start < ?1",
                params![cutoff],
            )
            .map_err(cache_err)?;

        let details = tx
            .execute(
                "DELETE FROM program_details
                 WHERE program_id NOT IN (SELECT program_id FROM programs)",
                [],
            )
            .map_err(cache_err)?;

        tx.commit().map_err(cache_err)?;

        let total = segments + details;
        if total > 0 {
            debug!(segments, details, "Pruned cache entries");
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, h, 0, 0).unwrap()
    }

    fn stub(id: &str, start: u32, stop: u32) -> ProgramStub {
        ProgramStub::new(id, "ch1", format!("Show {}", id), at(start), Some(at(stop)))
    }

    #[tokio::test]
    async fn test_sqlite_cache_initialization() {
        let cache = SqliteCache::in_memory();
        assert!(cache.is_ok());
    }

    #[tokio::test]
    async fn test_channels_round_trip_and_order() {
        let cache = SqliteCache::in_memory().unwrap();

        cache
            .put_channels(&[
                Channel::new("b", "RTL 4").with_number(4),
                Channel::new("a", "Unnumbered"),
                Channel::new("c", "NPO 1")
                    .with_number(1)
                    .with_logo("https://example.com/npo1.png"),
            ])
            .await
            .unwrap();

        // Renamed channel keeps its identity
        cache
            .put_channels(&[Channel::new("b", "RTL 4 HD").with_number(4)])
            .await
            .unwrap();

        let channels = cache.get_channels().await.unwrap();
        let ids: Vec<_> = channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(channels[1].name, "RTL 4 HD");
        assert_eq!(channels[0].logo.as_deref(), Some("https://example.com/npo1.png"));
    }

    #[tokio::test]
    async fn test_segment_freshness() {
        let cache = SqliteCache::in_memory().unwrap();
        let past = SegmentKey::new(ChannelId::new("ch1"), at(6));
        let future = SegmentKey::new(ChannelId::new("ch1"), at(18));
        let now = at(12);

        assert!(!cache.is_segment_fresh(&past, now).await.unwrap());

        cache.put_segment(&past, &[stub("p1", 6, 7)], now).await.unwrap();
        cache.put_segment(&future, &[stub("p2", 18, 19)], now).await.unwrap();

        assert!(cache.is_segment_fresh(&past, now).await.unwrap());
        assert!(!cache.is_segment_fresh(&future, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_fresh_segment_is_not_overwritten() {
        let cache = SqliteCache::in_memory().unwrap();
        let key = SegmentKey::new(ChannelId::new("ch1"), at(0));
        let window = SyncWindow::new(at(0), at(24)).unwrap();

        cache.put_segment(&key, &[stub("p1", 0, 1)], at(8)).await.unwrap();
        cache
            .put_segment(&key, &[stub("changed", 0, 2)], at(9))
            .await
            .unwrap();

        let programs = cache.get_programs(&key.channel_id, &window).await.unwrap();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].id.as_str(), "p1");
    }

    #[tokio::test]
    async fn test_future_segment_is_replaced() {
        let cache = SqliteCache::in_memory().unwrap();
        let key = SegmentKey::new(ChannelId::new("ch1"), at(18));
        let window = SyncWindow::new(at(0), at(24)).unwrap();

        cache
            .put_segment(&key, &[stub("p1", 18, 19), stub("p2", 19, 20)], at(8))
            .await
            .unwrap();
        cache.put_segment(&key, &[stub("p3", 18, 20)], at(9)).await.unwrap();

        let programs = cache.get_programs(&key.channel_id, &window).await.unwrap();
        let ids: Vec<_> = programs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p3"]);
    }

    #[tokio::test]
    async fn test_get_programs_orders_and_deduplicates() {
        let cache = SqliteCache::in_memory().unwrap();
        let channel = ChannelId::new("ch1");
        let now = at(0);

        // "boundary" straddles the 06:00 boundary and is listed in both segments
        cache
            .put_segment(
                &SegmentKey::new(channel.clone(), at(6)),
                &[stub("boundary", 5, 7), stub("late", 8, 9), stub("mid", 7, 8)],
                now,
            )
            .await
            .unwrap();
        cache
            .put_segment(
                &SegmentKey::new(channel.clone(), at(0)),
                &[stub("early", 1, 5), stub("boundary", 5, 7)],
                now,
            )
            .await
            .unwrap();

        let window = SyncWindow::new(at(0), at(12)).unwrap();
        let programs = cache.get_programs(&channel, &window).await.unwrap();
        let ids: Vec<_> = programs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "boundary", "mid", "late"]);

        // Segments outside the window are ignored
        let narrow = SyncWindow::new(at(6), at(12)).unwrap();
        let programs = cache.get_programs(&channel, &narrow).await.unwrap();
        assert_eq!(programs.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_stop_survives_storage() {
        let cache = SqliteCache::in_memory().unwrap();
        let key = SegmentKey::new(ChannelId::new("ch1"), at(18));
        let program = ProgramStub::new("p1", "ch1", "Late show", at(18), None);

        cache.put_segment(&key, &[program.clone()], at(8)).await.unwrap();

        let window = SyncWindow::new(at(0), at(24)).unwrap();
        let programs = cache.get_programs(&key.channel_id, &window).await.unwrap();
        assert_eq!(programs, vec![program]);
    }

    #[tokio::test]
    async fn test_details_are_immutable() {
        let cache = SqliteCache::in_memory().unwrap();
        let id = ProgramId::new("p1");

        assert!(!cache.has_detail(&id).await.unwrap());
        assert!(cache.get_detail(&id).await.unwrap().is_none());

        let detail = ProgramDetail::new("Journaal")
            .with_description("Het nieuws")
            .with_episode(Some(3), Some(12));
        cache.put_detail(&id, &detail, at(1)).await.unwrap();
        cache
            .put_detail(&id, &ProgramDetail::new("Overwritten"), at(2))
            .await
            .unwrap();

        assert!(cache.has_detail(&id).await.unwrap());
        assert_eq!(cache.get_detail(&id).await.unwrap(), Some(detail));

        assert!(cache.evict_detail(&id).await.unwrap());
        assert!(!cache.has_detail(&id).await.unwrap());
        assert!(!cache.evict_detail(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_removes_old_segments_and_orphaned_details() {
        let cache = SqliteCache::in_memory().unwrap();
        let channel = ChannelId::new("ch1");

        cache
            .put_segment(&SegmentKey::new(channel.clone(), at(0)), &[stub("old", 0, 1)], at(20))
            .await
            .unwrap();
        cache
            .put_segment(&SegmentKey::new(channel.clone(), at(12)), &[stub("new", 12, 13)], at(20))
            .await
            .unwrap();
        cache
            .put_detail(&ProgramId::new("old"), &ProgramDetail::new("Old"), at(20))
            .await
            .unwrap();
        cache
            .put_detail(&ProgramId::new("new"), &ProgramDetail::new("New"), at(20))
            .await
            .unwrap();

        let removed = cache.prune(at(6)).await.unwrap();
        assert_eq!(removed, 2);

        assert!(!cache.has_detail(&ProgramId::new("old")).await.unwrap());
        assert!(cache.has_detail(&ProgramId::new("new")).await.unwrap());

        let window = SyncWindow::new(at(0), at(24)).unwrap();
        let programs = cache.get_programs(&channel, &window).await.unwrap();
        assert_eq!(programs.len(), 1);
    }

    #[tokio::test]
    async fn test_data_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");
        let key = SegmentKey::new(ChannelId::new("ch1"), at(6));

        {
            let cache = SqliteCache::new(&path).unwrap();
            cache.put_channels(&[Channel::new("ch1", "NPO 1")]).await.unwrap();
            cache.put_segment(&key, &[stub("p1", 6, 7)], at(8)).await.unwrap();
        }

        let cache = SqliteCache::new(&path).unwrap();
        assert_eq!(cache.get_channels().await.unwrap().len(), 1);
        assert!(cache.is_segment_fresh(&key, at(8)).await.unwrap());
    }
}
