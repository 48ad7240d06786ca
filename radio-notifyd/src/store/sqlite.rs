use std::path::Path;
use anyhow::{Context, Result};
use rusqlite::{Connection, params, OptionalExtension};
use shared::types::{
    ActivityRecord, GuildId, QueryParams, ScoreboardAddress, SnapshotKind, Station,
    StationAddress,
};
use super::ActivityStore;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS stations (
                name              TEXT PRIMARY KEY,
                stream_url        TEXT NOT NULL,
                stream_params     TEXT NOT NULL,
                scoreboard_url    TEXT,
                scoreboard_params TEXT
            );

            CREATE TABLE IF NOT EXISTS activity (
                guild_id   INTEGER PRIMARY KEY,
                channel_id INTEGER NOT NULL,
                station    TEXT NOT NULL,
                started_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_activity_station ON activity(station);

            CREATE TABLE IF NOT EXISTS last_scoreboard (
                station TEXT PRIMARY KEY,
                data    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS current_scoreboard (
                station TEXT PRIMARY KEY,
                data    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS silence_group (
                guild_id INTEGER PRIMARY KEY
            );
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    fn row_to_station(row: &rusqlite::Row) -> Result<Station, rusqlite::Error> {
        let stream_params: String = row.get(2)?;
        let scoreboard_url: Option<String> = row.get(3)?;
        let scoreboard_params: Option<String> = row.get(4)?;

        let stream_params: QueryParams = serde_json::from_str(&stream_params)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?;

        let scoreboard_params: Option<QueryParams> = scoreboard_params
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?;

        Ok(Station {
            name: row.get(0)?,
            stream: StationAddress {
                url: row.get(1)?,
                params: stream_params,
            },
            scoreboard: scoreboard_url.map(|url| ScoreboardAddress {
                url,
                params: scoreboard_params,
            }),
        })
    }

    fn row_to_activity(row: &rusqlite::Row) -> Result<ActivityRecord, rusqlite::Error> {
        let started_at: String = row.get(3)?;
        let started_at = chrono::DateTime::parse_from_rfc3339(&started_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?
            .with_timezone(&chrono::Utc);

        Ok(ActivityRecord {
            guild_id: row.get::<_, i64>(0)? as GuildId,
            channel_id: row.get::<_, i64>(1)? as u64,
            station: row.get(2)?,
            started_at,
        })
    }
}

fn snapshot_table(kind: SnapshotKind) -> &'static str {
    match kind {
        SnapshotKind::Last => "last_scoreboard",
        SnapshotKind::Current => "current_scoreboard",
    }
}

impl ActivityStore for SqliteStore {
    fn add_station(&mut self, station: &Station) -> Result<bool> {
        let stream_params = serde_json::to_string(&station.stream.params)
            .context("Failed to serialize stream params")?;
        let scoreboard_params = station
            .scoreboard
            .as_ref()
            .and_then(|s| s.params.as_ref())
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize scoreboard params")?;

        let inserted = self.conn.execute(
            r#"
            INSERT INTO stations (
                name, stream_url, stream_params, scoreboard_url, scoreboard_params
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(name) DO NOTHING
            "#,
            params![
                &station.name,
                &station.stream.url,
                &stream_params,
                station.scoreboard.as_ref().map(|s| s.url.as_str()),
                scoreboard_params,
            ],
        )
        .context("Failed to insert station")?;

        Ok(inserted > 0)
    }

    fn get_station(&self, name: &str) -> Result<Option<Station>> {
        let station = self
            .conn
            .query_row(
                "SELECT name, stream_url, stream_params, scoreboard_url, scoreboard_params
                 FROM stations WHERE name = ?1",
                params![name],
                Self::row_to_station,
            )
            .optional()
            .context("Failed to query station")?;

        Ok(station)
    }

    fn list_stations(&self) -> Result<Vec<Station>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, stream_url, stream_params, scoreboard_url, scoreboard_params
                 FROM stations ORDER BY name"
            )
            .context("Failed to prepare query")?;

        let stations = stmt
            .query_map([], Self::row_to_station)
            .context("Failed to query stations")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect stations")?;

        Ok(stations)
    }

    fn record_activity(&mut self, record: &ActivityRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO activity (guild_id, channel_id, station, started_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(guild_id) DO UPDATE SET
                channel_id = excluded.channel_id,
                station = excluded.station,
                started_at = excluded.started_at
            "#,
            params![
                record.guild_id as i64,
                record.channel_id as i64,
                &record.station,
                record.started_at.to_rfc3339(),
            ],
        )
        .context("Failed to record activity")?;
        Ok(())
    }

    fn clear_activity(&mut self, guild_id: GuildId) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM activity WHERE guild_id = ?1",
            params![guild_id as i64],
        )
        .context("Failed to clear activity")?;
        Ok(removed)
    }

    fn list_activity(&self) -> Result<Vec<ActivityRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT guild_id, channel_id, station, started_at
                 FROM activity ORDER BY started_at, guild_id"
            )
            .context("Failed to prepare query")?;

        let records = stmt
            .query_map([], Self::row_to_activity)
            .context("Failed to query activity")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect activity")?;

        Ok(records)
    }

    fn get_activity(&self, guild_id: GuildId) -> Result<Option<ActivityRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT guild_id, channel_id, station, started_at
                 FROM activity WHERE guild_id = ?1",
                params![guild_id as i64],
                Self::row_to_activity,
            )
            .optional()
            .context("Failed to query activity")?;

        Ok(record)
    }

    fn get_snapshot(&self, kind: SnapshotKind, station: &str) -> Result<Option<String>> {
        let sql = format!("SELECT data FROM {} WHERE station = ?1", snapshot_table(kind));
        let data = self
            .conn
            .query_row(&sql, params![station], |row| row.get(0))
            .optional()
            .context("Failed to query scoreboard snapshot")?;

        Ok(data)
    }

    fn set_snapshot(&mut self, kind: SnapshotKind, station: &str, data: &str) -> Result<()> {
        let sql = format!("INSERT INTO {} (station, data) VALUES (?1, ?2)", snapshot_table(kind));
        self.conn
            .execute(&sql, params![station, data])
            .context("Failed to set scoreboard snapshot")?;
        Ok(())
    }

    fn update_snapshot(&mut self, kind: SnapshotKind, station: &str, data: &str) -> Result<()> {
        let sql = format!("UPDATE {} SET data = ?1 WHERE station = ?2", snapshot_table(kind));
        self.conn
            .execute(&sql, params![data, station])
            .context("Failed to update scoreboard snapshot")?;
        Ok(())
    }

    fn clear_snapshot(&mut self, kind: SnapshotKind, station: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE station = ?1", snapshot_table(kind));
        self.conn
            .execute(&sql, params![station])
            .context("Failed to clear scoreboard snapshot")?;
        Ok(())
    }

    fn is_silenced(&self, guild_id: GuildId) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM silence_group WHERE guild_id = ?1",
                params![guild_id as i64],
                |_| Ok(()),
            )
            .optional()
            .context("Failed to query silence group")?;

        Ok(found.is_some())
    }

    fn set_silenced(&mut self, guild_id: GuildId) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO silence_group (guild_id) VALUES (?1)",
            params![guild_id as i64],
        )
        .context("Failed to add guild to silence group")?;
        Ok(())
    }

    fn clear_silenced(&mut self, guild_id: GuildId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM silence_group WHERE guild_id = ?1",
            params![guild_id as i64],
        )
        .context("Failed to remove guild from silence group")?;
        Ok(())
    }
}
