//! Test warehouses and song-play fixtures
//!
//! SQLite cannot run `COPY ... FROM 's3://...'`, so [`CopyShimWarehouse`]
//! swaps each COPY for fixture inserts into the target staging table and
//! forwards everything else to an in-memory SQLite warehouse.

#![allow(dead_code)]

use async_trait::async_trait;
use starload_common::warehouse::SqliteWarehouse;
use starload_common::{Dialect, Result, Warehouse};
use starload_etl::queries;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const FIRST_TS: i64 = 1_541_105_830_796;

/// Records statements and reports success without running anything
#[derive(Default)]
pub struct RecordingWarehouse {
    pub batches: Mutex<Vec<Vec<String>>>,
    pub scalar: Option<i64>,
}

impl RecordingWarehouse {
    pub fn statements(&self) -> Vec<String> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.batches.lock().unwrap().push(vec![sql.to_string()]);
        Ok(0)
    }

    async fn execute_atomic(&self, statements: &[String]) -> Result<u64> {
        self.batches.lock().unwrap().push(statements.to_vec());
        Ok(0)
    }

    async fn query_scalar(&self, _sql: &str) -> Result<Option<i64>> {
        Ok(self.scalar)
    }
}

/// SQLite warehouse that loads fixture rows in place of object-storage copies
pub struct CopyShimWarehouse {
    inner: SqliteWarehouse,
    fixtures: HashMap<String, Vec<String>>,
    pub copies: Mutex<Vec<String>>,
}

impl CopyShimWarehouse {
    /// In-memory warehouse with the star-schema tables created
    pub async fn new(fixtures: HashMap<String, Vec<String>>) -> Self {
        let inner = SqliteWarehouse::in_memory().await.unwrap();
        let ddl: Vec<String> = queries::create_tables(Dialect::Sqlite)
            .iter()
            .map(|s| s.to_string())
            .collect();
        inner.execute_atomic(&ddl).await.unwrap();
        Self {
            inner,
            fixtures,
            copies: Mutex::new(Vec::new()),
        }
    }

    pub async fn count(&self, table: &str) -> i64 {
        self.inner
            .query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
            .await
            .unwrap()
            .unwrap()
    }

    fn expand(&self, statement: &str) -> Vec<String> {
        let Some(rest) = statement.strip_prefix("COPY ") else {
            return vec![statement.to_string()];
        };
        self.copies.lock().unwrap().push(statement.to_string());
        let table = rest
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_matches('"');
        self.fixtures.get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Warehouse for CopyShimWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let statements = self.expand(sql);
        self.inner.execute_atomic(&statements).await
    }

    async fn execute_atomic(&self, statements: &[String]) -> Result<u64> {
        let expanded: Vec<String> = statements.iter().flat_map(|s| self.expand(s)).collect();
        self.inner.execute_atomic(&expanded).await
    }

    async fn query_scalar(&self, sql: &str) -> Result<Option<i64>> {
        self.inner.query_scalar(sql).await
    }
}

fn sql_text(value: Option<String>) -> String {
    match value {
        Some(v) => format!("'{}'", v.replace('\'', "''")),
        None => "NULL".to_string(),
    }
}

/// 20 songs by 10 artists
pub fn song_rows(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let artist = i % 10;
            format!(
                "INSERT INTO staging_songs (num_songs, artist_id, artist_name, artist_latitude, \
                 artist_longitude, artist_location, song_id, title, duration, \"year\") \
                 VALUES (1, 'AR{artist:02}', 'Artist {artist}', NULL, NULL, 'City {artist}', \
                 'SO{i:02}', 'Song {i}', {duration:.1}, {year})",
                duration = 200.5 + i as f64,
                year = 2000 + i,
            )
        })
        .collect()
}

/// 100 events by 10 users
///
/// Events 0..50 play a staged song, 50..80 play unknown songs and 80..100
/// are non-play page views.
pub fn event_rows() -> Vec<String> {
    (0..100usize)
        .map(|i| {
            let user = i % 10 + 1;
            let (page, song, artist, length) = if i < 50 {
                let s = i % 20;
                (
                    "NextSong",
                    Some(format!("Song {s}")),
                    Some(format!("Artist {}", s % 10)),
                    format!("{:.1}", 200.5 + s as f64),
                )
            } else if i < 80 {
                (
                    "NextSong",
                    Some(format!("Unknown {i}")),
                    Some("Nobody".to_string()),
                    "99.0".to_string(),
                )
            } else {
                ("Home", None, None, "NULL".to_string())
            };
            format!(
                "INSERT INTO staging_events (artist, auth, firstname, gender, iteminsession, \
                 lastname, length, \"level\", location, \"method\", page, registration, \
                 sessionid, song, status, ts, useragent, userid) \
                 VALUES ({artist}, 'Logged In', 'First{user}', '{gender}', {item}, \
                 'Last{user}', {length}, '{level}', 'Town, ST', 'PUT', '{page}', NULL, \
                 {session}, {song}, 200, {ts}, 'Agent/1.0', {user})",
                artist = sql_text(artist),
                gender = if user % 2 == 0 { "F" } else { "M" },
                item = i % 10,
                level = if user % 3 == 0 { "paid" } else { "free" },
                session = 100 + i / 10,
                song = sql_text(song),
                ts = FIRST_TS + i as i64 * 60_000,
            )
        })
        .collect()
}

/// Fixtures keyed by staging table
pub fn fixtures(song_count: usize) -> HashMap<String, Vec<String>> {
    HashMap::from([
        (queries::STAGING_EVENTS.to_string(), event_rows()),
        (queries::STAGING_SONGS.to_string(), song_rows(song_count)),
    ])
}

pub async fn shim(song_count: usize) -> Arc<CopyShimWarehouse> {
    Arc::new(CopyShimWarehouse::new(fixtures(song_count)).await)
}

/// Fixtures where every staged row appears twice, as after two appending stages
pub fn doubled_fixtures(song_count: usize) -> HashMap<String, Vec<String>> {
    fixtures(song_count)
        .into_iter()
        .map(|(table, rows)| (table, [rows.clone(), rows].concat()))
        .collect()
}

pub async fn shim_with(fixtures: HashMap<String, Vec<String>>) -> Arc<CopyShimWarehouse> {
    Arc::new(CopyShimWarehouse::new(fixtures).await)
}
