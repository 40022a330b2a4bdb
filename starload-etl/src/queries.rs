//! Star-schema statements
//!
//! Insert statements feed the fact and dimension loads; DDL creates the
//! staging and star-schema tables. Statements differ per dialect only where
//! timestamp handling differs (`songplays`, `time`).

use starload_common::Dialect;

pub const STAGING_EVENTS: &str = "staging_events";
pub const STAGING_SONGS: &str = "staging_songs";
pub const SONGPLAYS: &str = "songplays";
pub const USERS: &str = "users";
pub const SONGS: &str = "songs";
pub const ARTISTS: &str = "artists";
pub const TIME: &str = "time";

/// Every table, in creation order
pub const ALL_TABLES: [&str; 7] = [
    STAGING_EVENTS,
    STAGING_SONGS,
    SONGPLAYS,
    USERS,
    SONGS,
    ARTISTS,
    TIME,
];

// One fact row per event: repeated staged songs or events collapse to the
// lowest matching song id
const SONGPLAY_INSERT_REDSHIFT: &str = r#"
INSERT INTO songplays (playid, start_time, userid, "level", songid, artistid, sessionid, location, user_agent)
SELECT playid, start_time, userid, "level", songid, artistid, sessionid, location, user_agent
FROM (SELECT MD5(CAST(events.sessionid AS VARCHAR) || '-' || CAST(events.iteminsession AS VARCHAR) || '-' || CAST(events.ts AS VARCHAR)) AS playid,
             events.start_time,
             events.userid,
             events."level",
             songs.song_id AS songid,
             songs.artist_id AS artistid,
             events.sessionid,
             events.location,
             events.useragent AS user_agent,
             ROW_NUMBER() OVER (PARTITION BY events.sessionid, events.iteminsession, events.ts
                                ORDER BY songs.song_id) AS pick
      FROM (SELECT TIMESTAMP 'epoch' + ts / 1000 * INTERVAL '1 second' AS start_time, *
            FROM staging_events
            WHERE page = 'NextSong') events
      JOIN staging_songs songs
        ON events.song = songs.title
       AND events.artist = songs.artist_name
       AND events.length = songs.duration) plays
WHERE pick = 1
"#;

const SONGPLAY_INSERT_SQLITE: &str = r#"
INSERT INTO songplays (playid, start_time, userid, "level", songid, artistid, sessionid, location, user_agent)
SELECT playid, start_time, userid, "level", songid, artistid, sessionid, location, user_agent
FROM (SELECT events.sessionid || '-' || events.iteminsession || '-' || events.ts AS playid,
             strftime('%Y-%m-%d %H:%M:%S', events.ts / 1000, 'unixepoch') AS start_time,
             events.userid,
             events."level",
             songs.song_id AS songid,
             songs.artist_id AS artistid,
             events.sessionid,
             events.location,
             events.useragent AS user_agent,
             ROW_NUMBER() OVER (PARTITION BY events.sessionid, events.iteminsession, events.ts
                                ORDER BY songs.song_id) AS pick
      FROM staging_events events
      JOIN staging_songs songs
        ON events.song = songs.title
       AND events.artist = songs.artist_name
       AND events.length = songs.duration
      WHERE events.page = 'NextSong') plays
WHERE pick = 1
"#;

// One row per user, carrying the level of their most recent event
const USER_INSERT: &str = r#"
INSERT INTO users (userid, first_name, last_name, gender, "level")
SELECT userid, firstname, lastname, gender, "level"
FROM (SELECT userid, firstname, lastname, gender, "level",
             ROW_NUMBER() OVER (PARTITION BY userid ORDER BY ts DESC) AS recency
      FROM staging_events
      WHERE page = 'NextSong' AND userid IS NOT NULL) latest
WHERE recency = 1
"#;

const SONG_INSERT: &str = r#"
INSERT INTO songs (songid, title, artistid, "year", duration)
SELECT song_id, title, artist_id, "year", duration
FROM (SELECT song_id, title, artist_id, "year", duration,
             ROW_NUMBER() OVER (PARTITION BY song_id ORDER BY title) AS pick
      FROM staging_songs
      WHERE song_id IS NOT NULL) distinct_songs
WHERE pick = 1
"#;

const ARTIST_INSERT: &str = r#"
INSERT INTO artists (artistid, name, location, latitude, longitude)
SELECT artist_id, artist_name, artist_location, artist_latitude, artist_longitude
FROM (SELECT artist_id, artist_name, artist_location, artist_latitude, artist_longitude,
             ROW_NUMBER() OVER (PARTITION BY artist_id ORDER BY song_id) AS pick
      FROM staging_songs
      WHERE artist_id IS NOT NULL) distinct_artists
WHERE pick = 1
"#;

const TIME_INSERT_REDSHIFT: &str = r#"
INSERT INTO "time" (start_time, "hour", "day", week, "month", "year", weekday)
SELECT DISTINCT start_time,
       EXTRACT(hour FROM start_time),
       EXTRACT(day FROM start_time),
       EXTRACT(week FROM start_time),
       EXTRACT(month FROM start_time),
       EXTRACT(year FROM start_time),
       EXTRACT(dayofweek FROM start_time)
FROM songplays
"#;

const TIME_INSERT_SQLITE: &str = r#"
INSERT INTO "time" (start_time, "hour", "day", week, "month", "year", weekday)
SELECT DISTINCT start_time,
       CAST(strftime('%H', start_time) AS INTEGER),
       CAST(strftime('%d', start_time) AS INTEGER),
       CAST(strftime('%W', start_time) AS INTEGER),
       CAST(strftime('%m', start_time) AS INTEGER),
       CAST(strftime('%Y', start_time) AS INTEGER),
       CAST(strftime('%w', start_time) AS INTEGER)
FROM songplays
"#;

const CREATE_REDSHIFT: [&str; 7] = [
    r#"CREATE TABLE IF NOT EXISTS staging_events (
    artist VARCHAR(256),
    auth VARCHAR(256),
    firstname VARCHAR(256),
    gender VARCHAR(256),
    iteminsession INT4,
    lastname VARCHAR(256),
    length FLOAT8,
    "level" VARCHAR(256),
    location VARCHAR(256),
    "method" VARCHAR(256),
    page VARCHAR(256),
    registration FLOAT8,
    sessionid INT4,
    song VARCHAR(256),
    status INT4,
    ts INT8,
    useragent VARCHAR(256),
    userid INT4
)"#,
    r#"CREATE TABLE IF NOT EXISTS staging_songs (
    num_songs INT4,
    artist_id VARCHAR(256),
    artist_name VARCHAR(256),
    artist_latitude FLOAT8,
    artist_longitude FLOAT8,
    artist_location VARCHAR(256),
    song_id VARCHAR(256),
    title VARCHAR(256),
    duration FLOAT8,
    "year" INT4
)"#,
    r#"CREATE TABLE IF NOT EXISTS songplays (
    playid VARCHAR(32) NOT NULL,
    start_time TIMESTAMP NOT NULL,
    userid INT4 NOT NULL,
    "level" VARCHAR(256),
    songid VARCHAR(256),
    artistid VARCHAR(256),
    sessionid INT4,
    location VARCHAR(256),
    user_agent VARCHAR(256),
    PRIMARY KEY (playid)
)"#,
    r#"CREATE TABLE IF NOT EXISTS users (
    userid INT4 NOT NULL,
    first_name VARCHAR(256),
    last_name VARCHAR(256),
    gender VARCHAR(256),
    "level" VARCHAR(256),
    PRIMARY KEY (userid)
)"#,
    r#"CREATE TABLE IF NOT EXISTS songs (
    songid VARCHAR(256) NOT NULL,
    title VARCHAR(256),
    artistid VARCHAR(256),
    "year" INT4,
    duration FLOAT8,
    PRIMARY KEY (songid)
)"#,
    r#"CREATE TABLE IF NOT EXISTS artists (
    artistid VARCHAR(256) NOT NULL,
    name VARCHAR(256),
    location VARCHAR(256),
    latitude FLOAT8,
    longitude FLOAT8,
    PRIMARY KEY (artistid)
)"#,
    r#"CREATE TABLE IF NOT EXISTS "time" (
    start_time TIMESTAMP NOT NULL,
    "hour" INT4,
    "day" INT4,
    week INT4,
    "month" INT4,
    "year" INT4,
    weekday INT4,
    PRIMARY KEY (start_time)
)"#,
];

const CREATE_SQLITE: [&str; 7] = [
    r#"CREATE TABLE IF NOT EXISTS staging_events (
    artist TEXT,
    auth TEXT,
    firstname TEXT,
    gender TEXT,
    iteminsession INTEGER,
    lastname TEXT,
    length REAL,
    "level" TEXT,
    location TEXT,
    "method" TEXT,
    page TEXT,
    registration REAL,
    sessionid INTEGER,
    song TEXT,
    status INTEGER,
    ts INTEGER,
    useragent TEXT,
    userid INTEGER
)"#,
    r#"CREATE TABLE IF NOT EXISTS staging_songs (
    num_songs INTEGER,
    artist_id TEXT,
    artist_name TEXT,
    artist_latitude REAL,
    artist_longitude REAL,
    artist_location TEXT,
    song_id TEXT,
    title TEXT,
    duration REAL,
    "year" INTEGER
)"#,
    r#"CREATE TABLE IF NOT EXISTS songplays (
    playid TEXT NOT NULL PRIMARY KEY,
    start_time TEXT NOT NULL,
    userid INTEGER NOT NULL,
    "level" TEXT,
    songid TEXT,
    artistid TEXT,
    sessionid INTEGER,
    location TEXT,
    user_agent TEXT
)"#,
    r#"CREATE TABLE IF NOT EXISTS users (
    userid INTEGER NOT NULL PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    gender TEXT,
    "level" TEXT
)"#,
    r#"CREATE TABLE IF NOT EXISTS songs (
    songid TEXT NOT NULL PRIMARY KEY,
    title TEXT,
    artistid TEXT,
    "year" INTEGER,
    duration REAL
)"#,
    r#"CREATE TABLE IF NOT EXISTS artists (
    artistid TEXT NOT NULL PRIMARY KEY,
    name TEXT,
    location TEXT,
    latitude REAL,
    longitude REAL
)"#,
    r#"CREATE TABLE IF NOT EXISTS "time" (
    start_time TEXT NOT NULL PRIMARY KEY,
    "hour" INTEGER,
    "day" INTEGER,
    week INTEGER,
    "month" INTEGER,
    "year" INTEGER,
    weekday INTEGER
)"#,
];

/// The five insert statements of the star schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarSchemaSql {
    pub songplays: String,
    pub users: String,
    pub songs: String,
    pub artists: String,
    pub time: String,
}

impl StarSchemaSql {
    pub fn for_dialect(dialect: Dialect) -> Self {
        let (songplays, time) = match dialect {
            Dialect::Redshift => (SONGPLAY_INSERT_REDSHIFT, TIME_INSERT_REDSHIFT),
            Dialect::Sqlite => (SONGPLAY_INSERT_SQLITE, TIME_INSERT_SQLITE),
        };
        Self {
            songplays: songplays.trim().to_string(),
            users: USER_INSERT.trim().to_string(),
            songs: SONG_INSERT.trim().to_string(),
            artists: ARTIST_INSERT.trim().to_string(),
            time: time.trim().to_string(),
        }
    }
}

/// `CREATE TABLE IF NOT EXISTS` for every table
pub fn create_tables(dialect: Dialect) -> &'static [&'static str] {
    match dialect {
        Dialect::Redshift => &CREATE_REDSHIFT,
        Dialect::Sqlite => &CREATE_SQLITE,
    }
}

/// `DROP TABLE IF EXISTS` for every table, dependents first
pub fn drop_tables() -> Vec<String> {
    ALL_TABLES
        .iter()
        .rev()
        .map(|t| format!("DROP TABLE IF EXISTS \"{}\"", t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_insert_targets_its_table() {
        for dialect in [Dialect::Redshift, Dialect::Sqlite] {
            let sql = StarSchemaSql::for_dialect(dialect);
            assert!(sql.songplays.starts_with("INSERT INTO songplays"));
            assert!(sql.users.starts_with("INSERT INTO users"));
            assert!(sql.songs.starts_with("INSERT INTO songs"));
            assert!(sql.artists.starts_with("INSERT INTO artists"));
            assert!(sql.time.starts_with("INSERT INTO \"time\""));
        }
    }

    #[test]
    fn test_songplays_only_joined_events() {
        let sql = StarSchemaSql::for_dialect(Dialect::Redshift);
        assert!(sql.songplays.contains("page = 'NextSong'"));
        assert!(sql.songplays.contains("      JOIN staging_songs songs\n"));
        assert!(sql.songplays.contains("PARTITION BY events.sessionid, events.iteminsession, events.ts"));
        assert!(sql.songplays.trim_end().ends_with("WHERE pick = 1"));
        assert!(!sql.songplays.contains("LEFT JOIN"));
    }

    #[test]
    fn test_ddl_covers_every_table() {
        for dialect in [Dialect::Redshift, Dialect::Sqlite] {
            let ddl = create_tables(dialect);
            assert_eq!(ddl.len(), ALL_TABLES.len());
            for (statement, table) in ddl.iter().zip(ALL_TABLES) {
                let quoted = format!("\"{}\"", table);
                assert!(
                    statement.contains(&format!("EXISTS {} (", table))
                        || statement.contains(&format!("EXISTS {} (", quoted)),
                    "{table}"
                );
            }
        }
        assert_eq!(drop_tables()[0], "DROP TABLE IF EXISTS \"time\"");
    }
}
