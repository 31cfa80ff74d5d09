use crate::error::IndexError;
use crate::models::{Fingerprint, HashEntry, OffsetPair, SongId, SongMetadata};
use rusqlite::{
    params, params_from_iter, Connection, OpenFlags, OptionalExtension, TransactionBehavior,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Value persisted in place of a missing tag
pub const UNKNOWN: &str = "Unknown";

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
/// Hash values bound per `IN (...)` query, well under SQLite's variable limit
const LOOKUP_CHUNK: usize = 500;

/// Candidate songs for a query, each with its (stored, query) offset pairs
///
/// Ordered by song id so that scoring iterates deterministically.
pub type Matches = BTreeMap<SongId, Vec<OffsetPair>>;

/// Row counts of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub songs: usize,
    pub hashes: usize,
}

/// Persistent multimap from hash value to (offset, song id), plus song metadata
///
/// # Storage Structure
/// - `hash(hash, offset, song_id)`: one row per fingerprint hash, indexed on `hash`
/// - `song_info(artist, album, title, song_id)`: one row per song
///
/// The database runs in WAL mode. Writes go through a single connection guarded by a
/// per-index mutex, so one song's rows are committed as a unit. Each read opens its own
/// connection and never waits on that mutex.
pub struct HashIndex {
    path: PathBuf,
    writer: Mutex<Connection>,
}

impl HashIndex {
    /// Opens (or creates) the index at `path`, creating the schema if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        create_parent_if_needed(&path)?;

        let connection = Connection::open(&path)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        apply_pragmas(&connection)?;
        apply_schema(&connection)?;

        info!("Opened hash index at {}", path.display());
        Ok(HashIndex {
            path,
            writer: Mutex::new(connection),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> Result<Connection, IndexError> {
        let connection = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        Ok(connection)
    }

    /// Stores a song's hashes and metadata in one transaction
    ///
    /// An empty fingerprint writes nothing, so the index never holds metadata that no
    /// hash can reach. Registering the same song again appends duplicate hash rows
    /// and replaces its metadata.
    ///
    /// # Returns
    /// Number of hash rows written
    pub fn insert(
        &self,
        fingerprint: &Fingerprint,
        metadata: &SongMetadata,
    ) -> Result<usize, IndexError> {
        if fingerprint.is_empty() {
            debug!("Skipping empty fingerprint for {}", fingerprint.song_id);
            return Ok(0);
        }

        let mut connection = self.writer.lock().map_err(|_| IndexError::LockPoisoned)?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut insert_hash = tx.prepare_cached(
                "INSERT INTO hash (hash, \"offset\", song_id) VALUES (?1, ?2, ?3)",
            )?;
            for entry in &fingerprint.hashes {
                insert_hash.execute(params![
                    entry.hash as i64,
                    entry.offset,
                    fingerprint.song_id.as_str()
                ])?;
            }
        }
        tx.execute(
            "INSERT INTO song_info (artist, album, title, song_id) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(song_id) DO UPDATE SET
                artist = excluded.artist,
                album = excluded.album,
                title = excluded.title",
            params![
                or_unknown(&metadata.artist),
                or_unknown(&metadata.album),
                or_unknown(&metadata.title),
                fingerprint.song_id.as_str()
            ],
        )?;
        tx.commit()?;

        info!(
            "Stored {} hashes for song {}",
            fingerprint.len(),
            fingerprint.song_id
        );
        Ok(fingerprint.len())
    }

    /// Finds every stored row sharing a hash value with the query
    ///
    /// Each hit pairs the stored offset with the query offset of the same hash value.
    /// When a hash value occurs several times in the query, the offset of its last
    /// occurrence is used for all of its hits.
    pub fn lookup(&self, query: &[HashEntry]) -> Result<Matches, IndexError> {
        let mut query_offsets: HashMap<u64, f64> = HashMap::with_capacity(query.len());
        for entry in query {
            query_offsets.insert(entry.hash, entry.offset);
        }

        let mut matches = Matches::new();
        if query_offsets.is_empty() {
            return Ok(matches);
        }

        let mut distinct: Vec<u64> = query_offsets.keys().copied().collect();
        distinct.sort_unstable();

        let mut connection = self.reader()?;
        // One read transaction, so every chunk sees the same snapshot
        let tx = connection.transaction()?;
        let mut hits = 0usize;
        for chunk in distinct.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT hash, \"offset\", song_id FROM hash WHERE hash IN ({placeholders})"
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter().map(|&h| h as i64)), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            for row in rows {
                let (hash, db_offset, song_id) = row?;
                if let Some(&query_offset) = query_offsets.get(&(hash as u64)) {
                    hits += 1;
                    matches
                        .entry(SongId::new(song_id))
                        .or_default()
                        .push(OffsetPair {
                            db_offset,
                            query_offset,
                        });
                }
            }
        }
        tx.commit()?;

        debug!(
            "Lookup: {} distinct hashes -> {} hits across {} songs",
            distinct.len(),
            hits,
            matches.len()
        );
        Ok(matches)
    }

    /// Metadata stored for a song; sentinel fields come back as `None`
    ///
    /// Missing tags are stored as the literal `"Unknown"`, so a tag whose real value
    /// is `"Unknown"` is indistinguishable from a missing one and also reads back as
    /// `None`.
    pub fn get_metadata(&self, song_id: &SongId) -> Result<Option<SongMetadata>, IndexError> {
        let connection = self.reader()?;
        let metadata = connection
            .query_row(
                "SELECT artist, album, title FROM song_info WHERE song_id = ?1",
                [song_id.as_str()],
                |row| {
                    Ok(SongMetadata {
                        artist: from_stored(row.get(0)?),
                        album: from_stored(row.get(1)?),
                        title: from_stored(row.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(metadata)
    }

    /// Whether a song has already been registered
    pub fn contains(&self, song_id: &SongId) -> Result<bool, IndexError> {
        let connection = self.reader()?;
        let found = connection
            .query_row(
                "SELECT 1 FROM song_info WHERE song_id = ?1",
                [song_id.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn stats(&self) -> Result<IndexStats, IndexError> {
        let connection = self.reader()?;
        let count = |sql: &str| connection.query_row(sql, [], |row| row.get::<_, i64>(0));
        let songs = count("SELECT COUNT(*) FROM song_info")?;
        let hashes = count("SELECT COUNT(*) FROM hash")?;
        Ok(IndexStats {
            songs: songs as usize,
            hashes: hashes as usize,
        })
    }
}

fn create_parent_if_needed(path: &Path) -> Result<(), IndexError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|source| IndexError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

fn apply_pragmas(connection: &Connection) -> Result<(), IndexError> {
    // WAL lets readers run alongside the writer; FULL syncs each commit to disk
    connection.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA wal_autocheckpoint=300;",
    )?;
    Ok(())
}

fn apply_schema(connection: &Connection) -> Result<(), IndexError> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS hash (
            hash INTEGER NOT NULL,
            \"offset\" REAL NOT NULL,
            song_id TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_hash ON hash (hash);
         CREATE TABLE IF NOT EXISTS song_info (
            artist TEXT NOT NULL,
            album TEXT NOT NULL,
            title TEXT NOT NULL,
            song_id TEXT PRIMARY KEY
         );",
    )?;
    Ok(())
}

fn or_unknown(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or(UNKNOWN)
}

fn from_stored(field: String) -> Option<String> {
    (field != UNKNOWN).then_some(field)
}
