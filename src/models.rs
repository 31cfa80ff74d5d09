use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Stable identifier joining hash rows to their song metadata
///
/// Identical input always derives the same id, so registering a recording twice
/// addresses the same song. Three derivations are offered:
/// - [`SongId::from_samples`]: SHA-256 of the PCM content (collision resistant)
/// - [`SongId::from_path`]: UUIDv5 of the path string. Two different files that
///   share a path (e.g. a file replaced in place) collide, so prefer content ids
///   when files can change under the same name
/// - [`SongId::new`]: caller supplied
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct SongId(String);

impl SongId {
    pub fn new(id: impl Into<String>) -> Self {
        SongId(id.into())
    }

    /// Derives an id from the path string, rendered as the decimal value of the UUID
    pub fn from_path(path: &Path) -> Self {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, path.to_string_lossy().as_bytes());
        SongId(uuid.as_u128().to_string())
    }

    /// Derives an id from the sample content and rate
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(sample_rate.to_le_bytes());
        for sample in samples {
            hasher.update(sample.to_le_bytes());
        }
        SongId(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag information for a registered song
/// Every field is optional; missing fields are persisted as a sentinel value
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SongMetadata {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
}

impl SongMetadata {
    pub fn titled(title: impl Into<String>) -> Self {
        SongMetadata {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// A local energy maximum, addressed by its spectrogram cell
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Landmark {
    pub freq_bin: usize, // Row in the energy grid
    pub time_bin: usize, // Column in the energy grid
}

/// A landmark mapped onto the spectrogram axes
/// The bins are kept next to the physical values so hashes can be built from exact integers
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakPoint {
    pub landmark: Landmark,
    pub frequency: f64, // Hz
    pub time: f64,      // Seconds from the start of the buffer
}

/// One anchor/target pair: the packed hash and the anchor's time in seconds
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct HashEntry {
    pub hash: u64,
    pub offset: f64,
}

/// Every hash derived from one recording, all sharing the same song id
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Fingerprint {
    pub song_id: SongId,
    pub hashes: Vec<HashEntry>,
}

impl Fingerprint {
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }
}

/// A stored hash offset paired with the query offset of the same hash value
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OffsetPair {
    pub db_offset: f64,
    pub query_offset: f64,
}

impl OffsetPair {
    pub fn delta(&self) -> f64 {
        self.db_offset - self.query_offset
    }
}

/// Mono PCM plus the identity and tags to register it under
#[derive(Clone, Debug)]
pub struct Recording {
    pub song_id: SongId,
    pub metadata: SongMetadata,
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// Outcome of registering one recording
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub song_id: SongId,
    pub hash_count: usize, // Zero when the recording produced no landmarks
}

/// Best match for a query clip
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Recognition {
    pub song_id: SongId,
    pub score: usize, // Height of the tallest offset histogram bin
    pub metadata: Option<SongMetadata>,
}
