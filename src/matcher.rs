use crate::models::{OffsetPair, SongId};
use crate::storage::Matches;
use std::collections::HashMap;
use tracing::debug;

/// Winning candidate of a lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BestMatch {
    pub song_id: SongId,
    pub score: usize,
}

/// Scores candidates by how consistently their hits line up in time
///
/// A true match has most hits at one constant `db_offset - query_offset` (the
/// position of the clip inside the song); chance collisions spread out. The score
/// is the height of the tallest bin of the offset-difference histogram.
#[derive(Clone, Debug)]
pub struct Matcher {
    bin_width: f64,
}

impl Matcher {
    pub fn new(bin_width: f64) -> Self {
        Matcher { bin_width }
    }

    /// Tallest histogram bin of the offset differences
    ///
    /// Bins start one unit below the truncated smallest difference. Zero or one
    /// pair scores its own count.
    pub fn score(&self, pairs: &[OffsetPair]) -> usize {
        if pairs.len() <= 1 {
            return pairs.len();
        }

        let min_delta = pairs
            .iter()
            .map(OffsetPair::delta)
            .fold(f64::INFINITY, f64::min);
        let origin = min_delta.trunc() - 1.0;

        let mut bins: HashMap<i64, usize> = HashMap::new();
        for pair in pairs {
            let bin = ((pair.delta() - origin) / self.bin_width).floor() as i64;
            *bins.entry(bin).or_insert(0) += 1;
        }
        bins.into_values().max().unwrap_or(0)
    }

    /// Picks the single best candidate, or `None` when nothing scores above zero
    ///
    /// Candidates are visited in map order; a later song must score strictly higher
    /// to replace the current best. A song with fewer pairs than the best score so
    /// far cannot beat it (a bin never holds more than every pair) and is skipped
    /// without building its histogram.
    pub fn best_match(&self, matches: &Matches) -> Option<BestMatch> {
        let mut best: Option<BestMatch> = None;
        let mut best_score = 0;

        for (song_id, pairs) in matches {
            if pairs.len() < best_score {
                continue;
            }
            let score = self.score(pairs);
            if score > best_score {
                best_score = score;
                best = Some(BestMatch {
                    song_id: song_id.clone(),
                    score,
                });
            }
        }

        if let Some(best) = &best {
            debug!(
                "Best of {} candidates: {} (score {})",
                matches.len(),
                best.song_id,
                best.score
            );
        }
        best
    }
}
