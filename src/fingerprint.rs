use crate::config::{Config, TargetZone};
use crate::models::{Fingerprint, HashEntry, Landmark, PeakPoint, SongId};
use crate::peaks::PeakExtractor;
use crate::spectrogram::SpectrogramGenerator;
use tracing::debug;

/// Width of each packed hash field
const FIELD_BITS: u32 = 21;
const FIELD_MASK: u64 = (1 << FIELD_BITS) - 1;

/// Packs an anchor/target pair into a 64-bit hash
///
/// # Hash Structure (64 bits)
/// - bit 63: always zero, so hashes store losslessly as signed SQLite integers
/// - bits 62..42: anchor frequency bin
/// - bits 41..21: target frequency bin
/// - bits 20..0: target time bin minus anchor time bin (two's complement)
///
/// Each field is masked to 21 bits. The hash depends only on the two frequencies
/// and the time delta, never on absolute time, and swapping anchor and target
/// yields a different value whenever their frequency bins differ.
pub fn hash_pair(anchor: &Landmark, target: &Landmark) -> u64 {
    let anchor_freq = anchor.freq_bin as u64 & FIELD_MASK;
    let target_freq = target.freq_bin as u64 & FIELD_MASK;
    let delta = (target.time_bin as i64 - anchor.time_bin as i64) as u64 & FIELD_MASK;

    (anchor_freq << (2 * FIELD_BITS)) | (target_freq << FIELD_BITS) | delta
}

/// Pairs every landmark with the landmarks in its target zone
#[derive(Clone, Debug)]
pub struct FingerprintHasher {
    zone: TargetZone,
}

impl FingerprintHasher {
    pub fn new(zone: TargetZone) -> Self {
        FingerprintHasher { zone }
    }

    /// Whether `point` lies in the closed target zone of `anchor`
    ///
    /// The zone starts `start` seconds after the anchor, lasts `width` seconds and
    /// spans `height` Hz centred on the anchor frequency.
    pub fn in_target_zone(&self, anchor: &PeakPoint, point: &PeakPoint) -> bool {
        let t_min = anchor.time + self.zone.start;
        let t_max = t_min + self.zone.width;
        let f_min = anchor.frequency - self.zone.height * 0.5;
        let f_max = f_min + self.zone.height;

        (f_min..=f_max).contains(&point.frequency) && (t_min..=t_max).contains(&point.time)
    }

    /// Hashes every (anchor, target) pair, tagging each with the anchor's time
    ///
    /// Targets are chosen purely by position, so a landmark listed before the anchor
    /// still pairs with it. O(n²) in the number of points.
    pub fn hash_points(&self, points: &[PeakPoint]) -> Vec<HashEntry> {
        let mut hashes = Vec::new();
        for (i, anchor) in points.iter().enumerate() {
            for (j, target) in points.iter().enumerate() {
                if i == j || !self.in_target_zone(anchor, target) {
                    continue;
                }
                hashes.push(HashEntry {
                    hash: hash_pair(&anchor.landmark, &target.landmark),
                    offset: anchor.time,
                });
            }
        }
        hashes
    }
}

/// Main fingerprinting engine
///
/// # Process
/// 1. Converts mono PCM to a power spectrogram
/// 2. Extracts the strongest locally dominant landmarks
/// 3. Pairs landmarks through their target zones into time-invariant hashes
///
/// Every stage is synchronous and deterministic: the same samples and
/// configuration always produce the same hashes.
#[derive(Clone, Debug)]
pub struct AudioFingerprinter {
    spectrogram: SpectrogramGenerator,
    peaks: PeakExtractor,
    hasher: FingerprintHasher,
}

impl AudioFingerprinter {
    pub fn new(config: &Config) -> Self {
        AudioFingerprinter {
            spectrogram: SpectrogramGenerator::new(config.spectrogram.window_seconds),
            peaks: PeakExtractor::new(config.peaks.box_size, config.peaks.point_efficiency),
            hasher: FingerprintHasher::new(config.target_zone),
        }
    }

    /// Extracts landmarks and maps them onto frequency/time values
    pub fn landmarks(&self, samples: &[i16], sample_rate: u32) -> Vec<PeakPoint> {
        let spectrogram = self.spectrogram.generate(samples, sample_rate);
        let landmarks = self.peaks.extract(spectrogram.power());
        spectrogram.to_points(&landmarks)
    }

    /// Generates the hashes of a sample buffer
    ///
    /// # Returns
    /// Empty when the buffer is shorter than one analysis window or silent
    pub fn hashes(&self, samples: &[i16], sample_rate: u32) -> Vec<HashEntry> {
        let points = self.landmarks(samples, sample_rate);
        let hashes = self.hasher.hash_points(&points);
        debug!(
            "Fingerprint: {} landmarks -> {} hashes",
            points.len(),
            hashes.len()
        );
        hashes
    }

    /// Generates the fingerprint of a recording registered under `song_id`
    pub fn generate_fingerprint(
        &self,
        samples: &[i16],
        sample_rate: u32,
        song_id: &SongId,
    ) -> Fingerprint {
        Fingerprint {
            song_id: song_id.clone(),
            hashes: self.hashes(samples, sample_rate),
        }
    }
}
