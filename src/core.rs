use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::fingerprint::AudioFingerprinter;
use crate::matcher::Matcher;
use crate::models::{Recognition, Recording, Registration, SongId, SongMetadata};
use crate::storage::HashIndex;
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Registration and recognition over one hash index
///
/// Registration: spectrogram -> peaks -> hashes -> index insert.
/// Recognition: spectrogram -> peaks -> hashes -> index lookup -> best match.
pub struct Recognizer {
    config: Config,
    fingerprinter: AudioFingerprinter,
    matcher: Matcher,
    index: HashIndex,
}

impl Recognizer {
    pub fn new(config: Config, index: HashIndex) -> Self {
        Recognizer {
            fingerprinter: AudioFingerprinter::new(&config),
            matcher: Matcher::new(config.matching.bin_width),
            config,
            index,
        }
    }

    /// Opens the index named by the configuration
    pub fn open(config: Config) -> Result<Self> {
        let index = HashIndex::open(&config.database.path)?;
        Ok(Recognizer::new(config, index))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &HashIndex {
        &self.index
    }

    /// Fingerprints a buffer and commits it under `song_id`
    ///
    /// Audio too short or quiet to yield a hash is not an error: nothing is
    /// written and the registration reports zero hashes.
    pub fn register(
        &self,
        samples: &[i16],
        sample_rate: u32,
        song_id: &SongId,
        metadata: &SongMetadata,
    ) -> Result<Registration, IndexError> {
        let fingerprint = self
            .fingerprinter
            .generate_fingerprint(samples, sample_rate, song_id);
        if fingerprint.is_empty() {
            warn!("No hashes produced for {}; nothing registered", song_id);
        }
        let hash_count = self.index.insert(&fingerprint, metadata)?;
        Ok(Registration {
            song_id: song_id.clone(),
            hash_count,
        })
    }

    pub fn register_recording(&self, recording: &Recording) -> Result<Registration, IndexError> {
        self.register(
            &recording.samples,
            recording.sample_rate,
            &recording.song_id,
            &recording.metadata,
        )
    }

    /// Identifies the registered song a clip was taken from
    ///
    /// # Returns
    /// The best match with its metadata when known, or `None` when no registered
    /// song shares a consistently aligned hash with the clip
    pub fn recognise(
        &self,
        samples: &[i16],
        sample_rate: u32,
    ) -> Result<Option<Recognition>, IndexError> {
        let hashes = self.fingerprinter.hashes(samples, sample_rate);
        let matches = self.index.lookup(&hashes)?;

        let Some(best) = self.matcher.best_match(&matches) else {
            info!("No match among {} candidates", matches.len());
            return Ok(None);
        };

        let metadata = self.index.get_metadata(&best.song_id)?;
        info!("Matched {} with score {}", best.song_id, best.score);
        Ok(Some(Recognition {
            song_id: best.song_id,
            score: best.score,
            metadata,
        }))
    }

    /// Registers many recordings on a pool of `workers` threads
    ///
    /// `load` runs on the worker, so each worker owns its decoded audio. Results are
    /// returned in input order; one failed item does not stop the others.
    pub fn register_batch<S, F>(
        &self,
        sources: Vec<S>,
        load: F,
    ) -> Result<Vec<Result<Registration>>>
    where
        S: Send,
        F: Fn(S) -> Result<Recording> + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()?;
        debug!(
            "Registering {} recordings on {} workers",
            sources.len(),
            self.config.workers
        );

        let results: Vec<Result<Registration>> = pool.install(|| {
            sources
                .into_par_iter()
                .map(|source| {
                    let recording = load(source)?;
                    let registration = self.register_recording(&recording)?;
                    Ok(registration)
                })
                .collect()
        });

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!("{} of {} registrations failed", failed, results.len());
        }
        Ok(results)
    }
}
