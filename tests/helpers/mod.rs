//! Shared fixtures for integration tests
//!
//! Songs are synthesised from a seed so every run fingerprints the same audio.

#![allow(dead_code)]

use std::f64::consts::PI;
use std::path::Path;

use songprint::Config;

pub const SAMPLE_RATE: u32 = 8000;

/// Samples per analysis hop for `test_config` (0.1 s window, 1/8 overlap)
pub const HOP: usize = 700;

/// Small-window configuration so synthetic songs stay quick to fingerprint
pub fn test_config(db: &Path) -> Config {
    let mut config = Config::default();
    config.database.path = db.to_path_buf();
    config.spectrogram.window_seconds = 0.1;
    config.peaks.box_size = 10;
    config.peaks.point_efficiency = 0.8;
    config.target_zone.start = 0.05;
    config.target_zone.width = 1.0;
    config.target_zone.height = 1000.0;
    config.workers = 4;
    config
}

/// Deterministic pseudo-random source (64-bit LCG)
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Lcg(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1))
    }

    /// Next value in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// A "song" of quarter-second notes, each a chord of three tones between 200 and 3500 Hz
pub fn synth_song(seed: u64, seconds: f64) -> Vec<i16> {
    let mut rng = Lcg::new(seed);
    let total = (seconds * SAMPLE_RATE as f64) as usize;
    let note_len = SAMPLE_RATE as usize / 4;

    let mut samples = Vec::with_capacity(total);
    let mut chord = [0.0f64; 3];
    for n in 0..total {
        if n % note_len == 0 {
            for tone in chord.iter_mut() {
                *tone = 200.0 + rng.next_f64() * 3300.0;
            }
        }
        let t = n as f64 / SAMPLE_RATE as f64;
        let value: f64 = chord.iter().map(|f| (2.0 * PI * f * t).sin() * 3000.0).sum();
        samples.push(value.round() as i16);
    }
    samples
}

/// Adds low-level deterministic noise, well below the tones
pub fn add_noise(samples: &[i16], seed: u64, amplitude: f64) -> Vec<i16> {
    let mut rng = Lcg::new(seed);
    samples
        .iter()
        .map(|&s| {
            let noise = (rng.next_f64() * 2.0 - 1.0) * amplitude;
            (s as f64 + noise).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

/// Writes mono 16-bit samples to a WAV file
pub fn write_wav(path: &Path, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}
