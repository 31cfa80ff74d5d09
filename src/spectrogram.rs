use crate::models::{Landmark, PeakPoint};
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;
use tracing::debug;

/// Taper fraction of the Tukey analysis window
const TUKEY_ALPHA: f64 = 0.25;
/// Consecutive segments overlap by `nperseg / OVERLAP_DIVISOR` samples
const OVERLAP_DIVISOR: usize = 8;

/// Dense non-negative energy values indexed `[frequency-bin][time-bin]`
#[derive(Clone, Debug, PartialEq)]
pub struct EnergyGrid {
    height: usize,
    width: usize,
    cells: Vec<f64>, // Row-major: one row per frequency bin
}

impl EnergyGrid {
    pub fn zeros(height: usize, width: usize) -> Self {
        EnergyGrid {
            height,
            width,
            cells: vec![0.0; height * width],
        }
    }

    /// Builds a grid from frequency rows; `None` if the rows differ in length
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Option<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != width) {
            return None;
        }
        Some(EnergyGrid {
            height,
            width,
            cells: rows.into_iter().flatten().collect(),
        })
    }

    /// Number of frequency bins
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of time bins
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, freq_bin: usize, time_bin: usize) -> f64 {
        self.cells[freq_bin * self.width + time_bin]
    }

    pub fn set(&mut self, freq_bin: usize, time_bin: usize, value: f64) {
        self.cells[freq_bin * self.width + time_bin] = value;
    }

    pub(crate) fn cells(&self) -> &[f64] {
        &self.cells
    }
}

/// Short-time power spectrum of a sample buffer
///
/// Invariant: `power` is `frequencies.len()` rows by `times.len()` columns.
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrogram {
    frequencies: Vec<f64>,
    times: Vec<f64>,
    power: EnergyGrid,
}

impl Spectrogram {
    /// Frequency of each row, in Hz
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Centre of each analysis segment, in seconds
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn power(&self) -> &EnergyGrid {
        &self.power
    }

    /// Maps grid landmarks onto the frequency and time axes
    pub fn to_points(&self, landmarks: &[Landmark]) -> Vec<PeakPoint> {
        landmarks
            .iter()
            .map(|&landmark| PeakPoint {
                landmark,
                frequency: self.frequencies[landmark.freq_bin],
                time: self.times[landmark.time_bin],
            })
            .collect()
    }
}

/// Computes power spectrograms with a fixed window duration
///
/// Follows the conventional scipy `spectrogram` defaults so stored indexes stay
/// comparable: periodic Tukey window (α = 0.25), `nperseg / 8` overlap, per-segment
/// mean removal, one-sided power spectral density. Values are linear power, not dB.
#[derive(Clone, Debug)]
pub struct SpectrogramGenerator {
    window_seconds: f64,
}

impl SpectrogramGenerator {
    pub fn new(window_seconds: f64) -> Self {
        SpectrogramGenerator { window_seconds }
    }

    /// Window length in samples at the given rate
    pub fn segment_len(&self, sample_rate: u32) -> usize {
        (sample_rate as f64 * self.window_seconds) as usize
    }

    /// Generates the spectrogram of a mono buffer
    ///
    /// A buffer shorter than one window produces zero time bins.
    pub fn generate(&self, samples: &[i16], sample_rate: u32) -> Spectrogram {
        let nperseg = self.segment_len(sample_rate);
        if nperseg < 2 {
            return Spectrogram {
                frequencies: Vec::new(),
                times: Vec::new(),
                power: EnergyGrid::zeros(0, 0),
            };
        }

        let fs = sample_rate as f64;
        let freq_bins = nperseg / 2 + 1;
        let frequencies: Vec<f64> = (0..freq_bins)
            .map(|k| k as f64 * fs / nperseg as f64)
            .collect();

        let overlap = nperseg / OVERLAP_DIVISOR;
        let hop = nperseg - overlap;
        let segments = if samples.len() < nperseg {
            0
        } else {
            (samples.len() - overlap) / hop
        };

        let times: Vec<f64> = (0..segments)
            .map(|i| (nperseg as f64 / 2.0 + (i * hop) as f64) / fs)
            .collect();
        let mut power = EnergyGrid::zeros(freq_bins, segments);

        if segments > 0 {
            let window = tukey_window(nperseg, TUKEY_ALPHA);
            let scale = 1.0 / (fs * window.iter().map(|w| w * w).sum::<f64>());

            let mut planner = FftPlanner::new();
            let fft = planner.plan_fft_forward(nperseg);
            let mut buffer = vec![Complex::new(0.0, 0.0); nperseg];
            let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

            for segment in 0..segments {
                let start = segment * hop;
                let frame = &samples[start..start + nperseg];
                let mean = frame.iter().map(|&s| s as f64).sum::<f64>() / nperseg as f64;

                for ((slot, &sample), &w) in buffer.iter_mut().zip(frame).zip(&window) {
                    *slot = Complex::new((sample as f64 - mean) * w, 0.0);
                }
                fft.process_with_scratch(&mut buffer, &mut scratch);

                for (bin, value) in buffer.iter().take(freq_bins).enumerate() {
                    let mut density = value.norm_sqr() * scale;
                    // One-sided spectrum: fold the negative frequencies onto the positive
                    // ones, except DC and (for even lengths) Nyquist which have no mirror
                    let is_nyquist = nperseg % 2 == 0 && bin == nperseg / 2;
                    if bin != 0 && !is_nyquist {
                        density *= 2.0;
                    }
                    power.set(bin, segment, density);
                }
            }
        }

        debug!(
            "Spectrogram: {} samples @ {}Hz -> {} bins x {} segments",
            samples.len(),
            sample_rate,
            freq_bins,
            segments
        );

        Spectrogram {
            frequencies,
            times,
            power,
        }
    }
}

/// Periodic Tukey window: a flat top with cosine tapers over `alpha` of its length
fn tukey_window(len: usize, alpha: f64) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    // A periodic window is the symmetric window one sample longer, truncated
    let m = len + 1;
    let denom = (m - 1) as f64;
    let width = (alpha * denom / 2.0).floor() as usize;

    (0..len)
        .map(|i| {
            let n = i as f64;
            if i <= width {
                0.5 * (1.0 + (PI * (-1.0 + 2.0 * n / alpha / denom)).cos())
            } else if i >= m - width - 1 {
                0.5 * (1.0 + (PI * (-2.0 / alpha + 1.0 + 2.0 * n / alpha / denom)).cos())
            } else {
                1.0
            }
        })
        .collect()
}
