pub mod audio;
pub mod config;
pub mod core;
pub mod error;
pub mod fingerprint;
pub mod matcher;
pub mod models;
pub mod peaks;
pub mod spectrogram;
pub mod storage;

pub use audio::AudioLoader;
pub use config::Config;
pub use core::Recognizer;
pub use error::{Error, Result};
pub use fingerprint::AudioFingerprinter;
pub use models::{Recognition, Recording, Registration, SongId, SongMetadata};
pub use storage::HashIndex;
