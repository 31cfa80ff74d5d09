use crate::error::AudioError;
use crate::models::{Recording, SongId, SongMetadata};
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// File extensions the loader can decode
pub const KNOWN_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "m4a"];

/// Decodes audio files into mono 16-bit sample buffers
///
/// WAV goes through hound; compressed formats go through symphonia.
pub struct AudioLoader;

impl AudioLoader {
    /// Whether a path looks like audio this loader understands
    pub fn is_supported(path: &Path) -> bool {
        extension(path)
            .is_some_and(|ext| KNOWN_EXTENSIONS.iter().any(|k| k.eq_ignore_ascii_case(ext)))
    }

    /// Loads any supported file as mono i16 samples plus its sample rate
    pub fn load(path: &Path) -> Result<(Vec<i16>, u32), AudioError> {
        match extension(path) {
            Some(ext) if ext.eq_ignore_ascii_case("wav") => Self::load_wav(path),
            _ => Self::decode(path),
        }
    }

    /// Loads a WAV file as mono i16 samples plus its sample rate
    ///
    /// # Processing Steps
    /// 1. Reads integer (8/16/24/32-bit) or float samples
    /// 2. Rescales them to the 16-bit range
    /// 3. Averages interleaved channels down to mono
    pub fn load_wav(path: &Path) -> Result<(Vec<i16>, u32), AudioError> {
        let decode_err = |source| AudioError::Decode {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = hound::WavReader::open(path).map_err(decode_err)?;
        let spec = reader.spec();
        debug!(
            "Audio specs for {} - Sample rate: {}Hz, Channels: {}, Bits: {}",
            path.display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample
        );

        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .map(|s| s.map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<Result<_, _>>(),
            (hound::SampleFormat::Int, 8) => reader
                .samples::<i8>()
                .map(|s| s.map(|s| (s as i16) << 8))
                .collect::<Result<_, _>>(),
            (hound::SampleFormat::Int, 16) => reader.samples::<i16>().collect::<Result<_, _>>(),
            (hound::SampleFormat::Int, 24) => reader
                .samples::<i32>()
                .map(|s| s.map(|s| (s >> 8) as i16))
                .collect::<Result<_, _>>(),
            (hound::SampleFormat::Int, 32) => reader
                .samples::<i32>()
                .map(|s| s.map(|s| (s >> 16) as i16))
                .collect::<Result<_, _>>(),
            (format, bits) => {
                return Err(AudioError::Unsupported {
                    path: path.to_path_buf(),
                    reason: format!("{bits}-bit {format:?} samples"),
                });
            }
        }
        .map_err(decode_err)?;

        let mono = downmix(samples, spec.channels as usize);
        debug!(
            "Loaded {} mono samples ({:.2} seconds)",
            mono.len(),
            mono.len() as f32 / spec.sample_rate as f32
        );
        Ok((mono, spec.sample_rate))
    }

    /// Decodes a compressed file (mp3, flac, m4a, ...) with symphonia
    ///
    /// Only the default track is read. Packets that fail to decode are skipped, the
    /// way a player would skip a damaged frame.
    pub fn decode(path: &Path) -> Result<(Vec<i16>, u32), AudioError> {
        let codec_err = |source| AudioError::Codec {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(|source| AudioError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension(path) {
            hint.with_extension(ext);
        }
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(codec_err)?;
        let mut format = probed.format;

        let unsupported = |reason: &str| AudioError::Unsupported {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        let track = format
            .default_track()
            .ok_or_else(|| unsupported("no audio track"))?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| unsupported("unknown sample rate"))?;
        let mut channels = track.codec_params.channels.map_or(1, |c| c.count());
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(codec_err)?;

        let mut interleaved: Vec<i16> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    break
                }
                Err(err) => return Err(codec_err(err)),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    channels = spec.channels.count();
                    let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    interleaved.extend_from_slice(buffer.samples());
                }
                Err(SymphoniaError::DecodeError(reason)) => {
                    warn!("Skipping bad packet in {}: {}", path.display(), reason);
                }
                Err(err) => return Err(codec_err(err)),
            }
        }

        let mono = downmix(interleaved, channels);
        debug!(
            "Decoded {} mono samples at {}Hz from {}",
            mono.len(),
            sample_rate,
            path.display()
        );
        Ok((mono, sample_rate))
    }

    /// Reads artist, album and title tags
    ///
    /// The album artist, when tagged, is preferred over the track artist. A file
    /// without tags yields empty metadata rather than an error.
    pub fn read_tags(path: &Path) -> Result<SongMetadata, AudioError> {
        let tags_err = |source| AudioError::Tags {
            path: path.to_path_buf(),
            source,
        };
        let tagged_file = Probe::open(path)
            .map_err(tags_err)?
            .read()
            .map_err(tags_err)?;

        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            debug!("No tags in {}", path.display());
            return Ok(SongMetadata::default());
        };

        let artist = tag
            .get_string(&ItemKey::AlbumArtist)
            .map(str::to_string)
            .or_else(|| tag.artist().map(|s| s.to_string()));
        Ok(SongMetadata {
            artist,
            album: tag.album().map(|s| s.to_string()),
            title: tag.title().map(|s| s.to_string()),
        })
    }

    /// Loads a file for registration, taking its metadata from the file's tags
    ///
    /// Without a `song_id` the id is derived from the decoded audio. Unreadable tags
    /// leave the metadata empty, and a missing title falls back to the file name.
    pub fn load_tagged(path: &Path, song_id: Option<SongId>) -> Result<Recording, AudioError> {
        let (samples, sample_rate) = Self::load(path)?;
        let song_id = song_id.unwrap_or_else(|| SongId::from_samples(&samples, sample_rate));

        let mut metadata = Self::read_tags(path).unwrap_or_else(|err| {
            warn!("{}", err);
            SongMetadata::default()
        });
        if metadata.title.is_none() {
            metadata.title = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }

        Ok(Recording {
            song_id,
            metadata,
            samples,
            sample_rate,
        })
    }

    /// Loads a file as a recording ready for registration
    pub fn load_recording(
        path: &Path,
        song_id: SongId,
        metadata: SongMetadata,
    ) -> Result<Recording, AudioError> {
        let (samples, sample_rate) = Self::load(path)?;
        Ok(Recording {
            song_id,
            metadata,
            samples,
            sample_rate,
        })
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Averages interleaved frames down to one channel
fn downmix(samples: Vec<i16>, channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofty::config::WriteOptions;
    use lofty::tag::{Tag, TagExt, TagType};
    use tempfile::tempdir;

    fn write_wav<S: hound::Sample + Copy>(path: &Path, spec: hound::WavSpec, samples: &[S]) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn pcm16(channels: u16, sample_rate: u32) -> hound::WavSpec {
        hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, pcm16(2, 22_050), &[100i16, 300, -50, -150, 7, 8]);

        let (samples, rate) = AudioLoader::load_wav(&path).unwrap();
        assert_eq!(rate, 22_050);
        assert_eq!(samples, vec![200, -100, 7]);
    }

    #[test]
    fn float_samples_are_rescaled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        write_wav(&path, spec, &[0.0f32, 1.0, -1.0, 2.0]);

        let (samples, _) = AudioLoader::load_wav(&path).unwrap();
        assert_eq!(samples, vec![0, i16::MAX, -i16::MAX, i16::MAX]);
    }

    #[test]
    fn symphonia_and_hound_decode_the_same_pcm() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..4000).map(|i| ((i * 37) % 2000 - 1000) as i16).collect();
        let stereo: Vec<i16> = samples.iter().flat_map(|&s| [s, s]).collect();
        write_wav(&path, pcm16(2, 16_000), &stereo);

        let (decoded, rate) = AudioLoader::decode(&path).unwrap();
        assert_eq!(rate, 16_000);
        assert_eq!(decoded, samples);
        assert_eq!(AudioLoader::load(&path).unwrap(), (samples, 16_000));
    }

    #[test]
    fn undecodable_file_is_a_codec_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"definitely not an mpeg stream").unwrap();

        let err = AudioLoader::load(&path).unwrap_err();
        assert!(matches!(err, AudioError::Codec { .. }));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = AudioLoader::load_wav(Path::new("/nonexistent/song.wav")).unwrap_err();
        assert!(matches!(err, AudioError::Decode { .. }));
        let err = AudioLoader::decode(Path::new("/nonexistent/song.flac")).unwrap_err();
        assert!(matches!(err, AudioError::Open { .. }));
    }

    #[test]
    fn recognises_audio_extensions() {
        assert!(AudioLoader::is_supported(Path::new("a/b/song.WAV")));
        assert!(AudioLoader::is_supported(Path::new("song.mp3")));
        assert!(AudioLoader::is_supported(Path::new("song.flac")));
        assert!(AudioLoader::is_supported(Path::new("song.m4a")));
        assert!(!AudioLoader::is_supported(Path::new("cover.jpg")));
        assert!(!AudioLoader::is_supported(Path::new("song")));
    }

    #[test]
    fn untagged_file_has_empty_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.wav");
        write_wav(&path, pcm16(1, 8000), &[0i16; 800]);

        assert_eq!(AudioLoader::read_tags(&path).unwrap(), SongMetadata::default());
    }

    #[test]
    fn tags_prefer_the_album_artist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tagged.wav");
        write_wav(&path, pcm16(1, 8000), &[0i16; 800]);

        let mut tag = Tag::new(TagType::Id3v2);
        tag.set_artist("Guest Singer".to_string());
        tag.set_album("Night Drive".to_string());
        tag.set_title("Overpass".to_string());
        tag.save_to_path(&path, WriteOptions::default()).unwrap();

        let metadata = AudioLoader::read_tags(&path).unwrap();
        assert_eq!(metadata.artist.as_deref(), Some("Guest Singer"));
        assert_eq!(metadata.album.as_deref(), Some("Night Drive"));
        assert_eq!(metadata.title.as_deref(), Some("Overpass"));

        tag.insert_text(ItemKey::AlbumArtist, "The Band".to_string());
        tag.save_to_path(&path, WriteOptions::default()).unwrap();

        let metadata = AudioLoader::read_tags(&path).unwrap();
        assert_eq!(metadata.artist.as_deref(), Some("The Band"));
        // Tags do not disturb the audio
        assert_eq!(AudioLoader::load(&path).unwrap().0.len(), 800);
    }

    #[test]
    fn tagged_load_derives_content_ids_and_default_titles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Harbour Lights.wav");
        let samples: Vec<i16> = (0..1600).map(|i| (i % 200) as i16 * 50).collect();
        write_wav(&path, pcm16(1, 8000), &samples);

        let recording = AudioLoader::load_tagged(&path, None).unwrap();
        assert_eq!(recording.song_id, SongId::from_samples(&samples, 8000));
        assert_eq!(recording.metadata.title.as_deref(), Some("Harbour Lights"));
        assert_eq!(recording.metadata.artist, None);

        // Same audio under another name keeps its content id
        let copy = dir.path().join("copy.wav");
        std::fs::copy(&path, &copy).unwrap();
        let copied = AudioLoader::load_tagged(&copy, None).unwrap();
        assert_eq!(copied.song_id, recording.song_id);

        let named = AudioLoader::load_tagged(&path, Some(SongId::new("given"))).unwrap();
        assert_eq!(named.song_id, SongId::new("given"));
    }
}
