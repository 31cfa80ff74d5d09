//! songprint - register songs and recognise recordings of them

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use songprint::{AudioLoader, Config, Error, Recognizer, SongId, SongMetadata};

/// Command-line arguments for songprint
#[derive(Parser, Debug)]
#[command(name = "songprint")]
#[command(about = "Acoustic fingerprint registration and recognition")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "SONGPRINT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialise the index database; needs to be done before other commands
    Initialise,
    /// Register a song or a directory of songs
    Register {
        /// Audio file (wav, mp3, flac, m4a) or a directory of them
        path: PathBuf,
        /// Artist tag (single file only)
        #[arg(long)]
        artist: Option<String>,
        /// Album tag (single file only)
        #[arg(long)]
        album: Option<String>,
        /// Title tag (single file only; defaults to the file name)
        #[arg(long)]
        title: Option<String>,
        /// Identify songs by their audio content instead of their path
        #[arg(long)]
        content_id: bool,
    },
    /// Recognise the song a recording was taken from
    Recognise {
        /// Audio file to identify
        path: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr so command output stays machine readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "songprint=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let recognizer = Recognizer::open(config).context("Failed to open hash index")?;

    match args.command {
        Command::Initialise => {
            let stats = recognizer.index().stats()?;
            println!(
                "Initialised {} ({} songs, {} hashes)",
                recognizer.index().path().display(),
                stats.songs,
                stats.hashes
            );
        }
        Command::Register {
            path,
            artist,
            album,
            title,
            content_id,
        } => {
            let overrides = SongMetadata {
                artist,
                album,
                title,
            };
            register(&recognizer, &path, overrides, content_id)?;
        }
        Command::Recognise { path, json } => {
            let (samples, sample_rate) = AudioLoader::load(&path)?;
            let recognition = recognizer.recognise(&samples, sample_rate)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&recognition)?);
            } else {
                match recognition {
                    Some(found) => match found.metadata {
                        Some(meta) => println!(
                            "{} by {} ({}) [score {}]",
                            meta.title.as_deref().unwrap_or("Unknown title"),
                            meta.artist.as_deref().unwrap_or("Unknown artist"),
                            meta.album.as_deref().unwrap_or("Unknown album"),
                            found.score
                        ),
                        None => println!("Song {} [score {}]", found.song_id, found.score),
                    },
                    None => println!("No match found"),
                }
            }
        }
    }

    Ok(())
}

/// Registers one file, or every supported file in a directory, skipping songs
/// already in the index
///
/// Metadata comes from the file's tags; for a single file, tags given on the command
/// line take precedence.
fn register(
    recognizer: &Recognizer,
    path: &Path,
    overrides: SongMetadata,
    content_id: bool,
) -> Result<()> {
    let single_file = path.is_file();
    let files = if single_file {
        vec![path.to_path_buf()]
    } else if path.is_dir() {
        let mut files = Vec::new();
        let entries =
            std::fs::read_dir(path).with_context(|| format!("Failed to read {}", path.display()))?;
        for entry in entries {
            let file = entry?.path();
            if file.is_file() && AudioLoader::is_supported(&file) {
                files.push(file);
            }
        }
        files.sort();
        files
    } else {
        bail!("{} is neither a file nor a directory", path.display());
    };

    // Path ids are known up front; content ids only once the audio is decoded
    let mut pending = Vec::new();
    for file in files {
        let file = file.canonicalize().unwrap_or(file);
        if content_id {
            pending.push((file, None));
            continue;
        }
        let song_id = SongId::from_path(&file);
        if recognizer.index().contains(&song_id)? {
            info!("Already registered: {}", file.display());
            continue;
        }
        pending.push((file, Some(song_id)));
    }
    info!(
        "Registering {} files on {} workers",
        pending.len(),
        recognizer.config().workers
    );

    let files: Vec<PathBuf> = pending.iter().map(|(file, _)| file.clone()).collect();
    let results = recognizer.register_batch(pending, |(file, song_id)| {
        let mut recording = AudioLoader::load_tagged(&file, song_id)?;
        if content_id && recognizer.index().contains(&recording.song_id)? {
            return Err(Error::AlreadyRegistered(recording.song_id));
        }
        if single_file {
            let metadata = &mut recording.metadata;
            metadata.artist = overrides.artist.clone().or(metadata.artist.take());
            metadata.album = overrides.album.clone().or(metadata.album.take());
            metadata.title = overrides.title.clone().or(metadata.title.take());
        }
        Ok(recording)
    })?;

    for (file, result) in files.iter().zip(results) {
        match result {
            Ok(registration) if registration.hash_count == 0 => {
                warn!("{}: no hashes produced, not registered", file.display())
            }
            Ok(registration) => println!(
                "Registered {} ({} hashes)",
                file.display(),
                registration.hash_count
            ),
            Err(Error::AlreadyRegistered(_)) => info!("Already registered: {}", file.display()),
            Err(err) => warn!("Failed to register {}: {}", file.display(), err),
        }
    }
    Ok(())
}
