//! Command-line front end for mouthpiece.
//!
//! Tracing goes to stderr so stdout only ever carries JSON.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mouthpiece::{
    FsKeyframeStore, MouthpieceConfig, PhonemeSource, PhonemizerMode, TalkRequest,
    TimelineSynthesizer, VisemeService,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Phoneme-driven lip-sync keyframes for 3D avatars.
#[derive(Parser)]
#[command(name = "mouthpiece", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a keyframe timeline from phonemizer output already on disk.
    Synthesize {
        /// Phonemizer output file, or `-` for stdin.
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Target duration in seconds.
        #[arg(short, long)]
        duration: f64,

        /// Treat the input as a JSON array of phoneme symbols.
        #[arg(long)]
        symbols: bool,

        /// Write the timeline here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Phonemize text and store its timeline, printing the response JSON.
    Talk {
        /// Text to speak.
        #[arg(short, long)]
        text: String,

        /// Target duration in seconds.
        #[arg(short, long)]
        duration: f64,

        /// Phonemizer to use (`espeak` or `script`).
        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<PhonemizerMode>,
    },

    /// Delete stored timelines older than the configured age.
    Prune {
        /// Override `store.max_age_secs`.
        #[arg(long)]
        max_age_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mouthpiece=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Synthesize {
            input,
            duration,
            symbols,
            output,
        } => run_synthesize(&config, &input, duration, symbols, output.as_deref()),
        Command::Talk {
            text,
            duration,
            mode,
        } => run_talk(&config, text, duration, mode).await,
        Command::Prune { max_age_secs } => run_prune(&config, max_age_secs),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MouthpieceConfig> {
    let config = match path {
        Some(path) => MouthpieceConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let default_path = MouthpieceConfig::default_config_path();
            if default_path.is_file() {
                MouthpieceConfig::from_file(&default_path)
                    .with_context(|| format!("loading {}", default_path.display()))?
            } else {
                MouthpieceConfig::default()
            }
        }
    };
    config.validate()?;
    Ok(config)
}

fn parse_mode(value: &str) -> Result<PhonemizerMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "espeak" => Ok(PhonemizerMode::Espeak),
        "script" | "python" => Ok(PhonemizerMode::Script),
        other => Err(format!("unknown phonemizer mode `{other}`")),
    }
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(input).with_context(|| format!("reading {input}"))
}

fn run_synthesize(
    config: &MouthpieceConfig,
    input: &str,
    duration: f64,
    symbols: bool,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let raw = read_input(input)?;
    let source = if symbols {
        let list: Vec<String> =
            serde_json::from_str(&raw).context("--symbols input must be a JSON array of strings")?;
        PhonemeSource::Symbols(list)
    } else {
        PhonemeSource::Text(raw)
    };

    let synthesizer = TimelineSynthesizer::new(config.timeline.clone())?;
    let Some(timeline) = synthesizer.synthesize(&source.parse(), duration)? else {
        info!("no phonemes in input, nothing to write");
        return Ok(());
    };

    let json = serde_json::to_string_pretty(&timeline)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("wrote {} keyframes to {}", timeline.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn run_talk(
    config: &MouthpieceConfig,
    text: String,
    duration: f64,
    mode: Option<PhonemizerMode>,
) -> anyhow::Result<()> {
    let service = VisemeService::from_config(config)?;
    let response = service
        .generate(&TalkRequest {
            text,
            duration,
            mode,
        })
        .await?;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

fn run_prune(config: &MouthpieceConfig, max_age_secs: Option<u64>) -> anyhow::Result<()> {
    let store = FsKeyframeStore::from_config(&config.store)?;
    let max_age = Duration::from_secs(max_age_secs.unwrap_or(config.store.max_age_secs));
    let removed = store.prune_older_than(max_age)?;
    println!("{removed}");
    Ok(())
}
