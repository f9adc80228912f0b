use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use pronalyzer::audio::decoder::decode_audio;
use pronalyzer::config::load_config;
use pronalyzer::pronunciation::cli::{AnalyzeArgs, Cli, Command, CompareArgs};
use pronalyzer::pronunciation::{FeatureExtractor, PronunciationComparator};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Compare(args) => handle_compare(&args),
        Command::Analyze(args) => handle_analyze(&args),
    }
}

fn handle_compare(args: &CompareArgs) -> Result<()> {
    let mut config = load_config(args.output.config.as_deref())?;
    if let Some(alignment) = args.alignment {
        config.alignment = alignment.into();
    }
    let comparator = PronunciationComparator::new(config)?;
    let reference = decode_audio(&args.reference, "reference")?;
    let learner = decode_audio(&args.learner, "learner")?;
    let mut comparison = comparator
        .compare(&reference, &learner)
        .context("comparison failed")?;
    if args.include_tracks {
        comparison.reference.spectrogram = None;
        comparison.learner.spectrogram = None;
        print_json(&comparison, args.output.pretty)
    } else {
        print_json(&comparison.result, args.output.pretty)
    }
}

fn handle_analyze(args: &AnalyzeArgs) -> Result<()> {
    let config = load_config(args.output.config.as_deref())?;
    config.validate()?;
    let buffer = decode_audio(&args.file, "input")?;
    let mut tracks = FeatureExtractor::new(&config)
        .extract(&buffer)
        .context("feature extraction failed")?;
    if !args.spectrogram {
        tracks.spectrogram = None;
    }
    print_json(&tracks, args.output.pretty)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if pretty {
        serde_json::to_writer_pretty(&mut out, value)?;
    } else {
        serde_json::to_writer(&mut out, value)?;
    }
    writeln!(out).context("failed to write output")?;
    Ok(())
}
