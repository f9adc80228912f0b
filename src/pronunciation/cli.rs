use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::pronunciation::alignment::AlignmentMode;

#[derive(Parser, Debug)]
#[command(
    name = "pronalyzer",
    version,
    about = "Compare a learner's pronunciation against a native reference recording"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score a learner recording against a reference and print the result as JSON.
    Compare(CompareArgs),
    /// Print the feature tracks of a single recording as JSON.
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// JSON file with analysis settings; defaults are used when omitted.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Native-speaker reference recording.
    #[arg(long)]
    pub reference: PathBuf,
    /// Learner's attempt.
    #[arg(long)]
    pub learner: PathBuf,
    /// Overrides the alignment mode from the config file.
    #[arg(long, value_enum)]
    pub alignment: Option<AlignmentArg>,
    /// Include both recordings' feature tracks in the output.
    #[arg(long = "include-tracks")]
    pub include_tracks: bool,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Recording to analyse.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
    /// Include the full spectrogram matrix.
    #[arg(long)]
    pub spectrogram: bool,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentArg {
    Dtw,
    Point,
}

impl From<AlignmentArg> for AlignmentMode {
    fn from(arg: AlignmentArg) -> Self {
        match arg {
            AlignmentArg::Dtw => AlignmentMode::Dtw,
            AlignmentArg::Point => AlignmentMode::PointByPoint,
        }
    }
}
