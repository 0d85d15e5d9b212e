use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hebtts::models::{Speaker, VoiceParameters};

/// Hebrew text-to-speech client
///
/// Sends text to a RunPod serverless endpoint and saves the returned WAV.
/// The endpoint is read from RUNPOD_API_URL and RUNPOD_API_KEY unless given
/// on the command line.
#[derive(Parser, Debug)]
#[command(name = "hebtts")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Full `/run` URL of the endpoint
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// API key (prefer the RUNPOD_API_KEY environment variable)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesize one text
    Generate {
        /// Text to synthesize
        #[arg(short, long)]
        text: String,

        /// Output WAV file (defaults to hebtts_<timestamp>.wav)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        voice: VoiceArgs,
    },

    /// Synthesize every Hebrew `.txt` file found in the given paths
    Batch {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Where the WAV files go
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        voice: VoiceArgs,
    },

    /// Show worker and queue counters of the endpoint
    Health,
}

#[derive(clap::Args, Debug, Clone)]
pub struct VoiceArgs {
    /// Speaker voice (osim, geek, shaul)
    #[arg(short, long, default_value = "osim")]
    pub speaker: Speaker,

    /// Top-k sampling, 1 to 50
    #[arg(long, default_value_t = 50)]
    pub top_k: u32,

    /// Sampling temperature, 0.1 to 2.0
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f32,

    /// Disable multi-band diffusion
    #[arg(long)]
    pub no_mbd: bool,
}

impl From<VoiceArgs> for VoiceParameters {
    fn from(args: VoiceArgs) -> Self {
        Self {
            speaker: args.speaker,
            top_k: args.top_k,
            temperature: args.temperature,
            use_mbd: !args.no_mbd,
        }
    }
}
