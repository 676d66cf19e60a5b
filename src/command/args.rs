use clap::{Parser, Subcommand};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArgsError {
    #[error("unbalanced quotes")]
    UnbalancedQuotes,
    #[error("{0}")]
    Usage(#[from] clap::Error),
}

/// Everything after the `/voice` prefix.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(
    name = "/voice",
    no_binary_name = true,
    disable_help_subcommand = true,
    disable_version_flag = true
)]
pub struct VoiceArgs {
    #[command(subcommand)]
    pub action: Option<VoiceAction>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum VoiceAction {
    /// List the available actions
    Help,
    /// Record audio from the input device
    Record {
        /// Audio format
        #[arg(long)]
        format: Option<String>,
        /// Stop recording after this many milliseconds
        #[arg(long, value_name = "MS")]
        timeout: Option<u64>,
    },
    /// Transcribe an audio file
    Transcribe {
        file: Option<String>,
        /// Model to use
        #[arg(long)]
        model: Option<String>,
        /// Language code
        #[arg(long)]
        language: Option<String>,
    },
    /// Convert text to speech
    Speak {
        text: Vec<String>,
        /// Model to use
        #[arg(long)]
        model: Option<String>,
        /// Voice ID
        #[arg(long)]
        voice: Option<String>,
        /// Speech speed
        #[arg(long)]
        speed: Option<f32>,
        /// Audio format
        #[arg(long)]
        format: Option<String>,
    },
    /// Play an audio file
    Playback {
        file: Option<String>,
        /// Stop playback after this many milliseconds
        #[arg(long, value_name = "MS")]
        duration: Option<u64>,
    },
    /// Show or set the active provider
    Provider { name: Option<String> },
    #[command(external_subcommand)]
    Unknown(Vec<String>),
}

impl VoiceArgs {
    /// Split `line` the way a shell would, then parse the words.
    pub fn parse_line(line: &str) -> Result<Self, ArgsError> {
        let words = shlex::split(line).ok_or(ArgsError::UnbalancedQuotes)?;
        Ok(Self::try_parse_from(words)?)
    }
}
