use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Mimic, a streaming chat and voice client for persona backends.
#[derive(Parser, Debug)]
#[command(name = "mimic", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level override (debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive chat with a persona. Replies stream token by token.
    Chat {
        /// Persona to talk to.
        persona: String,

        /// Resume an existing conversation thread.
        #[arg(long)]
        thread: Option<String>,

        /// Speak each reply aloud (requires the `playback` build).
        #[arg(long)]
        speak: bool,
    },

    /// Synthesize one utterance in the persona's voice.
    Speak {
        /// Persona whose voice to use.
        persona: String,

        /// Text to speak.
        text: String,

        /// Write the audio to a file instead of playing it.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a document to a persona's knowledge base.
    Upload {
        /// Persona to attach the document to.
        persona: String,

        /// File to upload.
        file: PathBuf,

        /// Return after the upload without waiting for ingestion.
        #[arg(long)]
        no_wait: bool,
    },

    /// Print the effective configuration as JSON.
    Config,
}

pub fn parse() -> Args {
    Args::parse()
}
