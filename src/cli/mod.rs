//! CLI interface for sfzkit

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Envelope, curve and instrument tooling for a polyphonic sampler
#[derive(Parser)]
#[command(name = "sfzkit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a configuration and the files it references
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "sfzkit.yaml")]
        config: PathBuf,
    },

    /// Print the curves of an instrument
    Curves {
        /// Instrument definition path
        #[arg(short, long)]
        instrument: PathBuf,

        /// Points to print per curve
        #[arg(short, long, default_value = "9")]
        points: usize,
    },

    /// Render the amplitude envelope of one note to a WAV file
    Render {
        /// Configuration file path
        #[arg(short, long, default_value = "sfzkit.yaml")]
        config: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Duration in seconds
        #[arg(short, long, default_value = "3.0")]
        duration: f32,

        /// MIDI note number
        #[arg(short, long, default_value = "60")]
        note: u8,

        /// MIDI velocity
        #[arg(short, long, default_value = "100")]
        velocity: u8,

        /// Seconds before the note is released
        #[arg(long, default_value = "1.0")]
        hold: f32,
    },

    /// Run the engine with a live worker and reload files as they change
    Watch {
        /// Configuration file path
        #[arg(short, long, default_value = "sfzkit.yaml")]
        config: PathBuf,

        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(short, long)]
        duration: Option<f32>,
    },

    /// Generate an example configuration and instrument
    Init,
}
