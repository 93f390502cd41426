use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (defaults to config.toml, then config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the HTTP translation proxy (default)
    Serve {
        /// Listen address, overriding server.bind from the config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Translate one text and print the result
    Translate {
        /// Text to translate
        text: String,

        /// Segment marker to keep untranslated; sends the whole text as one unit
        #[arg(short, long)]
        separator: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
