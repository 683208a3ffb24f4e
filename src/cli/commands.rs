//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - watch: connect and print incoming detections
//! - replay: serve recorded detections as an inference peer
//! - check-host: validate an address

use clap::{Args, Parser, Subcommand};
use detlink::config::Config;
use detlink::net::Framing;
use std::path::PathBuf;

/// detlink - object-detection stream client
#[derive(Parser, Debug)]
#[command(name = "detlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute (defaults to watch)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the inference server and print detections
    Watch(WatchArgs),

    /// Serve a JSON Lines file of detections to connecting clients
    Replay {
        /// Replay script, one detection message per line
        file: PathBuf,

        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        listen: String,

        /// Delay between messages in milliseconds
        #[arg(short, long, default_value_t = 33)]
        interval_ms: u64,

        /// Framing to write
        #[arg(short, long, value_enum, default_value_t = Framing::Raw)]
        framing: Framing,

        /// Loop the script until the client disconnects
        #[arg(short, long)]
        repeat: bool,
    },

    /// Check whether an address is a valid host
    CheckHost {
        /// Address to validate
        host: String,
    },
}

/// Overrides for the watch command
#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Inference server host (IPv4)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Inference server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Message framing
    #[arg(short, long, value_enum)]
    pub framing: Option<Framing>,

    /// Canvas width for mapped boxes
    #[arg(long)]
    pub canvas_width: Option<f32>,

    /// Canvas height for mapped boxes
    #[arg(long)]
    pub canvas_height: Option<f32>,
}

impl WatchArgs {
    /// Apply command-line values on top of the loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if let Some(framing) = self.framing {
            config.stream.framing = framing;
        }
        if let Some(width) = self.canvas_width {
            config.canvas.width = width;
        }
        if let Some(height) = self.canvas_height {
            config.canvas.height = height;
        }
    }
}
