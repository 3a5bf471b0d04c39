//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::validation::Role;

/// Queue-driven HLS transcode pipeline.
#[derive(Parser, Debug)]
#[command(name = "hls-pipeline", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file. Built-in defaults apply when omitted.
    #[arg(short, long, env = "CONFIG_PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the notification queue and launch a transcode task per upload.
    Dispatch,

    /// Transcode one uploaded object into HLS renditions and upload them.
    Transcode(TranscodeArgs),

    /// Validate the configuration file without starting.
    #[command(name = "config-validate")]
    ConfigValidate {
        /// Which process the configuration is checked for.
        #[arg(long, value_enum, default_value_t = RoleArg::All)]
        role: RoleArg,
    },

    /// Display the effective configuration.
    #[command(name = "config-show")]
    ConfigShow,
}

/// Arguments for the transcode subcommand.
#[derive(Args, Debug)]
pub struct TranscodeArgs {
    /// Bucket holding the source video.
    #[arg(long, env = "BUCKET_NAME")]
    pub bucket: String,

    /// Object key of the source video.
    #[arg(long, env = "KEY")]
    pub key: String,

    /// Destination bucket, overriding `worker.destination_bucket`.
    #[arg(long, env = "PROD_BUCKET_NAME")]
    pub destination_bucket: Option<String>,
}

/// Role selector for `config-validate`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleArg {
    Dispatcher,
    Worker,
    All,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Dispatcher => Role::Dispatcher,
            RoleArg::Worker => Role::Worker,
            RoleArg::All => Role::All,
        }
    }
}
