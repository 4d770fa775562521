use std::env::var;
use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_CONFIG_PATH: &str = "./dat/config.json";
pub const DEFAULT_DATA_DIR: &str = "./dat/storage";
pub const DEBUG_ENV: &str = "LSB_DEBUG";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concat!(
    "Environment variables:\n",
    "  LSB_CONFIG      Configuration file\n",
    "  LSB_DATA_DIR    Directory for persisted peer state\n",
    "  LSB_DEBUG       Set to \"true\" for debug logging\n\n",
    "Examples:",
    "\n  # Run with the default configuration\n  $ livesync-bridge\n",
    "\n  # Wipe persisted peer state before starting\n  $ livesync-bridge --reset\n",
))]
pub struct Cli {
    /// Wipe persisted peer state before starting
    #[arg(long)]
    pub reset: bool,

    /// Configuration file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    #[arg(env = "LSB_CONFIG")]
    pub config: PathBuf,

    /// Directory for persisted peer state
    #[arg(long, value_name = "PATH", default_value = DEFAULT_DATA_DIR)]
    #[arg(env = "LSB_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Enable debug logging (also enabled by LSB_DEBUG=true)
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Whether debug logging was requested on the command line or through
    /// the environment.
    pub fn debug_enabled(&self) -> bool {
        self.debug || env_flag(DEBUG_ENV)
    }
}

/// `true` only when the variable is set to `true`, ignoring case.
pub fn env_flag(name: &str) -> bool {
    var(name).map_or(false, |value| is_true(&value))
}

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
