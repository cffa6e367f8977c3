use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_LOG_FILTER: &str = "rosterd=info";

/// Startup settings for the sidecar.
///
/// A `.env` file is loaded before parsing, so both variables may live there.
#[derive(Clone, Debug, Parser)]
#[command(name = "rosterd", version, about = "Roster database sidecar (JSON lines on stdio)")]
pub struct Config {
    /// Workspace directory to open at startup.
    #[arg(long, env = "ROSTERD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// tracing filter directive; logs go to stderr.
    #[arg(long = "log", env = "RUST_LOG", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
}

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Config::parse()
    }
}
