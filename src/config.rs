use std::path::PathBuf;

use clap::Args;

pub const DEFAULT_NEW_LIMIT: usize = 10;

/// Settings shared by the `drill` and `serve` commands.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Review-state file (created on first save)
    #[arg(long, global = true, default_value = "reviews.csv")]
    pub reviews: PathBuf,

    /// Per-user progress file (created on first save)
    #[arg(long, global = true, default_value = "progress.csv")]
    pub progress: PathBuf,

    /// Learner id used by `drill` and as the default for lookups
    #[arg(long, global = true, default_value = "default")]
    pub user: String,

    /// Max new cards offered when nothing is due
    #[arg(long, global = true, default_value_t = DEFAULT_NEW_LIMIT)]
    pub new_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reviews: PathBuf::from("reviews.csv"),
            progress: PathBuf::from("progress.csv"),
            user: "default".to_string(),
            new_limit: DEFAULT_NEW_LIMIT,
        }
    }
}
