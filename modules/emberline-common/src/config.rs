use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Elasticsearch endpoint shared by every universe.
    pub elasticsearch_url: String,

    /// Universes this process serves, comma-separated in the environment.
    pub universes: Vec<String>,

    // Worker tuning
    pub drain_batch_limit: usize,
    pub drain_idle_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            elasticsearch_url: required_env("ELASTICSEARCH_URL"),
            universes: required_env("EMBERLINE_UNIVERSES")
                .split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            drain_batch_limit: env::var("DRAIN_BATCH_LIMIT")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .expect("DRAIN_BATCH_LIMIT must be a number"),
            drain_idle_secs: env::var("DRAIN_IDLE_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .expect("DRAIN_IDLE_SECS must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
