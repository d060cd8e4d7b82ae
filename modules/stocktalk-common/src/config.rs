use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::info;

use crate::error::ConfigError;

pub const DEFAULT_HASHTAGS: &[&str] = &["#nifty50", "#sensex", "#intraday", "#banknifty"];

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Query
    pub hashtags: Vec<String>,
    pub window_hours: u32,

    // Harvest loop
    pub target_count: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub backoff_base: u32,

    // Storage
    pub output_dir: PathBuf,

    // Live source
    pub apify_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hashtags: DEFAULT_HASHTAGS.iter().map(|h| h.to_string()).collect(),
            window_hours: 24,
            target_count: 2000,
            batch_size: 500,
            max_retries: 5,
            backoff_base: 2,
            output_dir: PathBuf::from("outputs"),
            apify_api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. `from_env` is this
    /// over the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let hashtags = match lookup("STOCKTALK_HASHTAGS") {
            Some(raw) => {
                let tags: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                if tags.is_empty() {
                    return Err(ConfigError::Invalid {
                        key: "STOCKTALK_HASHTAGS",
                        value: raw,
                        reason: "at least one hashtag is required".to_string(),
                    });
                }
                tags
            }
            None => defaults.hashtags,
        };

        Ok(Self {
            hashtags,
            window_hours: parsed(&lookup, "STOCKTALK_WINDOW_HOURS", defaults.window_hours)?,
            target_count: parsed(&lookup, "STOCKTALK_TARGET_COUNT", defaults.target_count)?,
            batch_size: parsed(&lookup, "STOCKTALK_BATCH_SIZE", defaults.batch_size)?,
            max_retries: parsed(&lookup, "STOCKTALK_MAX_RETRIES", defaults.max_retries)?,
            backoff_base: parsed(&lookup, "STOCKTALK_BACKOFF_BASE", defaults.backoff_base)?,
            output_dir: lookup("STOCKTALK_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            apify_api_key: lookup("APIFY_API_KEY").filter(|k| !k.is_empty()),
        })
    }

    /// The Apify token, or an error naming the variable to set.
    pub fn require_apify_api_key(&self) -> Result<&str, ConfigError> {
        self.apify_api_key
            .as_deref()
            .ok_or(ConfigError::Missing { key: "APIFY_API_KEY" })
    }

    /// Log the effective configuration without secrets.
    pub fn log_redacted(&self) {
        info!(
            hashtags = ?self.hashtags,
            window_hours = self.window_hours,
            target_count = self.target_count,
            batch_size = self.batch_size,
            max_retries = self.max_retries,
            backoff_base = self.backoff_base,
            output_dir = %self.output_dir.display(),
            apify_api_key = if self.apify_api_key.is_some() { "[set]" } else { "[unset]" },
            "Loaded config"
        );
    }
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.hashtags.len(), 4);
        assert_eq!(config.target_count, 2000);
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff_base, 2);
        assert_eq!(config.window_hours, 24);
        assert_eq!(config.output_dir, PathBuf::from("outputs"));
        assert!(config.apify_api_key.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("STOCKTALK_HASHTAGS", "#sensex, #nifty50 ,"),
            ("STOCKTALK_TARGET_COUNT", "10"),
            ("STOCKTALK_BATCH_SIZE", " 3 "),
            ("STOCKTALK_OUTPUT_DIR", "/tmp/harvest"),
            ("APIFY_API_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.hashtags, vec!["#sensex", "#nifty50"]);
        assert_eq!(config.target_count, 10);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/harvest"));
        assert_eq!(config.require_apify_api_key().unwrap(), "secret");
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("STOCKTALK_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "STOCKTALK_BATCH_SIZE", .. }
        ));
    }

    #[test]
    fn blank_hashtag_list_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("STOCKTALK_HASHTAGS", " , ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "STOCKTALK_HASHTAGS", .. }));
    }

    #[test]
    fn empty_api_key_counts_as_unset() {
        let config = Config::from_lookup(lookup_from(&[("APIFY_API_KEY", "")])).unwrap();
        assert!(matches!(
            config.require_apify_api_key(),
            Err(ConfigError::Missing { key: "APIFY_API_KEY" })
        ));
    }
}
