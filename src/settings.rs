use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::matcher::{MatchPolicy, Matcher};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MatchingSettings {
    #[serde(default)]
    pub policy: MatchPolicy,

    /// Base currencies whose exchanges are matched against users.
    #[serde(default = "default_peer_exchange_currencies")]
    pub peer_exchange_currencies: Vec<String>,

    /// Tries per match call when a concurrent writer wins the race.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_peer_exchange_currencies() -> Vec<String> {
    vec!["USD".to_string()]
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            policy: MatchPolicy::default(),
            peer_exchange_currencies: default_peer_exchange_currencies(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl MatchingSettings {
    pub fn matcher(&self) -> Matcher {
        Matcher::new(self.policy, self.peer_exchange_currencies.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub matching: MatchingSettings,
}

impl Settings {
    /// Defaults, then `path` if given, then `PURSE_*` environment variables
    /// (`PURSE_MATCHING__POLICY=first_found`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("PURSE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("matching.peer_exchange_currencies"),
        );

        builder.build()?.try_deserialize()
    }
}
