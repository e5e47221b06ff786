//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top level configuration of the `protosniff` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig
{
    /// `env_logger` filter used when `RUST_LOG` isn't set.
    pub log_filter: String,

    /// Decoder behaviour.
    pub matcher: MatcherConfig,
}

/// Settings for [`AutoMatcher`](crate::matcher::AutoMatcher).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig
{
    /// Score every known message type when no mapping applies.
    ///
    /// When disabled, traffic without a mapping is reported as unmatched.
    pub auto_match: bool,

    /// Remember the winning type per endpoint and direction.
    pub cache_auto_matches: bool,

    /// Render decoded messages as indented JSON.
    pub pretty: bool,
}

impl Default for AppConfig
{
    fn default() -> Self
    {
        Self {
            log_filter: "info".to_string(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl Default for MatcherConfig
{
    fn default() -> Self
    {
        Self {
            auto_match: true,
            cache_auto_matches: true,
            pretty: true,
        }
    }
}

impl AppConfig
{
    /// Load configuration from defaults, an optional config file and the environment.
    ///
    /// The file may be any format the `config` crate recognizes by extension. Environment
    /// variables use the `PROTOSNIFF_` prefix with `__` between nested keys, for example
    /// `PROTOSNIFF_MATCHER__PRETTY=false`.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError>
    {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PROTOSNIFF")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
