use std::sync::Arc;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the feature flag client.
///
/// Only construction errors and [`Error::NoConfiguration`] from
/// [`Client::query_all_feature_flags`](crate::Client::query_all_feature_flags) are ever returned
/// to the caller directly. Everything else is logged and attached to the degraded outcome
/// ([`RefreshOutcome::Failed`](crate::RefreshOutcome::Failed) or
/// [`FeatureFlagResult::error`](crate::FeatureFlagResult::error)).
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Neither `config_url` nor a static configuration was supplied.
    #[error("either context.config_url or a static configuration must be provided")]
    MissingConfigSource,

    /// `config_url` could not be parsed.
    #[error("invalid config_url")]
    InvalidConfigUrl(#[source] url::ParseError),

    /// Network error while fetching configuration.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// Server answered with a status that is neither success nor "not modified".
    #[error("unexpected response status while fetching configuration: {0}")]
    UnexpectedStatus(u16),

    /// Configuration (fetched or cached) could not be parsed.
    #[error("error parsing configuration")]
    ConfigurationParseError(#[source] Arc<serde_json::Error>),

    /// Storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// No configuration is available yet.
    #[error("no configuration available")]
    NoConfiguration,

    /// Configuration is loaded but declares no flags.
    #[error("configuration has no flags")]
    NoFlags,

    /// Requested flag is not present in the configuration.
    #[error("flag not found")]
    FlagNotFound,

    /// Flag is present in the configuration but its definition could not be parsed.
    #[error("flag definition could not be parsed")]
    InvalidFlag,

    /// The identifier selected by the stickiness property is not available.
    #[error("no identifier available for bucketing")]
    MissingIdentifier,

    /// `rolloutValue` is not an integer.
    #[error("invalid rollout value: {0:?}")]
    InvalidRolloutValue(String),
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::ConfigurationParseError(Arc::new(value))
    }
}
