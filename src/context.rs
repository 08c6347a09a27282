use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Attributes used to match targeting criteria, keyed by field name.
pub type ContextAttributes = HashMap<String, ContextValue>;

/// Value of a context attribute: either a single string or a list of strings.
///
/// ```
/// # use ffclient::ContextValue;
/// let single: ContextValue = "iOS".into();
/// let multiple: ContextValue = vec!["BrandA", "BrandB"].into();
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, From)]
#[serde(untagged)]
pub enum ContextValue {
    Single(String),
    Multiple(Vec<String>),
}

impl ContextValue {
    pub fn is_empty(&self) -> bool {
        match self {
            ContextValue::Single(s) => s.is_empty(),
            ContextValue::Multiple(v) => v.is_empty(),
        }
    }

    /// Return `true` if `value` equals the single value or is one of the listed values.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            ContextValue::Single(s) => s == value,
            ContextValue::Multiple(v) => v.iter().any(|s| s == value),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

impl From<Vec<&str>> for ContextValue {
    fn from(value: Vec<&str>) -> Self {
        Self::Multiple(value.into_iter().map(str::to_owned).collect())
    }
}

/// Evaluation context supplied by the caller.
///
/// ```
/// # use ffclient::Context;
/// let context = Context::new()
///     .with_user_id("123")
///     .with_config_url("https://example.com/flags.json")
///     .with_attribute("Platform", vec!["iOS"]);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub config_url: Option<String>,
    /// Overrides the config refresh interval, in milliseconds.
    #[serde(default)]
    pub config_refresh_interval: Option<u64>,
    #[serde(flatten)]
    pub attributes: ContextAttributes,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_config_url(mut self, config_url: impl Into<String>) -> Self {
        self.config_url = Some(config_url.into());
        self
    }

    pub fn with_config_refresh_interval(mut self, interval_ms: u64) -> Self {
        self.config_refresh_interval = Some(interval_ms);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up a targeting attribute, treating empty values as absent.
    pub fn attribute(&self, name: &str) -> Option<&ContextValue> {
        self.attributes.get(name).filter(|value| !value.is_empty())
    }
}
