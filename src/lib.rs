//! A feature flag client with percentage-based rollouts and per-user targeting rules.
//!
//! # Overview
//!
//! The crate revolves around a [`Client`] that answers whether a feature is enabled for the user
//! described by a [`Context`]. Flag definitions ([`Config`]) are fetched from a remote URL,
//! cached in a pluggable [`Storage`], and revalidated with an ETag once the refresh interval
//! (24 hours by default) elapses.
//!
//! Each flag carries a list of [`TargetingConfig`] candidates. The first candidate (by priority)
//! whose criteria all match the context decides the rollout percentage. The user is then hashed
//! into one of 100 buckets using the flag id as salt, and the flag is enabled if the bucket falls
//! below the rollout percentage. Flags with no matching candidate are disabled.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Evaluating a single flag never fails: a disabled [`FeatureFlagResult`] is returned instead,
//! with [`FeatureFlagResult::error`] describing what went wrong. Configuration loading failures
//! are reported through [`RefreshOutcome`] and the previously loaded configuration stays active.
//! Only client construction and [`Client::query_all_feature_flags`] return errors directly.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages, under
//! the `ffclient` target. Consider integrating a `log`-compatible logger implementation for
//! better visibility into client operations.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example() -> ffclient::Result<()> {
//! use ffclient::{ClientConfig, Context};
//!
//! let context = Context::new()
//!     .with_user_id("123")
//!     .with_config_url("https://example.com/flags.json")
//!     .with_attribute("Platform", vec!["iOS"]);
//! let client = ClientConfig::new(context).to_client()?;
//!
//! if client.query_feature_flag("feature-A").await.enabled {
//!     // ...
//! }
//! # Ok(())
//! # }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

mod client;
mod config;
mod configuration_fetcher;
mod configuration_store;
mod context;
mod error;
mod flag_config;
mod identity;
mod sharder;
mod storage;
mod targeting;

pub use client::{Client, FeatureFlagResult, UserIdType};
pub use config::ClientConfig;
pub use configuration_fetcher::{ConfigFetcher, FetchResponse, HttpConfigFetcher};
pub use configuration_store::{is_stale, RefreshOutcome, DEFAULT_CONFIG_REFRESH_INTERVAL};
pub use context::{Context, ContextAttributes, ContextValue};
pub use error::{Error, Result};
pub use flag_config::{
    Config, Flag, TargetCriterion, TargetingConfig, TryParse, FF_USER_ID_STICKINESS,
};
pub use sharder::{HmacSha256Sharder, Sharder, TOTAL_BUCKETS};
pub use storage::{keys, InMemoryStorage, NoopStorage, Storage};
pub use targeting::resolve;
