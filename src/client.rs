use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use crate::{
    configuration_store::{
        ConfigurationStore, ConfigurationStoreConfig, RefreshOutcome,
        DEFAULT_CONFIG_REFRESH_INTERVAL,
    },
    flag_config::{Config, Flag, TargetingConfig, TryParse},
    identity::Identity,
    sharder::Sharder,
    targeting, ClientConfig, Context, Error, Result,
};

/// A feature flag client.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Examples
/// ```
/// # use ffclient::{ClientConfig, Context};
/// let context = Context::new()
///     .with_user_id("123")
///     .with_config_url("https://example.com/flags.json");
/// let client = ClientConfig::new(context).to_client().unwrap();
/// ```
pub struct Client {
    context: RwLock<Context>,
    configuration_store: ConfigurationStore,
    identity: Identity,
    sharder: Arc<dyn Sharder + Send + Sync>,
}

/// Which identifier was hashed to evaluate a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserIdType {
    /// The application user id from the context.
    AppUserId,
    /// The anonymous feature-flag user id generated by the client.
    FfUserId,
}

/// Result of a flag query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagResult {
    pub feature_name: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub user_id_type: UserIdType,
    /// Why the flag was evaluated as disabled, if evaluation failed.
    #[serde(skip)]
    pub error: Option<Error>,
}

impl FeatureFlagResult {
    fn disabled(feature_name: &str, user_id: Option<String>, user_id_type: UserIdType) -> Self {
        FeatureFlagResult {
            feature_name: feature_name.to_owned(),
            enabled: false,
            user_id,
            user_id_type,
            error: None,
        }
    }

    fn failed(mut self, error: Error) -> Self {
        log::warn!(target: "ffclient",
                   flag_name:display = self.feature_name,
                   user_id:? = self.user_id;
                   "error occurred while evaluating a flag: {}", error);
        self.enabled = false;
        self.error = Some(error);
        self
    }
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    ///
    /// No I/O happens here. Configuration and identities are loaded on [`Client::initialize`] or
    /// on the first query.
    pub fn new(config: ClientConfig) -> Result<Self> {
        match &config.context.config_url {
            Some(url) => {
                url::Url::parse(url).map_err(Error::InvalidConfigUrl)?;
            }
            None if config.configuration.is_none() => return Err(Error::MissingConfigSource),
            None => {}
        }

        let configuration_store = ConfigurationStore::new(ConfigurationStoreConfig {
            storage: config.storage.clone(),
            fetcher: config.fetcher,
            config_url: config.context.config_url.clone(),
            refresh_interval: config
                .context
                .config_refresh_interval
                .unwrap_or(DEFAULT_CONFIG_REFRESH_INTERVAL),
            initial_configuration: config.configuration,
        });

        Ok(Client {
            context: RwLock::new(config.context),
            configuration_store,
            identity: Identity::new(config.storage),
            sharder: config.sharder,
        })
    }

    fn read_context(&self) -> RwLockReadGuard<'_, Context> {
        self.context
            .read()
            .expect("thread holding context lock should not panic")
    }

    /// Snapshot of the evaluation context, including the resolved user id.
    pub fn context(&self) -> Context {
        self.read_context().clone()
    }

    /// Currently active flag configuration, if any has been loaded.
    pub fn configuration(&self) -> Option<Arc<Config>> {
        self.configuration_store.get_configuration()
    }

    /// Return `true` if more than `interval_ms` milliseconds passed since configuration was last
    /// fetched (or since the client was created, if it never was).
    pub fn check_config_cache_expiry(&self, interval_ms: u64) -> bool {
        self.configuration_store.check_expiry(interval_ms)
    }

    /// Make sure configuration is loaded and fresh, and resolve user identities.
    ///
    /// Safe to call repeatedly: configuration freshness is checked on every call, identities are
    /// only resolved once. Failures are logged and reflected in the returned outcome.
    pub async fn initialize(&self) -> RefreshOutcome {
        let outcome = self.configuration_store.ensure_fresh().await;

        let context_user_id = self.read_context().user_id.clone();
        let user_id = self.identity.bootstrap(context_user_id.as_deref()).await;
        if user_id.is_some() && user_id != context_user_id {
            self.context
                .write()
                .expect("thread holding context lock should not panic")
                .user_id = user_id;
        }

        outcome
    }

    /// Evaluate a single flag.
    ///
    /// Never fails: if the flag cannot be evaluated, the result is disabled and
    /// [`FeatureFlagResult::error`] describes why.
    pub async fn query_feature_flag(&self, flag_name: &str) -> FeatureFlagResult {
        self.initialize().await;

        let configuration = self.configuration_store.get_configuration();
        let flag = match configuration.as_deref() {
            None => Err(Error::NoConfiguration),
            Some(configuration) => match configuration.find_flag(flag_name) {
                Some(TryParse::Parsed(flag)) => Ok(flag),
                Some(TryParse::ParseFailed(_)) => Err(Error::InvalidFlag),
                None if configuration.parsed_flags().next().is_none() => Err(Error::NoFlags),
                None => Err(Error::FlagNotFound),
            },
        };

        match flag {
            Ok(flag) => self.eval_flag(flag).await,
            Err(err) => self.failed_result(flag_name, err),
        }
    }

    /// Evaluate every flag in the configuration concurrently.
    ///
    /// Returns one result per named flag, in no particular order. Fails with
    /// [`Error::NoConfiguration`] if no configuration could be loaded. Individual flags that
    /// fail to evaluate are reported as disabled results.
    pub async fn query_all_feature_flags(&self) -> Result<Vec<FeatureFlagResult>> {
        self.initialize().await;

        let configuration = self
            .configuration_store
            .get_configuration()
            .ok_or(Error::NoConfiguration)
            .inspect_err(|_| {
                log::warn!(target: "ffclient", "querying all flags before configuration has been loaded");
            })?;

        let results = futures::future::join_all(
            configuration
                .flags
                .iter()
                .map(|flag| self.eval_entry(flag)),
        )
        .await;

        Ok(results.into_iter().flatten().collect())
    }

    /// Evaluate a flag entry of the batch. Entries that failed to parse are reported as disabled
    /// if their name can be recovered, and skipped otherwise.
    async fn eval_entry(&self, flag: &TryParse<Flag>) -> Option<FeatureFlagResult> {
        match flag {
            TryParse::Parsed(flag) => Some(self.eval_flag(flag).await),
            TryParse::ParseFailed(_) => {
                let flag_name = flag.flag_name()?;
                Some(self.failed_result(flag_name, Error::InvalidFlag))
            }
        }
    }

    fn failed_result(&self, flag_name: &str, err: Error) -> FeatureFlagResult {
        let user_id = self.read_context().user_id.clone();
        FeatureFlagResult::disabled(flag_name, user_id, UserIdType::AppUserId).failed(err)
    }

    async fn eval_flag(&self, flag: &Flag) -> FeatureFlagResult {
        let (targeting_config, app_user_id) = {
            let context = self.read_context();
            (
                targeting::resolve(&context, &flag.targeting_configs),
                context.user_id.clone(),
            )
        };

        let (user_id, user_id_type) = if targeting_config.uses_ff_user_id() {
            (Some(self.identity.ff_user_id().await), UserIdType::FfUserId)
        } else {
            (app_user_id, UserIdType::AppUserId)
        };

        let mut result = FeatureFlagResult::disabled(&flag.flag_name, user_id, user_id_type);
        match self.is_enabled(flag, &targeting_config, result.user_id.as_deref()) {
            Ok(enabled) => {
                result.enabled = enabled;
                log::trace!(target: "ffclient",
                            flag_name:display = flag.flag_name,
                            user_id:? = result.user_id,
                            rollout_value:display = targeting_config.rollout_value,
                            enabled;
                            "evaluated a flag");
                result
            }
            Err(err) => result.failed(err),
        }
    }

    fn is_enabled(
        &self,
        flag: &Flag,
        targeting: &TargetingConfig,
        identifier: Option<&str>,
    ) -> Result<bool> {
        let identifier = identifier.ok_or(Error::MissingIdentifier)?;
        let rollout: i64 = targeting
            .rollout_value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidRolloutValue(targeting.rollout_value.clone()))?;
        let bucket = self.sharder.bucket_index(identifier, &flag.flag_id);
        Ok(i64::from(bucket) < rollout)
    }
}
