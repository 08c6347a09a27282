use std::sync::Arc;

use crate::{
    configuration_fetcher::{ConfigFetcher, HttpConfigFetcher},
    flag_config::Config,
    sharder::{HmacSha256Sharder, Sharder},
    storage::{InMemoryStorage, Storage},
    Client, Context, Result,
};

/// Configuration for [`Client`].
pub struct ClientConfig {
    pub(crate) context: Context,
    pub(crate) configuration: Option<Config>,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) fetcher: Arc<dyn ConfigFetcher>,
    pub(crate) sharder: Arc<dyn Sharder + Send + Sync>,
}

impl ClientConfig {
    /// Create a default configuration for the given evaluation context.
    ///
    /// ```
    /// # use ffclient::{ClientConfig, Context};
    /// ClientConfig::new(Context::new().with_config_url("https://example.com/flags.json"));
    /// ```
    pub fn new(context: Context) -> Self {
        ClientConfig {
            context,
            configuration: None,
            storage: Arc::new(InMemoryStorage::new()),
            fetcher: Arc::new(HttpConfigFetcher::new()),
            sharder: Arc::new(HmacSha256Sharder),
        }
    }

    /// Use a static flag configuration. It is active right away and `config_url` becomes optional.
    pub fn configuration(mut self, configuration: Config) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Persist identities and cached configuration in `storage`. Defaults to [`InMemoryStorage`].
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    /// Override the transport used to fetch configuration. Defaults to [`HttpConfigFetcher`].
    pub fn fetcher(mut self, fetcher: impl ConfigFetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    /// Override how identifiers are bucketed. Clients should use the default in most cases.
    pub fn sharder(mut self, sharder: impl Sharder + Send + Sync + 'static) -> Self {
        self.sharder = Arc::new(sharder);
        self
    }

    /// Create a new [`Client`] using this configuration.
    ///
    /// Fails if neither `context.config_url` nor a static configuration was supplied, or if
    /// `config_url` is not a valid URL.
    ///
    /// ```
    /// # use ffclient::{ClientConfig, Context, Error};
    /// let result = ClientConfig::new(Context::new()).to_client();
    /// assert!(matches!(result, Err(Error::MissingConfigSource)));
    /// ```
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }
}
