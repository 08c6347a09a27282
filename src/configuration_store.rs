//! Lifecycle of the active configuration: in-memory snapshot, persisted cache, and conditional
//! refresh from the remote source.
//!
//! [`ConfigurationStore`] holds the currently active [`Config`] as an immutable snapshot that is
//! replaced completely on refresh. Readers get an `Arc` and are not affected by later writes.
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};

use crate::{
    configuration_fetcher::{ConfigFetcher, IF_NONE_MATCH},
    flag_config::Config,
    storage::{keys, Storage},
    Error, Result,
};

/// Default config refresh interval: 24 hours, in milliseconds.
pub const DEFAULT_CONFIG_REFRESH_INTERVAL: u64 = 86_400_000;

/// Revalidation token presented when none has been stored yet.
pub const DEFAULT_ETAG: &str = "-1";

/// Return `true` if more than `interval_ms` milliseconds elapsed between `last_fetch` and `now`.
pub fn is_stale(last_fetch: DateTime<Utc>, now: DateTime<Utc>, interval_ms: u64) -> bool {
    let interval = i64::try_from(interval_ms)
        .ok()
        .and_then(chrono::Duration::try_milliseconds);
    match interval {
        Some(interval) => now.signed_duration_since(last_fetch) > interval,
        // Interval longer than anything chrono can represent.
        None => false,
    }
}

/// What [`ConfigurationStore::ensure_fresh`] did.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// Configuration is loaded and not stale. Nothing was done.
    Fresh,
    /// Configuration was restored from storage without a network call.
    LoadedFromStorage,
    /// A new configuration was fetched.
    Fetched,
    /// The server reported no changes. The existing configuration was kept.
    NotModified,
    /// Refresh failed. Whatever configuration was held before is still active.
    Failed(Error),
}

pub(crate) struct ConfigurationStoreConfig {
    pub storage: Arc<dyn Storage>,
    pub fetcher: Arc<dyn ConfigFetcher>,
    pub config_url: Option<String>,
    pub refresh_interval: u64,
    pub initial_configuration: Option<Config>,
}

pub struct ConfigurationStore {
    configuration: RwLock<Option<Arc<Config>>>,
    last_fetch: RwLock<DateTime<Utc>>,
    /// Serializes refreshes so that concurrent callers never issue overlapping fetches.
    refresh_lock: tokio::sync::Mutex<()>,
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn ConfigFetcher>,
    config_url: Option<String>,
    refresh_interval: u64,
}

impl ConfigurationStore {
    pub(crate) fn new(config: ConfigurationStoreConfig) -> Self {
        ConfigurationStore {
            configuration: RwLock::new(config.initial_configuration.map(Arc::new)),
            // Any non-zero time since construction counts as expired for a zero interval.
            last_fetch: RwLock::new(Utc::now()),
            refresh_lock: tokio::sync::Mutex::new(()),
            storage: config.storage,
            fetcher: config.fetcher,
            config_url: config.config_url,
            refresh_interval: config.refresh_interval,
        }
    }

    /// Get currently-active configuration. Returns None if configuration hasn't been loaded yet.
    pub fn get_configuration(&self) -> Option<Arc<Config>> {
        let configuration = self
            .configuration
            .read()
            .expect("thread holding configuration lock should not panic");
        configuration.clone()
    }

    fn set_configuration(&self, config: Config) {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Some(Arc::new(config));
        let mut configuration_slot = self
            .configuration
            .write()
            .expect("thread holding configuration lock should not panic");
        *configuration_slot = new_value;
    }

    pub fn last_fetch(&self) -> DateTime<Utc> {
        *self
            .last_fetch
            .read()
            .expect("thread holding last_fetch lock should not panic")
    }

    fn touch_last_fetch(&self, at: DateTime<Utc>) {
        *self
            .last_fetch
            .write()
            .expect("thread holding last_fetch lock should not panic") = at;
    }

    /// Check staleness of the cache against an arbitrary interval, in milliseconds.
    pub fn check_expiry(&self, interval_ms: u64) -> bool {
        is_stale(self.last_fetch(), Utc::now(), interval_ms)
    }

    pub fn is_stale(&self) -> bool {
        self.check_expiry(self.refresh_interval)
    }

    fn needs_refresh(&self) -> bool {
        self.get_configuration().is_none() || self.is_stale()
    }

    /// Make sure a configuration is loaded and not stale, loading it from storage or fetching it
    /// from the remote source if necessary.
    ///
    /// Issues at most one fetch. Never fails: errors are logged and reported as
    /// [`RefreshOutcome::Failed`], keeping the previous configuration active.
    pub async fn ensure_fresh(&self) -> RefreshOutcome {
        if !self.needs_refresh() {
            return RefreshOutcome::Fresh;
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller might have refreshed while we were waiting for the lock.
        if !self.needs_refresh() {
            return RefreshOutcome::Fresh;
        }

        match self.refresh().await {
            Ok(outcome) => outcome,
            Err(err) => {
                log::warn!(target: "ffclient", "failed to load configuration, keeping the current one: {}", err);
                RefreshOutcome::Failed(err)
            }
        }
    }

    async fn refresh(&self) -> Result<RefreshOutcome> {
        let mut cached_configuration = self.read_cached_configuration().await;

        if !self.is_stale() {
            if let Some(config) = cached_configuration.take() {
                log::debug!(target: "ffclient", "using configuration from storage");
                self.set_configuration(config);
                return Ok(RefreshOutcome::LoadedFromStorage);
            }
        }

        let url = self.config_url.as_deref().ok_or(Error::MissingConfigSource)?;

        let etag = self
            .storage
            .get(keys::CONFIG_ETAG)
            .await
            .unwrap_or_else(|err| {
                log::warn!(target: "ffclient", "failed to read config etag from storage: {}", err);
                None
            })
            .unwrap_or_else(|| DEFAULT_ETAG.to_owned());
        let headers = HashMap::from([(IF_NONE_MATCH.to_owned(), etag)]);

        let response = self.fetcher.fetch(url, &headers).await?;
        self.touch_last_fetch(Utc::now());

        let outcome = match response.data {
            Some(config) => {
                config.log_unparsed_flags();
                self.set_configuration(config);
                RefreshOutcome::Fetched
            }
            None => {
                if self.get_configuration().is_none() {
                    if let Some(config) = cached_configuration.take() {
                        self.set_configuration(config);
                    }
                }
                RefreshOutcome::NotModified
            }
        };

        if let Some(etag) = &response.etag {
            self.persist(keys::CONFIG_ETAG, etag).await;
        }
        if let Some(config) = self.get_configuration() {
            match serde_json::to_string(&*config) {
                Ok(blob) => self.persist(keys::CONFIG, &blob).await,
                Err(err) => {
                    log::warn!(target: "ffclient", "failed to serialize configuration: {}", err)
                }
            }
        }

        Ok(outcome)
    }

    /// Read and parse the configuration blob from storage. Any failure is treated as a cache miss.
    async fn read_cached_configuration(&self) -> Option<Config> {
        let blob = match self.storage.get(keys::CONFIG).await {
            Ok(blob) => blob?,
            Err(err) => {
                log::warn!(target: "ffclient", "failed to read cached configuration: {}", err);
                return None;
            }
        };
        match serde_json::from_str::<Config>(&blob) {
            Ok(config) => {
                config.log_unparsed_flags();
                Some(config)
            }
            Err(err) => {
                log::warn!(target: "ffclient", "failed to parse cached configuration: {}", err);
                None
            }
        }
    }

    async fn persist(&self, key: &str, value: &str) {
        if let Err(err) = self.storage.set(key, value).await {
            log::warn!(target: "ffclient", key; "failed to persist value: {}", err);
        }
    }

    #[cfg(test)]
    pub(crate) fn set_last_fetch(&self, at: DateTime<Utc>) {
        self.touch_last_fetch(at);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::{
        is_stale, ConfigurationStore, ConfigurationStoreConfig, RefreshOutcome,
        DEFAULT_CONFIG_REFRESH_INTERVAL,
    };
    use crate::{
        configuration_fetcher::{FetchResponse, StaticFetcher, IF_NONE_MATCH},
        flag_config::{Config, Flag},
        storage::{keys, InMemoryStorage, Storage},
        Error,
    };

    fn test_config(flag_name: &str) -> Config {
        Config::new(vec![Flag {
            flag_name: flag_name.to_owned(),
            flag_id: format!("{flag_name}-id"),
            flag_type: "release".to_owned(),
            targeting_configs: vec![],
        }])
    }

    fn store(
        storage: Arc<InMemoryStorage>,
        fetcher: Arc<StaticFetcher>,
        config_url: Option<&str>,
        initial_configuration: Option<Config>,
    ) -> ConfigurationStore {
        ConfigurationStore::new(ConfigurationStoreConfig {
            storage,
            fetcher,
            config_url: config_url.map(str::to_owned),
            refresh_interval: DEFAULT_CONFIG_REFRESH_INTERVAL,
            initial_configuration,
        })
    }

    fn fetched(flag_name: &str, etag: Option<&str>) -> FetchResponse {
        FetchResponse {
            data: Some(test_config(flag_name)),
            etag: etag.map(str::to_owned),
        }
    }

    fn has_flag(store: &ConfigurationStore, flag_name: &str) -> bool {
        store
            .get_configuration()
            .is_some_and(|config| config.get_flag(flag_name).is_some())
    }

    #[test]
    fn staleness_boundary() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(!is_stale(t, t + Duration::milliseconds(1000), 1000));
        assert!(is_stale(t, t + Duration::milliseconds(1001), 1000));
        assert!(!is_stale(t, t + Duration::milliseconds(999), 1000));
        assert!(!is_stale(t, t, 0));
        assert!(is_stale(t, t + Duration::milliseconds(1), 0));
        assert!(!is_stale(t, t + Duration::days(3650), u64::MAX));
    }

    #[tokio::test]
    async fn fetches_and_persists_when_empty() {
        let storage = Arc::new(InMemoryStorage::new());
        let fetcher = Arc::new(StaticFetcher::new(Ok(fetched("a", Some("etag-1")))));
        let store = store(storage.clone(), fetcher.clone(), Some("https://example.com/c"), None);

        assert!(matches!(store.ensure_fresh().await, RefreshOutcome::Fetched));
        assert!(has_flag(&store, "a"));

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "https://example.com/c");
        assert_eq!(requests[0].1.get(IF_NONE_MATCH).map(String::as_str), Some("-1"));

        assert_eq!(
            storage.get(keys::CONFIG_ETAG).await.unwrap().as_deref(),
            Some("etag-1")
        );
        let cached: Config =
            serde_json::from_str(&storage.get(keys::CONFIG).await.unwrap().unwrap()).unwrap();
        assert!(cached.get_flag("a").is_some());

        // Fresh now: no second request.
        assert!(matches!(store.ensure_fresh().await, RefreshOutcome::Fresh));
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn loads_from_storage_without_fetching() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .set(keys::CONFIG, &serde_json::to_string(&test_config("cached")).unwrap())
            .await
            .unwrap();
        let fetcher = Arc::new(StaticFetcher::new(Ok(fetched("remote", None))));
        let store = store(storage, fetcher.clone(), Some("https://example.com/c"), None);

        assert!(matches!(
            store.ensure_fresh().await,
            RefreshOutcome::LoadedFromStorage
        ));
        assert!(has_flag(&store, "cached"));
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn unparseable_cache_falls_back_to_fetch() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.set(keys::CONFIG, "not json").await.unwrap();
        let fetcher = Arc::new(StaticFetcher::new(Ok(fetched("remote", None))));
        let store = store(storage, fetcher.clone(), Some("https://example.com/c"), None);

        assert!(matches!(store.ensure_fresh().await, RefreshOutcome::Fetched));
        assert!(has_flag(&store, "remote"));
    }

    #[tokio::test]
    async fn stale_cache_revalidates_with_stored_etag() {
        let storage = Arc::new(InMemoryStorage::new());
        let fetcher = Arc::new(StaticFetcher::new(Ok(fetched("a", Some("etag-1")))));
        let store = store(storage, fetcher.clone(), Some("https://example.com/c"), None);
        store.ensure_fresh().await;

        store.set_last_fetch(Utc::now() - Duration::days(2));
        assert!(store.is_stale());

        fetcher.set_response(Ok(FetchResponse {
            data: None,
            etag: Some("etag-1".to_owned()),
        }));
        assert!(matches!(
            store.ensure_fresh().await,
            RefreshOutcome::NotModified
        ));
        assert!(has_flag(&store, "a"));
        assert!(!store.is_stale());

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].1.get(IF_NONE_MATCH).map(String::as_str),
            Some("etag-1")
        );
    }

    #[tokio::test]
    async fn stale_cache_replaced_by_new_config() {
        let storage = Arc::new(InMemoryStorage::new());
        let fetcher = Arc::new(StaticFetcher::new(Ok(fetched("a", Some("etag-1")))));
        let store = store(storage.clone(), fetcher.clone(), Some("https://example.com/c"), None);
        store.ensure_fresh().await;

        store.set_last_fetch(Utc::now() - Duration::days(2));
        fetcher.set_response(Ok(fetched("b", Some("etag-2"))));

        assert!(matches!(store.ensure_fresh().await, RefreshOutcome::Fetched));
        assert!(has_flag(&store, "b"));
        assert!(!has_flag(&store, "a"));
        assert_eq!(
            storage.get(keys::CONFIG_ETAG).await.unwrap().as_deref(),
            Some("etag-2")
        );
    }

    #[tokio::test]
    async fn failure_keeps_current_configuration() {
        let storage = Arc::new(InMemoryStorage::new());
        let fetcher = Arc::new(StaticFetcher::new(Ok(fetched("a", None))));
        let store = store(storage, fetcher.clone(), Some("https://example.com/c"), None);
        store.ensure_fresh().await;

        store.set_last_fetch(Utc::now() - Duration::days(2));
        fetcher.set_response(Err(Error::UnexpectedStatus(500)));

        assert!(matches!(
            store.ensure_fresh().await,
            RefreshOutcome::Failed(Error::UnexpectedStatus(500))
        ));
        assert!(has_flag(&store, "a"));
        // Timestamp is not reset on failure.
        assert!(store.is_stale());
    }

    #[tokio::test]
    async fn failure_without_any_configuration() {
        let storage = Arc::new(InMemoryStorage::new());
        let fetcher = Arc::new(StaticFetcher::new(Err(Error::UnexpectedStatus(503))));
        let store = store(storage, fetcher, Some("https://example.com/c"), None);

        assert!(matches!(
            store.ensure_fresh().await,
            RefreshOutcome::Failed(_)
        ));
        assert!(store.get_configuration().is_none());
    }

    #[tokio::test]
    async fn static_configuration_without_url() {
        let storage = Arc::new(InMemoryStorage::new());
        let fetcher = Arc::new(StaticFetcher::new(Ok(fetched("remote", None))));
        let store = store(storage, fetcher.clone(), None, Some(test_config("static")));

        assert!(matches!(store.ensure_fresh().await, RefreshOutcome::Fresh));

        store.set_last_fetch(Utc::now() - Duration::days(2));
        assert!(matches!(
            store.ensure_fresh().await,
            RefreshOutcome::Failed(Error::MissingConfigSource)
        ));
        assert!(has_flag(&store, "static"));
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn not_modified_restores_cached_configuration() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .set(keys::CONFIG, &serde_json::to_string(&test_config("cached")).unwrap())
            .await
            .unwrap();
        storage.set(keys::CONFIG_ETAG, "etag-1").await.unwrap();
        let fetcher = Arc::new(StaticFetcher::new(Ok(FetchResponse::default())));
        let store = store(storage, fetcher.clone(), Some("https://example.com/c"), None);
        store.set_last_fetch(Utc::now() - Duration::days(2));

        assert!(matches!(
            store.ensure_fresh().await,
            RefreshOutcome::NotModified
        ));
        assert!(has_flag(&store, "cached"));
        assert_eq!(fetcher.requests().len(), 1);
    }
}
