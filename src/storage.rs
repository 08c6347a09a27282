//! Persistent key-value storage used for identities and the cached configuration.
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::{Error, Result};

/// Keys under which the client persists its state.
pub mod keys {
    pub const APP_USER_ID: &str = "ff-client:app-user-id";
    pub const FF_USER_ID: &str = "ff-client:ff-user-id";
    pub const CONFIG: &str = "ff-client:config";
    pub const CONFIG_ETAG: &str = "ff-client:config-etag";
}

/// A string key-value store.
///
/// Implement this trait to persist client state in your storage of choice.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
}

/// In-memory storage. Values do not survive process restarts.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| Error::Storage("storage lock poisoned".to_owned()))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::Storage("storage lock poisoned".to_owned()))?;
        values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::Storage("storage lock poisoned".to_owned()))?;
        values.remove(key);
        Ok(())
    }
}

/// Storage for hosts without a usable backend. Writes are dropped and reads return nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStorage;

#[async_trait]
impl Storage for NoopStorage {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}
