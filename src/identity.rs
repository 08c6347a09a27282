//! Resolution and persistence of the identifiers used for bucketing.
use std::sync::Arc;

use crate::{
    storage::{keys, Storage},
    Result,
};

#[derive(Debug, Default)]
struct IdentityState {
    bootstrapped: bool,
    app_user_id: Option<String>,
    ff_user_id: Option<String>,
}

/// Application user id and anonymous feature-flag user id of the current client.
///
/// All reads and writes go through one async mutex, so concurrent first evaluations never
/// generate two different anonymous ids.
pub(crate) struct Identity {
    storage: Arc<dyn Storage>,
    state: tokio::sync::Mutex<IdentityState>,
}

impl Identity {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Identity {
            storage,
            state: tokio::sync::Mutex::new(IdentityState::default()),
        }
    }

    /// Resolve identities on first call. Later calls return the already resolved application user
    /// id, unless the previous attempt hit a storage error.
    ///
    /// The application user id comes from `context_user_id`, falling back to storage. It is never
    /// generated. The anonymous id is loaded from storage or generated.
    pub async fn bootstrap(&self, context_user_id: Option<&str>) -> Option<String> {
        let mut state = self.state.lock().await;
        if state.bootstrapped {
            return state.app_user_id.clone();
        }

        let mut succeeded = true;

        let stored_app_user_id = self
            .storage
            .get(keys::APP_USER_ID)
            .await
            .unwrap_or_else(|err| {
                log::warn!(target: "ffclient", "failed to read app user id: {}", err);
                succeeded = false;
                None
            });
        state.app_user_id = match context_user_id {
            Some(user_id) => {
                if stored_app_user_id.as_deref() != Some(user_id) {
                    log::debug!(target: "ffclient", user_id; "persisting app user id");
                    succeeded &= self.persist(keys::APP_USER_ID, user_id).await.is_ok();
                }
                Some(user_id.to_owned())
            }
            None => stored_app_user_id,
        };

        if state.ff_user_id.is_none() {
            match self.load_or_create_ff_user_id().await {
                Ok(ff_user_id) => state.ff_user_id = Some(ff_user_id),
                Err(ff_user_id) => {
                    state.ff_user_id = Some(ff_user_id);
                    succeeded = false;
                }
            }
        }

        state.bootstrapped = succeeded;
        state.app_user_id.clone()
    }

    /// Get the anonymous feature-flag user id, loading or creating it if needed.
    pub async fn ff_user_id(&self) -> String {
        let mut state = self.state.lock().await;
        if let Some(ff_user_id) = &state.ff_user_id {
            return ff_user_id.clone();
        }
        let ff_user_id = self
            .load_or_create_ff_user_id()
            .await
            .unwrap_or_else(|ff_user_id| ff_user_id);
        state.ff_user_id = Some(ff_user_id.clone());
        ff_user_id
    }

    /// Returns `Err` with a usable (possibly unpersisted) id if storage failed.
    async fn load_or_create_ff_user_id(&self) -> std::result::Result<String, String> {
        match self.storage.get(keys::FF_USER_ID).await {
            Ok(Some(ff_user_id)) => return Ok(ff_user_id),
            Ok(None) => {}
            Err(err) => {
                log::warn!(target: "ffclient", "failed to read ff user id: {}", err);
            }
        }

        let ff_user_id = uuid::Uuid::new_v4().to_string();
        log::debug!(target: "ffclient", ff_user_id:display; "generated ff user id");
        match self.persist(keys::FF_USER_ID, &ff_user_id).await {
            Ok(()) => Ok(ff_user_id),
            Err(_) => Err(ff_user_id),
        }
    }

    async fn persist(&self, key: &str, value: &str) -> Result<()> {
        self.storage.set(key, value).await.inspect_err(|err| {
            log::warn!(target: "ffclient", key; "failed to persist identity: {}", err);
        })
    }
}
