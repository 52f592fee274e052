//! Typed access to the session keys of the shared store

use jobprep_storage::{ContextId, StoreContext, StorageSubscription};

use crate::Result;

/// Fully-qualified names of the persisted session keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub token: String,
    pub user: String,
    pub token_expiry: String,
    pub last_active: String,
    pub session_id: String,
}

impl StorageKeys {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            token: format!("{prefix}token"),
            user: format!("{prefix}user"),
            token_expiry: format!("{prefix}token_expiry"),
            last_active: format!("{prefix}last_active"),
            session_id: format!("{prefix}session_id"),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::with_prefix(crate::config::DEFAULT_KEY_PREFIX)
    }
}

pub struct SessionStore {
    context: StoreContext,
    keys: StorageKeys,
}

impl SessionStore {
    pub fn new(context: StoreContext, keys: StorageKeys) -> Self {
        Self { context, keys }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }

    pub fn subscribe(&self) -> StorageSubscription {
        self.context.subscribe()
    }

    /// The stored token; an empty string counts as absent.
    pub fn token(&self) -> Result<Option<String>> {
        Ok(self
            .context
            .get(&self.keys.token)?
            .filter(|token| !token.is_empty()))
    }

    pub fn user_json(&self) -> Result<Option<String>> {
        Ok(self.context.get(&self.keys.user)?)
    }

    /// Absolute deadline. A value that is not a decimal timestamp reads as absent.
    pub fn token_expiry(&self) -> Result<Option<i64>> {
        self.timestamp(&self.keys.token_expiry)
    }

    pub fn last_active(&self) -> Result<Option<i64>> {
        self.timestamp(&self.keys.last_active)
    }

    pub fn session_id(&self) -> Result<Option<String>> {
        Ok(self
            .context
            .get(&self.keys.session_id)?
            .filter(|id| !id.is_empty()))
    }

    /// Write a whole session. The token goes last so another context that
    /// reacts to the token broadcast already sees user and deadline.
    pub fn write_session(&self, token: &str, user_json: &str, expiry_at: i64) -> Result<()> {
        self.context.set(&self.keys.user, user_json)?;
        self.set_token_expiry(expiry_at)?;
        self.context.set(&self.keys.token, token)?;
        Ok(())
    }

    /// Remove token, user and deadline. Returns whether anything was stored.
    pub fn clear_session(&self) -> Result<bool> {
        let token = self.context.remove(&self.keys.token)?;
        let user = self.context.remove(&self.keys.user)?;
        let expiry = self.context.remove(&self.keys.token_expiry)?;
        Ok(token.is_some() || user.is_some() || expiry.is_some())
    }

    pub fn set_token_expiry(&self, expiry_at: i64) -> Result<()> {
        Ok(self
            .context
            .set(&self.keys.token_expiry, &expiry_at.to_string())?)
    }

    pub fn set_last_active(&self, at: i64) -> Result<()> {
        Ok(self.context.set(&self.keys.last_active, &at.to_string())?)
    }

    pub fn set_session_id(&self, id: &str) -> Result<()> {
        Ok(self.context.set(&self.keys.session_id, id)?)
    }

    fn timestamp(&self, key: &str) -> Result<Option<i64>> {
        let Some(raw) = self.context.get(key)? else {
            return Ok(None);
        };

        match raw.trim().parse::<i64>() {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key = %key, value = %raw, error = %e, "Ignoring malformed timestamp");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobprep_storage::SharedStore;

    fn store() -> (SharedStore, SessionStore) {
        let shared = SharedStore::open_in_memory().unwrap();
        let session_store = SessionStore::new(shared.context(), StorageKeys::default());
        (shared, session_store)
    }

    #[test]
    fn test_default_key_names() {
        let keys = StorageKeys::default();
        assert_eq!(keys.token, "jobprep_token");
        assert_eq!(keys.user, "jobprep_user");
        assert_eq!(keys.token_expiry, "jobprep_token_expiry");
        assert_eq!(keys.last_active, "jobprep_last_active");
        assert_eq!(keys.session_id, "jobprep_session_id");
    }

    #[test]
    fn test_write_and_clear_session() {
        let (shared, store) = store();
        store
            .write_session("tok-1", r#"{"username":"alice"}"#, 42)
            .unwrap();

        assert_eq!(store.token().unwrap().as_deref(), Some("tok-1"));
        assert_eq!(store.token_expiry().unwrap(), Some(42));
        assert_eq!(
            shared.database().get_item("jobprep_token_expiry").unwrap(),
            Some("42".to_string())
        );

        assert!(store.clear_session().unwrap());
        assert!(store.token().unwrap().is_none());
        assert!(store.user_json().unwrap().is_none());
        assert!(!store.clear_session().unwrap());
    }

    #[test]
    fn test_token_is_written_last() {
        let (shared, store) = store();
        let mut events = shared.context().subscribe();

        store.write_session("tok-1", "{}", 1).unwrap();

        let keys: Vec<String> = std::iter::from_fn(|| events.try_next())
            .map(|e| e.key)
            .collect();
        assert_eq!(keys.last().map(String::as_str), Some("jobprep_token"));
    }

    #[test]
    fn test_malformed_timestamp_reads_as_absent() {
        let (shared, store) = store();
        shared
            .database()
            .set_item("jobprep_last_active", "yesterday")
            .unwrap();

        assert_eq!(store.last_active().unwrap(), None);
    }

    #[test]
    fn test_empty_token_reads_as_absent() {
        let (shared, store) = store();
        shared.database().set_item("jobprep_token", "").unwrap();

        assert!(store.token().unwrap().is_none());
    }
}
