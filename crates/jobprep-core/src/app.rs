//! Application container
//!
//! Opens the shared store once and hands each execution context its own
//! session manager over it.

use jobprep_session::SessionManager;
use jobprep_storage::{Database, SharedStore};

use crate::config::Config;
use crate::Result;

pub struct App {
    config: Config,
    store: SharedStore,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = match &config.database_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Database::open(path)?
            }
            None => Database::open_in_memory()?,
        };

        tracing::info!(database = ?config.database_path, "Opened session store");

        Ok(Self {
            config,
            store: SharedStore::new(db),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Attach a new tab/window and build its session manager.
    pub fn open_context(&self) -> Result<SessionManager> {
        Ok(SessionManager::new(
            self.store.context(),
            self.config.session.clone(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobprep_session::UserProfile;

    #[test]
    fn test_contexts_share_store() {
        let app = App::new(Config::in_memory()).unwrap();
        let first = app.open_context().unwrap();
        let second = app.open_context().unwrap();

        first.start(&UserProfile::new("alice"), "tok-1").unwrap();
        second.process_pending();

        assert!(second.state().is_active());
        assert_eq!(second.get_data().unwrap().user.username, "alice");
        assert_eq!(first.session_id(), second.session_id());
    }

    #[test]
    fn test_session_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().join("data"));

        {
            let app = App::new(config.clone()).unwrap();
            app.open_context()
                .unwrap()
                .start(&UserProfile::new("alice"), "tok-1")
                .unwrap();
        }

        let app = App::new(config).unwrap();
        let manager = app.open_context().unwrap();
        assert!(manager.is_active());
        assert_eq!(manager.get_data().unwrap().token, "tok-1");
    }
}
