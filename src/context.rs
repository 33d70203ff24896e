//! Process-level wiring of the key store, the event registry and the
//! dispatcher.
//!
//! A [`TrustContext`] is built once at startup from [`Settings`] and the
//! [`MasterKey`], then passed by reference to whatever needs it.

use crate::config::{self, MasterKey, Settings};
use crate::dispatcher::Dispatcher;
use crate::envelope::EnvelopeCipher;
use crate::error::Result;
use crate::events::EventRegistry;
use crate::job::JobRunner;
use crate::keystore::KeyStore;
use std::sync::Arc;
use tracing::{info, warn};

pub struct TrustContext {
    settings: Settings,
    keys: KeyStore,
    dispatcher: Dispatcher,
}

impl TrustContext {
    pub fn init(settings: Settings, master_key: &MasterKey) -> Self {
        let cipher = EnvelopeCipher::new(master_key);
        let keys = KeyStore::open(settings.keystore_path(), cipher.clone());
        let events = EventRegistry::open(settings.events_path(), cipher);

        info!("Trust context ready (data dir: {})", settings.data_dir.display());

        Self {
            settings,
            keys,
            dispatcher: Dispatcher::new(events),
        }
    }

    /// Build the context from `AUTH_ENCRYPT_KEY` and the default settings,
    /// after loading a `.env` file if there is one. Configuration problems
    /// are returned as [`TrustError::Config`](crate::TrustError::Config)
    /// and should abort startup.
    pub fn from_env() -> Result<Self> {
        config::load_dotenv()?;
        let master_key = MasterKey::from_env()?;
        let settings = Settings::load()?;
        Ok(Self::init(settings, &master_key))
    }

    /// Replace the job runner used by the dispatcher.
    pub fn with_runner(mut self, runner: Arc<dyn JobRunner>) -> Self {
        self.dispatcher = Dispatcher::with_runner(self.dispatcher.registry().clone(), runner);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn events(&self) -> &EventRegistry {
        self.dispatcher.registry()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Tear the context down, reporting handles that are still alive.
    pub fn shutdown(self) {
        let key_refs = self.keys.repository().ref_count();
        let event_refs = self.events().repository().ref_count();
        if key_refs > 0 || event_refs > 0 {
            warn!(
                "Shutting down with live handles (key store: {}, event registry: {})",
                key_refs, event_refs
            );
        } else {
            info!("Trust context shut down");
        }
    }
}
