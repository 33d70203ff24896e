//! # synctrust
//!
//! Trust and notification substrate of a peer-to-peer file synchronization
//! tool. It keeps long-lived key material and trusted host keys encrypted
//! at rest, and dispatches sync item changes to the jobs subscribed to them.
//!
//! ## Core Modules
//!
//! - [`envelope`] - AES-256-GCM sealing of on-disk snapshots
//! - [`crypto`] - RSA key pairs and OAEP message encryption
//! - [`keystore`] - Encrypted store of key pairs and trusted connections
//! - [`events`] - Encrypted registry of events, listeners and subscriptions
//! - [`dispatcher`] - Fires the jobs subscribed to a sync item
//! - [`repository`] - Reference-counted, lazily loaded snapshots
//! - [`context`] - Startup wiring of all of the above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use synctrust::{SyncItem, TrustContext};
//!
//! fn main() -> synctrust::Result<()> {
//!     let context = TrustContext::from_env()?;
//!     let pair = context.keys().new_key("laptop")?;
//!     context.keys().add_connection("nas.local", &pair.public_key()?)?;
//!
//!     let report = context.dispatcher().trigger(&SyncItem::new("docs", "/srv/docs", true))?;
//!     println!("{} job(s) ran", report.invoked());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod crypto;
pub mod debounce;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod item;
pub mod job;
pub mod keystore;
pub mod repository;
pub mod storage;
pub mod watcher;

pub use config::{MasterKey, Settings};
pub use context::TrustContext;
pub use crypto::KeyPair;
pub use dispatcher::{Dispatcher, TriggerReport};
pub use error::{JobError, Result, TrustError};
pub use events::{Event, EventRegistry, Listener};
pub use item::SyncItem;
pub use job::{Job, JobRunner};
pub use keystore::{Connection, KeyStore};
