//! # Handshake Core
//!
//! Contact-introduction backend: users sign up with a contact document,
//! discover each other, and exchange contact requests that unlock the
//! other side's details once granted.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       HANDSHAKE CORE MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────┐        ┌──────────────────┐                      │
//! │  │  RequestLedger   │        │ VisibilityResolver│                      │
//! │  │                  │        │                   │                      │
//! │  │ - create_request │        │ - discoverable    │                      │
//! │  │ - resolve_request│        │ - pending incoming│                      │
//! │  │ - get_request    │        │ - granted         │                      │
//! │  └───┬─────────┬────┘        └─────────┬─────────┘                      │
//! │      │         │                       │                                │
//! │      │         ▼                       │                                │
//! │      │  ┌──────────────┐               │                                │
//! │      │  │ UserDirectory│◄──────────────┤                                │
//! │      │  │ - documents  │               │                                │
//! │      │  │ - device IDs │               │                                │
//! │      │  │ - locations  │               │                                │
//! │      │  └──────┬───────┘               │                                │
//! │      │         │                       │                                │
//! │      ▼         ▼                       ▼                                │
//! │  ┌──────────────────┐        ┌──────────────────┐                      │
//! │  │ Notification     │        │  Storage          │                      │
//! │  │ Dispatcher       │        │  (SQLite)         │                      │
//! │  │ fire-and-forget  │        │  source of truth  │                      │
//! │  └──────────────────┘        └──────────────────┘                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types and their classification
//! - [`storage`] - SQLite persistence
//! - [`directory`] - Users, contact documents, locations
//! - [`ledger`] - Contact request lifecycle
//! - [`visibility`] - What each user may see
//! - [`notify`] - Best-effort push notifications
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use handshake_core::{Database, Handshake, NotificationDispatcher, LogSink};
//!
//! let database = Arc::new(Database::open(Some("handshake.db"))?);
//! let (notifier, _worker) = NotificationDispatcher::spawn(Arc::new(LogSink));
//! let handshake = Handshake::new(database, notifier);
//!
//! let request_id = handshake.ledger.create_request("alice", "bob")?;
//! handshake.ledger.resolve_request(&request_id, true)?;
//! let contacts = handshake.visibility.list_granted("alice")?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod directory;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod storage;
/// Millisecond timestamps and conversions.
pub mod time;
pub mod visibility;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use directory::{ContactDocument, ContactSummary, Location, UserDirectory};
pub use error::{Error, ErrorKind, Result};
pub use ledger::{ContactRequest, RequestLedger, RequestState};
pub use notify::{LogSink, Notification, NotificationDispatcher, PushSink};
pub use storage::{Database, DatabaseConfig, StoreStats};
pub use visibility::{PendingRequest, VisibilityResolver};

use std::sync::Arc;

// ============================================================================
// SERVICE BUNDLE
// ============================================================================

/// All services wired to one store and one notification queue.
#[derive(Clone)]
pub struct Handshake {
    /// Users and contact documents
    pub directory: UserDirectory,
    /// Contact requests
    pub ledger: RequestLedger,
    /// Derived views
    pub visibility: VisibilityResolver,
    database: Arc<Database>,
}

impl Handshake {
    /// Wire up every service over `database`
    pub fn new(database: Arc<Database>, notifier: NotificationDispatcher) -> Self {
        Self {
            directory: UserDirectory::new(database.clone()),
            ledger: RequestLedger::new(database.clone(), notifier),
            visibility: VisibilityResolver::new(database.clone()),
            database,
        }
    }

    /// Row counts, for health and stats endpoints
    pub fn stats(&self) -> Result<StoreStats> {
        self.database.stats()
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Handshake Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_bundle_shares_one_store() {
        let database = Arc::new(Database::open(None).unwrap());
        let (notifier, _rx) = NotificationDispatcher::channel();
        let handshake = Handshake::new(database, notifier);

        for id in ["alice", "bob"] {
            handshake
                .directory
                .create_user(id, ContactDocument::from_value(json!({})).unwrap())
                .unwrap();
        }
        let id = handshake.ledger.create_request("alice", "bob").unwrap();
        assert_eq!(handshake.visibility.list_pending_incoming("bob").unwrap().len(), 1);

        handshake.ledger.resolve_request(&id, true).unwrap();
        let stats = handshake.stats().unwrap();
        assert_eq!(stats.users, 2);
        assert_eq!(stats.granted_requests, 1);
    }
}
