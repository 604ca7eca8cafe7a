//! # Request Ledger
//!
//! Contact requests and their approval state.
//!
//! ## Request Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      CONTACT REQUEST LIFECYCLE                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   create_request(from, to)                                             │
//! │            │                                                            │
//! │            ▼              push "Someone has requested your              │
//! │     ┌─────────────┐       contact details!" to `to` (best effort)      │
//! │     │   Pending   │                                                     │
//! │     │ allowed=NULL│                                                     │
//! │     └──────┬──────┘                                                     │
//! │            │ resolve_request(id, allowed)   exactly once                │
//! │     ┌──────┴──────┐                                                     │
//! │     ▼             ▼                                                     │
//! │ ┌─────────┐  ┌─────────┐   push "Your request has been accepted!"      │
//! │ │ Granted │  │ Denied  │   to `from` on grant (best effort)            │
//! │ │ allowed │  │ allowed │                                                │
//! │ │ = true  │  │ = false │   any further resolve → RequestAlreadyResolved │
//! │ └─────────┘  └─────────┘                                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Granting a request does not create the mirrored request from `to` back
//! to `from`; each direction must be requested and granted on its own.
//!
//! Nothing prevents several pending requests between the same pair.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::{validate_user_id, UserDirectory};
use crate::error::{Error, Result};
use crate::notify::{NotificationDispatcher, REQUEST_ACCEPTED_MESSAGE, REQUEST_RECEIVED_MESSAGE};
use crate::storage::{Database, RequestRecord, ResolveOutcome};
use crate::time::{from_millis, now_timestamp_millis};

/// Where a request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Awaiting an answer
    Pending,
    /// Contact details unlocked for the requester
    Granted,
    /// Refused
    Denied,
}

impl RequestState {
    /// Derive the state from the stored tri-state flag
    pub fn from_allowed(allowed: Option<bool>) -> Self {
        match allowed {
            None => RequestState::Pending,
            Some(true) => RequestState::Granted,
            Some(false) => RequestState::Denied,
        }
    }

    /// String form, as used in logs and API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Granted => "granted",
            RequestState::Denied => "denied",
        }
    }

    /// Granted and Denied are final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestState::Pending)
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contact request as seen by callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRequest {
    /// Unique request ID (UUID v4)
    pub id: String,
    /// Who asked
    pub from: String,
    /// Whose details were asked for
    pub to: String,
    /// When the request was made
    pub created_at: DateTime<Utc>,
    /// `None` while pending
    pub allowed: Option<bool>,
}

impl ContactRequest {
    /// Current lifecycle state
    pub fn state(&self) -> RequestState {
        RequestState::from_allowed(self.allowed)
    }
}

impl From<RequestRecord> for ContactRequest {
    fn from(record: RequestRecord) -> Self {
        Self {
            id: record.id,
            from: record.from,
            to: record.to,
            created_at: from_millis(record.created),
            allowed: record.allowed,
        }
    }
}

/// Creates and resolves contact requests.
#[derive(Clone)]
pub struct RequestLedger {
    database: Arc<Database>,
    directory: UserDirectory,
    notifier: NotificationDispatcher,
}

impl RequestLedger {
    /// Create a ledger over the given store, notifying through `notifier`
    pub fn new(database: Arc<Database>, notifier: NotificationDispatcher) -> Self {
        Self {
            directory: UserDirectory::new(database.clone()),
            database,
            notifier,
        }
    }

    /// Ask `to` for their contact details on behalf of `from`.
    ///
    /// Returns the new request's ID. The recipient is notified if they have
    /// a device registered; a missing device never fails the call.
    pub fn create_request(&self, from: &str, to: &str) -> Result<String> {
        validate_user_id(from)?;
        validate_user_id(to)?;
        if from == to {
            return Err(Error::CannotRequestSelf);
        }
        self.directory.require_user(from)?;
        self.directory.require_user(to)?;

        let record = RequestRecord {
            id: Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            created: now_timestamp_millis(),
            allowed: None,
        };
        self.database.insert_request(&record)?;

        tracing::info!(
            request_id = record.id.as_str(),
            from = from,
            to = to,
            "Contact request created"
        );

        self.notify_user(to, REQUEST_RECEIVED_MESSAGE);

        Ok(record.id)
    }

    /// Answer a pending request. Returns the requester's user ID.
    ///
    /// The first answer is final: answering again fails with
    /// [`Error::RequestAlreadyResolved`] and leaves the stored answer as is.
    pub fn resolve_request(&self, request_id: &str, allowed: bool) -> Result<String> {
        let from = match self.database.resolve_request(request_id, allowed)? {
            ResolveOutcome::Resolved { from } => from,
            ResolveOutcome::AlreadyResolved { allowed: previous } => {
                tracing::warn!(
                    request_id = request_id,
                    previous = previous,
                    attempted = allowed,
                    "Rejected second resolution of request"
                );
                return Err(Error::RequestAlreadyResolved(request_id.to_string()));
            }
            ResolveOutcome::Missing => {
                return Err(Error::RequestNotFound(request_id.to_string()));
            }
        };

        tracing::info!(
            request_id = request_id,
            from = from.as_str(),
            state = %RequestState::from_allowed(Some(allowed)),
            "Contact request resolved"
        );

        if allowed {
            self.notify_user(&from, REQUEST_ACCEPTED_MESSAGE);
        }

        Ok(from)
    }

    /// Get a request by ID
    pub fn get_request(&self, request_id: &str) -> Result<ContactRequest> {
        self.database
            .get_request(request_id)?
            .map(ContactRequest::from)
            .ok_or_else(|| Error::RequestNotFound(request_id.to_string()))
    }

    /// Look up the user's device and queue a push. Lookup failures are
    /// logged and swallowed.
    fn notify_user(&self, user_id: &str, message: &str) {
        match self.directory.get_device_id(user_id) {
            Ok(device) => self.notifier.notify(message, &device),
            Err(e) => {
                tracing::warn!(
                    user_id = user_id,
                    error = %e,
                    "Could not resolve device ID, skipping notification"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ContactDocument;
    use crate::error::ErrorKind;
    use crate::notify::Notification;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        ledger: RequestLedger,
        outbox: UnboundedReceiver<Notification>,
    }

    fn fixture() -> Fixture {
        let database = Arc::new(Database::open(None).unwrap());
        let directory = UserDirectory::new(database.clone());
        for (id, device) in [("alice", Some("\"dev-alice\"")), ("bob", Some("dev-bob")), ("carol", None)] {
            let mut doc = json!({ "first_name": id });
            if let Some(device) = device {
                doc["device_id"] = json!(device);
            }
            directory
                .create_user(id, ContactDocument::from_value(doc).unwrap())
                .unwrap();
        }

        let (notifier, outbox) = NotificationDispatcher::channel();
        Fixture {
            ledger: RequestLedger::new(database, notifier),
            outbox,
        }
    }

    #[test]
    fn test_create_request_is_pending_and_notifies_recipient() {
        let mut fx = fixture();
        let id = fx.ledger.create_request("alice", "bob").unwrap();

        let request = fx.ledger.get_request(&id).unwrap();
        assert_eq!(request.state(), RequestState::Pending);
        assert_eq!(request.from, "alice");
        assert_eq!(request.to, "bob");

        let push = fx.outbox.try_recv().unwrap();
        assert_eq!(push.message, REQUEST_RECEIVED_MESSAGE);
        assert_eq!(push.device_token, "dev-bob");
    }

    #[test]
    fn test_create_request_without_device_still_succeeds() {
        let mut fx = fixture();
        let id = fx.ledger.create_request("alice", "carol").unwrap();
        assert!(!id.is_empty());
        assert!(fx.outbox.try_recv().is_err());
    }

    #[test]
    fn test_create_request_validation() {
        let fx = fixture();
        assert!(matches!(
            fx.ledger.create_request("alice", "alice"),
            Err(Error::CannotRequestSelf)
        ));
        assert!(matches!(
            fx.ledger.create_request("", "bob"),
            Err(Error::InvalidUserId(_))
        ));
        assert!(matches!(
            fx.ledger.create_request("alice", "ghost"),
            Err(Error::UserNotFound(id)) if id == "ghost"
        ));
    }

    #[test]
    fn test_duplicate_pending_requests_allowed() {
        let fx = fixture();
        let first = fx.ledger.create_request("alice", "bob").unwrap();
        let second = fx.ledger.create_request("alice", "bob").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_grant_notifies_requester() {
        let mut fx = fixture();
        let id = fx.ledger.create_request("alice", "bob").unwrap();
        let _ = fx.outbox.try_recv();

        let from = fx.ledger.resolve_request(&id, true).unwrap();
        assert_eq!(from, "alice");
        assert_eq!(fx.ledger.get_request(&id).unwrap().state(), RequestState::Granted);

        let push = fx.outbox.try_recv().unwrap();
        assert_eq!(push.message, REQUEST_ACCEPTED_MESSAGE);
        // stored with wrapping quotes
        assert_eq!(push.device_token, "dev-alice");
    }

    #[test]
    fn test_deny_does_not_notify() {
        let mut fx = fixture();
        let id = fx.ledger.create_request("alice", "bob").unwrap();
        let _ = fx.outbox.try_recv();

        fx.ledger.resolve_request(&id, false).unwrap();
        assert_eq!(fx.ledger.get_request(&id).unwrap().state(), RequestState::Denied);
        assert!(fx.outbox.try_recv().is_err());
    }

    #[test]
    fn test_second_resolution_is_conflict() {
        let fx = fixture();
        let id = fx.ledger.create_request("alice", "bob").unwrap();

        fx.ledger.resolve_request(&id, false).unwrap();
        let err = fx.ledger.resolve_request(&id, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(fx.ledger.get_request(&id).unwrap().allowed, Some(false));
    }

    #[test]
    fn test_resolve_unknown_request() {
        let fx = fixture();
        assert!(matches!(
            fx.ledger.resolve_request("no-such-request", true),
            Err(Error::RequestNotFound(_))
        ));
        assert!(matches!(
            fx.ledger.get_request("no-such-request"),
            Err(Error::RequestNotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_resolutions_single_winner() {
        let fx = fixture();
        let id = fx.ledger.create_request("alice", "bob").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = fx.ledger.clone();
                let id = id.clone();
                std::thread::spawn(move || ledger.resolve_request(&id, i % 2 == 0))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::RequestAlreadyResolved(_))));
    }

    #[test]
    fn test_grant_does_not_create_reverse_request() {
        let fx = fixture();
        let id = fx.ledger.create_request("alice", "bob").unwrap();
        fx.ledger.resolve_request(&id, true).unwrap();

        let stats = fx.ledger.database.stats().unwrap();
        assert_eq!(stats.granted_requests, 1);
        assert_eq!(stats.pending_requests, 0);
    }

    #[test]
    fn test_request_state_strings() {
        assert_eq!(RequestState::Pending.as_str(), "pending");
        assert_eq!(RequestState::from_allowed(Some(true)), RequestState::Granted);
        assert!(RequestState::Denied.is_terminal());
        assert!(!RequestState::Pending.is_terminal());
    }
}
