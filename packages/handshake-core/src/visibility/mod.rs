//! # Visibility
//!
//! Which users and contact details a given user is allowed to see.
//!
//! ```text
//!                        ┌──────────────────────────┐
//!  list_discoverable(u)  │ everyone except u and    │  summaries only
//!                        │ users u was granted      │
//!                        ├──────────────────────────┤
//!  list_pending_incoming │ requests to u that are   │  sender summary
//!                        │ still unanswered         │  + request ID
//!                        ├──────────────────────────┤
//!  list_granted(u)       │ users who granted u's    │  full document,
//!                        │ request                  │  minus device_id
//!                        └──────────────────────────┘
//! ```
//!
//! Every call reads straight from the store; nothing is cached.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::{ContactDocument, ContactSummary, UserDirectory};
use crate::error::Result;
use crate::storage::{Database, PendingRequestRecord};
use crate::time::from_millis;

/// An unanswered request addressed to the viewing user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Sender's image (empty if none)
    pub image: String,
    /// Sender's first name (empty if none)
    pub first_name: String,
    /// Sender's user ID
    pub user_id: String,
    /// ID to pass back when answering
    pub request_id: String,
    /// When the request was made
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<PendingRequestRecord> for PendingRequest {
    fn from(record: PendingRequestRecord) -> Self {
        Self {
            image: record.image.unwrap_or_default(),
            first_name: record.first_name.unwrap_or_default(),
            user_id: record.from,
            request_id: record.request_id,
            created_at: Some(from_millis(record.created)),
        }
    }
}

/// Read-only views over users and requests.
#[derive(Clone)]
pub struct VisibilityResolver {
    database: Arc<Database>,
    directory: UserDirectory,
}

impl VisibilityResolver {
    /// Create a resolver over the given store
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            directory: UserDirectory::new(database.clone()),
            database,
        }
    }

    /// Users `user_id` can still send requests to.
    ///
    /// Pending and denied requests do not hide a user; only a granted one does.
    pub fn list_discoverable(&self, user_id: &str) -> Result<Vec<ContactSummary>> {
        self.directory.list_discoverable(user_id)
    }

    /// Unanswered requests addressed to `user_id`, oldest first
    pub fn list_pending_incoming(&self, user_id: &str) -> Result<Vec<PendingRequest>> {
        let pending: Vec<PendingRequest> = self
            .database
            .pending_incoming(user_id)?
            .into_iter()
            .map(PendingRequest::from)
            .collect();

        tracing::debug!(user_id = user_id, count = pending.len(), "Listed pending requests");
        Ok(pending)
    }

    /// Contact documents `user_id` has been granted, sorted by last name then
    /// first name. Device IDs are always stripped.
    pub fn list_granted(&self, user_id: &str) -> Result<Vec<ContactDocument>> {
        let contacts = self
            .database
            .granted_contacts(user_id)?
            .iter()
            .map(|raw| ContactDocument::from_stored(raw).map(ContactDocument::without_device_id))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(user_id = user_id, count = contacts.len(), "Listed granted contacts");
        Ok(contacts)
    }
}
