//! # User Directory
//!
//! Per-user contact documents, location samples and the discovery listing.
//!
//! ## Contact Documents
//!
//! A contact document is an opaque JSON object supplied at signup and
//! returned whole to users who have been granted access. The directory only
//! looks inside it for a handful of well-known fields:
//!
//! | Field        | Used by                                   |
//! |--------------|-------------------------------------------|
//! | `user_id`    | must match the row's user ID              |
//! | `first_name` | summaries, granted-list ordering          |
//! | `last_name`  | granted-list ordering                     |
//! | `image`      | summaries                                 |
//! | `device_id`  | push notifications (never shown to peers) |
//!
//! ## Discovery
//!
//! Discovery ignores locations entirely: a user is discoverable by everyone
//! who has not yet been granted their contact details.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::storage::{ContactSummaryRecord, Database, LocationRecord};
use crate::time::{from_millis, now_timestamp_millis};

/// Longest accepted user ID, in characters.
pub const MAX_USER_ID_LEN: usize = 128;

/// Document key holding the owner's user ID.
pub const USER_ID_FIELD: &str = "user_id";

/// Document key holding the push token.
pub const DEVICE_ID_FIELD: &str = "device_id";

/// Well-known fields that must be strings when present.
const STRING_FIELDS: &[&str] = &["first_name", "last_name", "image", DEVICE_ID_FIELD];

/// Validate a caller-supplied user ID.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(Error::InvalidUserId("user ID must not be empty".into()));
    }
    if user_id.chars().count() > MAX_USER_ID_LEN {
        return Err(Error::InvalidUserId(format!(
            "user ID must be at most {} characters",
            MAX_USER_ID_LEN
        )));
    }
    Ok(())
}

/// Strip wrapping quote characters from a stored device token.
///
/// Returns `None` when nothing usable is left.
pub fn normalize_device_id(raw: &str) -> Option<String> {
    let stripped = raw.trim().trim_matches('"').trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

// ============================================================================
// CONTACT DOCUMENT
// ============================================================================

/// A user's opaque contact document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactDocument(Map<String, Value>);

impl ContactDocument {
    /// Build a document from caller input. Anything but a JSON object is
    /// rejected as a validation error.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidContactDocument(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Parse caller-supplied JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::InvalidContactDocument(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decode a document read back from the store. Failures here mean the
    /// stored data is corrupt, so they surface as store errors.
    pub(crate) fn from_stored(raw: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(Error::SerializationError(
                "stored contact document is not an object".into(),
            )),
        }
    }

    /// Serialize to JSON text for storage.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// The user ID recorded inside the document, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.get_str(USER_ID_FIELD)
    }

    /// First name, if present.
    pub fn first_name(&self) -> Option<&str> {
        self.get_str("first_name")
    }

    /// Last name, if present.
    pub fn last_name(&self) -> Option<&str> {
        self.get_str("last_name")
    }

    /// Image reference, if present.
    pub fn image(&self) -> Option<&str> {
        self.get_str("image")
    }

    /// Push token with wrapping quotes removed.
    ///
    /// Non-string scalars are accepted using their JSON text, which is what
    /// the store would hand back for them.
    pub fn device_id(&self) -> Option<String> {
        match self.0.get(DEVICE_ID_FIELD)? {
            Value::Null => None,
            Value::String(s) => normalize_device_id(s),
            other => normalize_device_id(&other.to_string()),
        }
    }

    /// Look up a string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// The same document with `device_id` removed, for showing to peers.
    pub fn without_device_id(mut self) -> Self {
        self.0.remove(DEVICE_ID_FIELD);
        self
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Check the document against the ID it is being stored under, filling
    /// in `user_id` when the caller left it out.
    fn bind_to(&mut self, user_id: &str) -> Result<()> {
        match self.0.get(USER_ID_FIELD) {
            None | Some(Value::Null) => {
                self.0
                    .insert(USER_ID_FIELD.to_string(), Value::String(user_id.to_string()));
            }
            Some(Value::String(s)) if s == user_id => {}
            Some(_) => {
                return Err(Error::InvalidContactDocument(format!(
                    "document user_id does not match {}",
                    user_id
                )));
            }
        }

        for field in STRING_FIELDS {
            match self.0.get(*field) {
                None | Some(Value::Null) | Some(Value::String(_)) => {}
                Some(other) => {
                    return Err(Error::InvalidContactDocument(format!(
                        "{} must be a string, got {}",
                        field,
                        json_type_name(other)
                    )));
                }
            }
        }

        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// SUMMARIES AND LOCATIONS
// ============================================================================

/// The public face of a user: enough to render a card, nothing to contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSummary {
    /// Image reference (empty if none)
    pub image: String,
    /// First name (empty if none)
    pub first_name: String,
    /// The user's ID
    pub user_id: String,
}

impl From<ContactSummaryRecord> for ContactSummary {
    fn from(record: ContactSummaryRecord) -> Self {
        Self {
            image: record.image.unwrap_or_default(),
            first_name: record.first_name.unwrap_or_default(),
            user_id: record.user_id,
        }
    }
}

/// A recorded position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Whose position this is
    pub user_id: String,
    /// Degrees north, -90..=90
    pub latitude: f64,
    /// Degrees east, -180..=180
    pub longitude: f64,
    /// When the sample was recorded
    pub created_at: DateTime<Utc>,
}

impl From<LocationRecord> for Location {
    fn from(record: LocationRecord) -> Self {
        Self {
            user_id: record.user_id,
            latitude: record.latitude,
            longitude: record.longitude,
            created_at: from_millis(record.created),
        }
    }
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::InvalidLocation(format!(
            "latitude {} is outside -90..=90",
            latitude
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::InvalidLocation(format!(
            "longitude {} is outside -180..=180",
            longitude
        )));
    }
    Ok(())
}

// ============================================================================
// DIRECTORY SERVICE
// ============================================================================

/// Access to users and their contact documents.
#[derive(Clone)]
pub struct UserDirectory {
    database: Arc<Database>,
}

impl UserDirectory {
    /// Create a directory over the given store
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Register a new user.
    ///
    /// Signup is not an upsert: a second signup with the same ID fails with
    /// [`Error::UserExists`].
    pub fn create_user(&self, user_id: &str, mut document: ContactDocument) -> Result<()> {
        validate_user_id(user_id)?;
        document.bind_to(user_id)?;

        self.database
            .insert_user(user_id, &document.to_json()?, now_timestamp_millis())?;

        tracing::info!(user_id = user_id, "User created");
        Ok(())
    }

    /// Check whether a user exists
    pub fn user_exists(&self, user_id: &str) -> Result<bool> {
        self.database.user_exists(user_id)
    }

    /// Fail with [`Error::UserNotFound`] unless the user exists
    pub fn require_user(&self, user_id: &str) -> Result<()> {
        if self.database.user_exists(user_id)? {
            Ok(())
        } else {
            Err(Error::UserNotFound(user_id.to_string()))
        }
    }

    /// Get a user's full contact document
    pub fn get_contact_document(&self, user_id: &str) -> Result<ContactDocument> {
        let record = self
            .database
            .get_user(user_id)?
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;
        ContactDocument::from_stored(&record.contact_details)
    }

    /// Get a user's summary card
    pub fn get_contact_summary(&self, user_id: &str) -> Result<ContactSummary> {
        let document = self.get_contact_document(user_id)?;
        Ok(ContactSummary {
            image: document.image().unwrap_or_default().to_string(),
            first_name: document.first_name().unwrap_or_default().to_string(),
            user_id: user_id.to_string(),
        })
    }

    /// Get the push token registered for a user.
    ///
    /// Fails with [`Error::UserNotFound`] for unknown users and
    /// [`Error::DeviceNotRegistered`] when the document has no usable token.
    pub fn get_device_id(&self, user_id: &str) -> Result<String> {
        self.get_contact_document(user_id)?
            .device_id()
            .ok_or_else(|| Error::DeviceNotRegistered(user_id.to_string()))
    }

    /// Everyone `user_id` may still send a request to: all users except
    /// `user_id` and those it already holds a granted request to.
    pub fn list_discoverable(&self, user_id: &str) -> Result<Vec<ContactSummary>> {
        let users: Vec<ContactSummary> = self
            .database
            .list_discoverable(user_id)?
            .into_iter()
            .map(ContactSummary::from)
            .collect();

        tracing::debug!(user_id = user_id, count = users.len(), "Listed discoverable users");
        Ok(users)
    }

    /// Append a location sample for a user
    pub fn record_location(&self, user_id: &str, latitude: f64, longitude: f64) -> Result<Location> {
        validate_user_id(user_id)?;
        validate_coordinates(latitude, longitude)?;
        self.require_user(user_id)?;

        let record = LocationRecord {
            user_id: user_id.to_string(),
            latitude,
            longitude,
            created: now_timestamp_millis(),
        };
        self.database.insert_location(&record)?;

        tracing::debug!(user_id = user_id, "Location recorded");
        Ok(record.into())
    }

    /// A user's location samples, oldest first
    pub fn location_history(&self, user_id: &str) -> Result<Vec<Location>> {
        self.require_user(user_id)?;
        Ok(self
            .database
            .get_locations(user_id)?
            .into_iter()
            .map(Location::from)
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn directory() -> UserDirectory {
        UserDirectory::new(Arc::new(Database::open(None).unwrap()))
    }

    fn doc(value: Value) -> ContactDocument {
        ContactDocument::from_value(value).unwrap()
    }

    #[test]
    fn test_create_and_fetch_user() {
        let dir = directory();
        dir.create_user(
            "alice",
            doc(json!({ "first_name": "Alice", "image": "a.png", "device_id": "tok" })),
        )
        .unwrap();

        let stored = dir.get_contact_document("alice").unwrap();
        assert_eq!(stored.user_id(), Some("alice"));
        assert_eq!(stored.first_name(), Some("Alice"));

        let summary = dir.get_contact_summary("alice").unwrap();
        assert_eq!(
            summary,
            ContactSummary {
                image: "a.png".into(),
                first_name: "Alice".into(),
                user_id: "alice".into(),
            }
        );
    }

    #[test]
    fn test_duplicate_signup_is_conflict() {
        let dir = directory();
        dir.create_user("alice", doc(json!({}))).unwrap();
        let err = dir.create_user("alice", doc(json!({}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_document_validation() {
        let dir = directory();

        assert!(matches!(
            ContactDocument::from_value(json!(["not", "an", "object"])),
            Err(Error::InvalidContactDocument(_))
        ));
        assert!(matches!(
            ContactDocument::from_json("{oops"),
            Err(Error::InvalidContactDocument(_))
        ));
        assert!(matches!(
            dir.create_user("", doc(json!({}))),
            Err(Error::InvalidUserId(_))
        ));
        assert!(matches!(
            dir.create_user("alice", doc(json!({ "user_id": "mallory" }))),
            Err(Error::InvalidContactDocument(_))
        ));
        assert!(matches!(
            dir.create_user("alice", doc(json!({ "first_name": 7 }))),
            Err(Error::InvalidContactDocument(_))
        ));
        assert!(!dir.user_exists("alice").unwrap());
    }

    #[test]
    fn test_summary_for_sparse_document() {
        let dir = directory();
        dir.create_user("bob", doc(json!({}))).unwrap();
        let summary = dir.get_contact_summary("bob").unwrap();
        assert_eq!(summary.image, "");
        assert_eq!(summary.first_name, "");
        assert!(matches!(
            dir.get_contact_summary("nobody"),
            Err(Error::UserNotFound(_))
        ));
    }

    #[test]
    fn test_device_id_strips_quotes() {
        let dir = directory();
        dir.create_user("alice", doc(json!({ "device_id": "\"abc123\"" })))
            .unwrap();
        dir.create_user("bob", doc(json!({ "device_id": "plain" })))
            .unwrap();
        dir.create_user("carol", doc(json!({ "device_id": "\"\"" })))
            .unwrap();
        dir.create_user("dave", doc(json!({}))).unwrap();

        assert_eq!(dir.get_device_id("alice").unwrap(), "abc123");
        assert_eq!(dir.get_device_id("bob").unwrap(), "plain");
        assert!(matches!(
            dir.get_device_id("carol"),
            Err(Error::DeviceNotRegistered(_))
        ));
        assert!(matches!(
            dir.get_device_id("dave"),
            Err(Error::DeviceNotRegistered(_))
        ));
        assert_eq!(
            dir.get_device_id("erin").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_without_device_id() {
        let document = doc(json!({ "first_name": "A", "device_id": "tok" })).without_device_id();
        assert!(document.as_map().get(DEVICE_ID_FIELD).is_none());
        assert_eq!(document.first_name(), Some("A"));
    }

    #[test]
    fn test_discoverable_excludes_self() {
        let dir = directory();
        dir.create_user("alice", doc(json!({ "first_name": "Alice" })))
            .unwrap();
        dir.create_user("bob", doc(json!({ "first_name": "Bob" })))
            .unwrap();

        let found = dir.list_discoverable("alice").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, "bob");
        assert_eq!(found[0].first_name, "Bob");
    }

    #[test]
    fn test_record_location() {
        let dir = directory();
        dir.create_user("alice", doc(json!({}))).unwrap();

        let loc = dir.record_location("alice", 51.5, -0.12).unwrap();
        assert_eq!(loc.user_id, "alice");
        dir.record_location("alice", 48.85, 2.35).unwrap();

        let history = dir.location_history("alice").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].latitude, 51.5);
        assert_eq!(history[1].longitude, 2.35);
    }

    #[test]
    fn test_record_location_validation() {
        let dir = directory();
        dir.create_user("alice", doc(json!({}))).unwrap();

        assert!(matches!(
            dir.record_location("alice", 91.0, 0.0),
            Err(Error::InvalidLocation(_))
        ));
        assert!(matches!(
            dir.record_location("alice", 0.0, f64::NAN),
            Err(Error::InvalidLocation(_))
        ));
        assert!(matches!(
            dir.record_location("ghost", 0.0, 0.0),
            Err(Error::UserNotFound(_))
        ));
    }

    #[test]
    fn test_normalize_device_id() {
        assert_eq!(normalize_device_id("\"tok\""), Some("tok".to_string()));
        assert_eq!(normalize_device_id(" tok "), Some("tok".to_string()));
        assert_eq!(normalize_device_id("\""), None);
    }
}
