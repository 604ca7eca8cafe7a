//! # Error Handling
//!
//! Error types for Handshake Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Validation (100-199)   - surfaced, aborts the operation           │
//! │  │   ├── InvalidUserId         - empty / oversized user ID             │
//! │  │   ├── InvalidContactDocument - payload is not a usable document     │
//! │  │   ├── InvalidLocation       - coordinates out of range              │
//! │  │   ├── CannotRequestSelf     - from == to                            │
//! │  │   └── InvalidPayload        - body is not the expected shape        │
//! │  │                                                                      │
//! │  ├── Conflict (200-299)     - surfaced                                 │
//! │  │   ├── UserExists            - duplicate signup                      │
//! │  │   └── RequestAlreadyResolved - second ResolveRequest                │
//! │  │                                                                      │
//! │  ├── NotFound (300-399)     - surfaced                                 │
//! │  │   ├── UserNotFound                                                  │
//! │  │   ├── RequestNotFound                                               │
//! │  │   └── DeviceNotRegistered   - user has no usable device_id          │
//! │  │                                                                      │
//! │  ├── Store (400-499)        - surfaced, aborts the operation           │
//! │  │   ├── DatabaseError                                                 │
//! │  │   └── SerializationError                                            │
//! │  │                                                                      │
//! │  └── Dispatch (500-599)     - contained, logged only                   │
//! │      └── DispatchFailed                                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `DispatchFailed` never leaves the notification worker; it exists so that
//! push sinks have a typed error to report.

use thiserror::Error;

/// Result type alias for Handshake Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Handshake Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation Errors (100-199)
    // ========================================================================

    /// User ID is empty or too long
    #[error("Invalid user ID: {0}")]
    InvalidUserId(String),

    /// Contact document is malformed
    #[error("Invalid contact document: {0}")]
    InvalidContactDocument(String),

    /// Latitude/longitude outside the valid range
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// A user tried to request their own contact details
    #[error("Cannot request your own contact details.")]
    CannotRequestSelf,

    /// Request body could not be parsed
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // ========================================================================
    // Conflict Errors (200-299)
    // ========================================================================

    /// A user with this ID already signed up
    #[error("User already exists: {0}")]
    UserExists(String),

    /// The request was already granted or denied
    #[error("Request {0} has already been resolved.")]
    RequestAlreadyResolved(String),

    // ========================================================================
    // Not Found Errors (300-399)
    // ========================================================================

    /// Unknown user ID
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Unknown request ID
    #[error("Request not found: {0}")]
    RequestNotFound(String),

    /// The user's contact document carries no device ID
    #[error("No device registered for user: {0}")]
    DeviceNotRegistered(String),

    // ========================================================================
    // Store Errors (400-499)
    // ========================================================================

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Stored data could not be encoded or decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ========================================================================
    // Dispatch Errors (500-599)
    // ========================================================================

    /// A push notification could not be delivered
    #[error("Failed to dispatch notification: {0}")]
    DispatchFailed(String),
}

/// Coarse error classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input
    Validation,
    /// Duplicate user or already-resolved request
    Conflict,
    /// Unknown user or request
    NotFound,
    /// Persistence failure
    Store,
    /// Notification failure (never surfaced by core operations)
    Dispatch,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUserId(_)
            | Error::InvalidContactDocument(_)
            | Error::InvalidLocation(_)
            | Error::CannotRequestSelf
            | Error::InvalidPayload(_) => ErrorKind::Validation,

            Error::UserExists(_) | Error::RequestAlreadyResolved(_) => ErrorKind::Conflict,

            Error::UserNotFound(_)
            | Error::RequestNotFound(_)
            | Error::DeviceNotRegistered(_) => ErrorKind::NotFound,

            Error::DatabaseError(_) | Error::SerializationError(_) => ErrorKind::Store,

            Error::DispatchFailed(_) => ErrorKind::Dispatch,
        }
    }

    /// Numeric error code, stable across releases.
    ///
    /// - 100-199: Validation
    /// - 200-299: Conflict
    /// - 300-399: Not found
    /// - 400-499: Store
    /// - 500-599: Dispatch
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidUserId(_) => 100,
            Error::InvalidContactDocument(_) => 101,
            Error::InvalidLocation(_) => 102,
            Error::CannotRequestSelf => 103,
            Error::InvalidPayload(_) => 104,

            Error::UserExists(_) => 200,
            Error::RequestAlreadyResolved(_) => 201,

            Error::UserNotFound(_) => 300,
            Error::RequestNotFound(_) => 301,
            Error::DeviceNotRegistered(_) => 302,

            Error::DatabaseError(_) => 400,
            Error::SerializationError(_) => 401,

            Error::DispatchFailed(_) => 500,
        }
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
