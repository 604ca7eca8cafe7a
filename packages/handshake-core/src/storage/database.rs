//! # Database
//!
//! SQLite wrapper providing the atomic read/write/query capability the
//! directory, ledger and visibility components are built on.
//!
//! ```text
//! ┌─────────────────┐
//! │  UserDirectory  │──┐
//! ├─────────────────┤  │
//! │  RequestLedger  │──┼──►  Database (this file)  ──►  rusqlite  ──►  SQLite
//! ├─────────────────┤  │     one statement per op       (file or memory)
//! │ VisibilityRes.  │──┘     except resolve_request
//! └─────────────────┘
//! ```
//!
//! Every method takes the connection lock for exactly one statement, except
//! [`Database::resolve_request`] which runs a conditional update and an
//! existence probe inside a single immediate transaction.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;

use super::schema;
use crate::error::{Error, Result};

/// How long a writer waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A stored user row.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: String,
    /// Raw JSON contact document
    pub contact_details: String,
    pub created: i64,
}

/// A row projected for discovery listings.
#[derive(Debug, Clone)]
pub struct ContactSummaryRecord {
    pub user_id: String,
    pub image: Option<String>,
    pub first_name: Option<String>,
}

/// A stored location sample.
#[derive(Debug, Clone)]
pub struct LocationRecord {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created: i64,
}

/// A stored contact request.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub created: i64,
    /// `None` while pending
    pub allowed: Option<bool>,
}

/// A pending request joined with its sender's summary.
#[derive(Debug, Clone)]
pub struct PendingRequestRecord {
    pub request_id: String,
    pub from: String,
    pub image: Option<String>,
    pub first_name: Option<String>,
    pub created: i64,
}

/// Result of the conditional resolve update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The request was pending and now carries the new value.
    Resolved {
        /// Sender of the request
        from: String,
    },
    /// The request had already been resolved; nothing was written.
    AlreadyResolved {
        /// The value stored by the first resolution
        allowed: bool,
    },
    /// No request with that ID exists.
    Missing,
}

/// Row counts, for the stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub users: i64,
    pub locations: i64,
    pub pending_requests: i64,
    pub granted_requests: i64,
    pub denied_requests: i64,
}

/// Database configuration
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Path to the database file (None for in-memory)
    pub path: Option<String>,
}

/// The main database handle
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct Database {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open a database from a [`DatabaseConfig`].
    pub fn open_with_config(config: &DatabaseConfig) -> Result<Self> {
        Self::open(config.path.as_deref())
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::DatabaseError(format!(
                    "Database schema version {} is newer than supported version {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }

    // ========================================================================
    // USER OPERATIONS
    // ========================================================================

    /// Insert a new user. Fails with [`Error::UserExists`] on a duplicate ID.
    pub fn insert_user(&self, user_id: &str, contact_details: &str, created: i64) -> Result<()> {
        let conn = self.conn.lock();

        let result = conn.execute(
            "INSERT INTO users (user_id, contact_details, created) VALUES (?, ?, ?)",
            params![user_id, contact_details, created],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::UserExists(user_id.to_string())),
            Err(e) => Err(Error::DatabaseError(format!("Failed to insert user: {}", e))),
        }
    }

    /// Get a user by ID
    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT user_id, contact_details, created FROM users WHERE user_id = ?",
            params![user_id],
            |row| {
                Ok(UserRecord {
                    user_id: row.get(0)?,
                    contact_details: row.get(1)?,
                    created: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::DatabaseError(format!("Failed to get user: {}", e)))
    }

    /// Check whether a user ID is registered
    pub fn user_exists(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE user_id = ?",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to check user: {}", e)))?;

        Ok(count > 0)
    }

    /// Every user except `user_id` and the users `user_id` holds a granted
    /// request to. Pending and denied requests do not exclude anyone.
    pub fn list_discoverable(&self, user_id: &str) -> Result<Vec<ContactSummaryRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT user_id,
                        json_extract(contact_details, '$.image'),
                        json_extract(contact_details, '$.first_name')
                 FROM users
                 WHERE user_id != ?1
                   AND user_id NOT IN (
                       SELECT \"to\" FROM requests WHERE \"from\" = ?1 AND allowed = 1
                   )
                 ORDER BY created, user_id",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(ContactSummaryRecord {
                    user_id: row.get(0)?,
                    image: row.get(1)?,
                    first_name: row.get(2)?,
                })
            })
            .map_err(|e| Error::DatabaseError(format!("Failed to query users: {}", e)))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row.map_err(|e| Error::DatabaseError(format!("Failed to read user: {}", e)))?);
        }

        Ok(users)
    }

    // ========================================================================
    // LOCATION OPERATIONS
    // ========================================================================

    /// Append a location sample. Fails with [`Error::UserNotFound`] if the
    /// user does not exist.
    pub fn insert_location(&self, location: &LocationRecord) -> Result<()> {
        let conn = self.conn.lock();

        let result = conn.execute(
            "INSERT INTO locations (latitude, longitude, created, user_id_users) VALUES (?, ?, ?, ?)",
            params![
                location.latitude,
                location.longitude,
                location.created,
                location.user_id,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => {
                Err(Error::UserNotFound(location.user_id.clone()))
            }
            Err(e) => Err(Error::DatabaseError(format!("Failed to insert location: {}", e))),
        }
    }

    /// Get a user's location samples, oldest first
    pub fn get_locations(&self, user_id: &str) -> Result<Vec<LocationRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT user_id_users, latitude, longitude, created
                 FROM locations WHERE user_id_users = ?
                 ORDER BY created, id",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(LocationRecord {
                    user_id: row.get(0)?,
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                    created: row.get(3)?,
                })
            })
            .map_err(|e| Error::DatabaseError(format!("Failed to query locations: {}", e)))?;

        let mut locations = Vec::new();
        for row in rows {
            locations.push(
                row.map_err(|e| Error::DatabaseError(format!("Failed to read location: {}", e)))?,
            );
        }

        Ok(locations)
    }

    // ========================================================================
    // REQUEST OPERATIONS
    // ========================================================================

    /// Store a new request
    pub fn insert_request(&self, request: &RequestRecord) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO requests (id, \"from\", \"to\", created, allowed) VALUES (?, ?, ?, ?, ?)",
            params![
                request.id,
                request.from,
                request.to,
                request.created,
                request.allowed,
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to store request: {}", e)))?;

        Ok(())
    }

    /// Get a request by ID
    pub fn get_request(&self, id: &str) -> Result<Option<RequestRecord>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT id, \"from\", \"to\", created, allowed FROM requests WHERE id = ?",
            params![id],
            |row| {
                Ok(RequestRecord {
                    id: row.get(0)?,
                    from: row.get(1)?,
                    to: row.get(2)?,
                    created: row.get(3)?,
                    allowed: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::DatabaseError(format!("Failed to get request: {}", e)))
    }

    /// Set `allowed` on a pending request.
    ///
    /// The update only matches rows whose `allowed` is still NULL, so two
    /// concurrent resolutions of the same request cannot both succeed.
    pub fn resolve_request(&self, id: &str, allowed: bool) -> Result<ResolveOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        let from: Option<String> = tx
            .query_row(
                "UPDATE requests SET allowed = ?1 WHERE id = ?2 AND allowed IS NULL RETURNING \"from\"",
                params![allowed, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::DatabaseError(format!("Failed to update request: {}", e)))?;

        let outcome = match from {
            Some(from) => ResolveOutcome::Resolved { from },
            None => {
                let existing: Option<Option<bool>> = tx
                    .query_row(
                        "SELECT allowed FROM requests WHERE id = ?",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|e| Error::DatabaseError(format!("Failed to read request: {}", e)))?;

                match existing {
                    Some(Some(allowed)) => ResolveOutcome::AlreadyResolved { allowed },
                    _ => ResolveOutcome::Missing,
                }
            }
        };

        tx.commit()
            .map_err(|e| Error::DatabaseError(format!("Failed to commit resolve: {}", e)))?;

        Ok(outcome)
    }

    /// Pending requests addressed to `user_id`, joined with the sender's
    /// contact summary, oldest first
    pub fn pending_incoming(&self, user_id: &str) -> Result<Vec<PendingRequestRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT requests.id,
                        requests.\"from\",
                        json_extract(users.contact_details, '$.image'),
                        json_extract(users.contact_details, '$.first_name'),
                        requests.created
                 FROM users
                 INNER JOIN requests ON requests.\"from\" = users.user_id
                 WHERE requests.\"to\" = ? AND requests.allowed IS NULL
                 ORDER BY requests.created, requests.rowid",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(PendingRequestRecord {
                    request_id: row.get(0)?,
                    from: row.get(1)?,
                    image: row.get(2)?,
                    first_name: row.get(3)?,
                    created: row.get(4)?,
                })
            })
            .map_err(|e| Error::DatabaseError(format!("Failed to query requests: {}", e)))?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(
                row.map_err(|e| Error::DatabaseError(format!("Failed to read request: {}", e)))?,
            );
        }

        Ok(requests)
    }

    /// Raw contact documents of every user `user_id` holds a granted request
    /// to, ordered by last name then first name (missing names first)
    pub fn granted_contacts(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT contact_details FROM users
                 WHERE user_id IN (
                     SELECT \"to\" FROM requests WHERE allowed = 1 AND \"from\" = ?
                 )
                 ORDER BY json_extract(contact_details, '$.last_name'),
                          json_extract(contact_details, '$.first_name'),
                          user_id",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))
            .map_err(|e| Error::DatabaseError(format!("Failed to query contacts: {}", e)))?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(
                row.map_err(|e| Error::DatabaseError(format!("Failed to read contact: {}", e)))?,
            );
        }

        Ok(contacts)
    }

    // ========================================================================
    // STATS
    // ========================================================================

    /// Row counts across all tables
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM locations),
                (SELECT COUNT(*) FROM requests WHERE allowed IS NULL),
                (SELECT COUNT(*) FROM requests WHERE allowed = 1),
                (SELECT COUNT(*) FROM requests WHERE allowed = 0)",
            [],
            |row| {
                Ok(StoreStats {
                    users: row.get(0)?,
                    locations: row.get(1)?,
                    pending_requests: row.get(2)?,
                    granted_requests: row.get(3)?,
                    denied_requests: row.get(4)?,
                })
            },
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to read stats: {}", e)))
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
