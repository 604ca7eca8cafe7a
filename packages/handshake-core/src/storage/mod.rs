//! # Storage Module
//!
//! The persistent store is the only shared state in the service and the
//! sole arbiter of concurrent writes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SQLite Database                                                │   │
//! │  │  ───────────────                                                │   │
//! │  │                                                                 │   │
//! │  │  Tables:                                                        │   │
//! │  │  • users     - user_id + opaque contact document                │   │
//! │  │  • locations - append-only position samples                     │   │
//! │  │  • requests  - contact requests and their approval state        │   │
//! │  │                                                                 │   │
//! │  │  File-backed in production, in-memory for tests.                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A [`Database`] handle is created once at startup and passed to every
//! component that needs it. There is no global connection.

mod database;
mod schema;

pub use database::{
    ContactSummaryRecord, Database, DatabaseConfig, LocationRecord, PendingRequestRecord,
    RequestRecord, ResolveOutcome, StoreStats, UserRecord,
};
pub use schema::SCHEMA_VERSION;
