//! # Database Schema
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           DATABASE SCHEMA                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐      ┌─────────────────┐    │
//! │  │     users       │    │    locations    │      │    requests     │    │
//! │  ├─────────────────┤    ├─────────────────┤      ├─────────────────┤    │
//! │  │ user_id  (PK)   │◄───│ user_id_users   │      │ id       (PK)   │    │
//! │  │ contact_details │    │ latitude        │      │ "from"          │    │
//! │  │ created         │    │ longitude       │      │ "to"            │    │
//! │  └─────────────────┘    │ created         │      │ created         │    │
//! │          ▲              └─────────────────┘      │ allowed (NULL)  │    │
//! │          │                                       └────────┬────────┘    │
//! │          └──────────── weak reference by ID ──────────────┘             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `requests."from"` and `requests."to"` are deliberately not foreign keys:
//! the ledger validates identities itself and requests are never cascaded.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Users table
-- One row per signup; the contact document is stored whole as JSON
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    -- Opaque contact document (first_name, image, device_id, ...)
    contact_details TEXT NOT NULL,
    -- When the user signed up (Unix timestamp ms)
    created INTEGER NOT NULL
);

-- Locations table
-- Append-only log of position samples
CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    -- When the sample was recorded (Unix timestamp ms)
    created INTEGER NOT NULL,
    user_id_users TEXT NOT NULL REFERENCES users(user_id)
);
CREATE INDEX IF NOT EXISTS idx_locations_user ON locations(user_id_users, created);

-- Requests table
-- Contact requests; allowed is NULL while pending, then 1 (granted) or 0 (denied)
CREATE TABLE IF NOT EXISTS requests (
    id TEXT PRIMARY KEY,
    "from" TEXT NOT NULL,
    "to" TEXT NOT NULL,
    -- When the request was created (Unix timestamp ms)
    created INTEGER NOT NULL,
    allowed INTEGER CHECK (allowed IS NULL OR allowed IN (0, 1))
);
CREATE INDEX IF NOT EXISTS idx_requests_to ON requests("to", allowed);
CREATE INDEX IF NOT EXISTS idx_requests_from ON requests("from", allowed);
"#;
