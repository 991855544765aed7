//! TMarks local store.
//!
//! Provides SQLite connection management and schema migrations for the
//! local tag/bookmark mirror, staged tab groups and the metadata table that
//! carries the offline queue.
//!
//! # Usage
//!
//! ```no_run
//! use tmarks::database::Database;
//!
//! // Open a persistent database
//! let db = Database::open("tmarks.db").expect("failed to open database");
//!
//! // Or use an in-memory database for testing
//! let db = Database::open_in_memory().expect("failed to open in-memory database");
//!
//! // Lock the connection for queries
//! let conn = db.connection();
//! ```

pub mod connection;
pub mod migrations;

pub use connection::Database;
