//! Crash-safe run-session ledger.
//!
//! Every execution attempt gets one durable JSON record under the
//! project's sessions directory, plus a single atomic pointer naming the
//! session currently considered active. The pointer is the only state a
//! fresh process needs to read to answer "is something already in
//! flight, and which record is it". A crash leaves the pointer either
//! gone (clean shutdown ran) or dangling at a record nothing updates
//! anymore; [`SessionStore::detect_orphans`] converts that into an
//! explicit, auditable `orphaned` marker.
//!
//! Records are append-only audit state: they are created and mutated in
//! place, never deleted.

pub mod model;
mod pointer;
pub mod store;

use std::path::PathBuf;

pub use model::{RunSession, SessionBudget, SessionStatus, SessionUpdate};
pub use store::SessionStore;

/// Errors from the session ledger.
///
/// Expected supervision outcomes never show up here; these are "the
/// caller asked for something the ledger cannot do" conditions. Corrupt
/// records are an error only when addressed directly by id; bulk scans
/// skip them with a warning instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("invalid run id {0:?}")]
    InvalidRunId(String),

    #[error("session record {} is unreadable: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("session store I/O failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
