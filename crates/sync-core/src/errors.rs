//! The distinguished error taxonomy from spec §7, realized as a single
//! exhaustive enum so every boundary can match on it rather than string-match
//! (spec §9, "Exceptions -> tagged errors").

use crate::ids::{DriveId, SyncPath};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// `.nosync` present at the sync root; abort the entire cycle.
    #[error("sync root guard tripped: .nosync present at {root}")]
    NosyncGuard { root: String },

    /// Remote delta token rejected by the server; handled internally by the
    /// remote observer via an immediate full resync, but surfaced as a
    /// variant so callers observing `FullDelta` directly can react too.
    #[error("delta token expired for drive {drive_id}")]
    DeltaExpired { drive_id: DriveId },

    /// The planner refused to emit a plan that would violate the S5
    /// big-delete guard.
    #[error(
        "big-delete guard tripped: {delete_count} deletes against a baseline of {baseline_size} \
         (max_count={max_count}, max_percent={max_percent})"
    )]
    BigDeleteTriggered {
        delete_count: usize,
        baseline_size: usize,
        max_count: usize,
        max_percent: f64,
    },

    /// Cooperative cancellation observed at a suspension point.
    #[error("operation canceled")]
    ContextCanceled,

    /// Network/5xx-class error; the remote observer backs off and retries.
    #[error("transient fetch error: {message}")]
    TransientFetchError { message: String },

    /// A single item failed (missing, forbidden) without invalidating the
    /// rest of the cycle.
    #[error("permanent item error at {path}: {message}")]
    PermanentItemError { path: String, message: String },

    /// An internal invariant was violated (e.g. an entry present in `ByPath`
    /// but absent from `ByID`). Always a bug; never expected in normal
    /// operation.
    #[error("invariant violated: {message}")]
    InvariantViolated { message: String },

    /// Programming error: `FlushDebounced` invoked twice on the same
    /// buffer (spec §4.1).
    #[error("FlushDebounced already running for this buffer")]
    DebouncedFlusherAlreadyRunning,

    /// A name failed `isValidOneDriveName` or one of the always-excluded
    /// patterns (spec §4.2). Carried separately from `PermanentItemError`
    /// since it is expected, not exceptional, and callers may want to
    /// distinguish "skipped because invalid" from "skipped because I/O
    /// failed".
    #[error("rejected name at {path}: {reason}")]
    InvalidName { path: String, reason: String },

    /// Baseline-store persistence failure, wrapping the underlying SQLite
    /// error. Kept as a transparent variant so `?` works from `rusqlite`
    /// call sites without losing the distinguished-kind property at outer
    /// boundaries.
    #[error("baseline store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// `ResolveConflict` targeted a conflict whose resolution is no longer
    /// `Unresolved`.
    #[error("conflict {id} is already resolved")]
    ConflictAlreadyResolved { id: String },

    /// Fallback for I/O failures not otherwise classified above.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    pub fn io(path: &SyncPath, source: io::Error) -> Self {
        Self::Io {
            path: path.as_str().to_string(),
            source,
        }
    }

    pub fn permanent_item(path: &SyncPath, message: impl Into<String>) -> Self {
        Self::PermanentItemError {
            path: path.as_str().to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_name(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// `true` for classes of error a caller should treat as "retry later",
    /// matching the teacher's retry-vs-fatal split in spirit (`categorize_io_error`)
    /// but against the spec's own distinguished kinds rather than raw `io::ErrorKind`.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::TransientFetchError { .. } | SyncError::DeltaExpired { .. }
        )
    }
}

/// Classify a raw I/O error as transient (worth a backoff retry) vs. a
/// permanent, single-item failure that should be logged and skipped.
/// Mirrors the retry/fatal split used throughout the ambient stack, applied
/// here to the specific distinction the spec draws in §7.
pub fn is_transient_io_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::WouldBlock
    )
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "timeout");
        assert!(is_transient_io_error(&timeout));
        let perm = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(!is_transient_io_error(&perm));
    }

    #[test]
    fn big_delete_error_renders_numbers() {
        let e = SyncError::BigDeleteTriggered {
            delete_count: 15,
            baseline_size: 20,
            max_count: 1000,
            max_percent: 50.0,
        };
        let msg = e.to_string();
        assert!(msg.contains("15"));
        assert!(msg.contains("20"));
    }

    #[test]
    fn is_transient_matches_spec_kinds() {
        assert!(SyncError::TransientFetchError {
            message: "x".into()
        }
        .is_transient());
        assert!(!SyncError::ContextCanceled.is_transient());
    }
}
