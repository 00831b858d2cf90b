//! Error types for the work-dispatch fabric and the workflow driver.
//!
//! `WorkError` is the error slot carried by leaf work items (fetch,
//! subprocess, timer). `WorkflowError` is what a workflow's `run()` returns
//! on failure — either a child item's error bubbled up through a barrier,
//! or an arbitrary error raised by the workflow body itself.

use std::time::Duration;

use thiserror::Error;

use crate::item::{ItemId, ItemKind};

/// Error captured on a single work item's error slot.
///
/// Set at most once, by the worker that handled the item (or, for a
/// dispatch-routing bug, by the coordinator itself).
#[derive(Debug, Clone, Error)]
pub enum WorkError {
    /// Connect-level fetch failure (DNS, connect refused, reset, TLS).
    ///
    /// Surfaced on the item's error slot rather than swallowed.
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// Subprocess exceeded its timeout (or the worker was interrupted) and
    /// was force-killed.
    #[error("subprocess timed out: item={item_id:?} pid={pid} run_time={run_time:?}")]
    Timeout {
        item_id: ItemId,
        pid: u32,
        run_time: Duration,
    },

    /// Local I/O failure unrelated to the network (log file, process spawn).
    #[error("i/o error: {0}")]
    Io(String),

    /// No worker pool registered for this item kind. A programming error;
    /// callers that hit this should treat it as a fatal assertion rather
    /// than a recoverable condition.
    #[error("no worker registered for item kind {0:?}")]
    Dispatch(ItemKind),
}

/// Error returned by a workflow's `run()`.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// First error encountered among the children of one yield point.
    #[error("child item failed: {0}")]
    Child(#[from] WorkError),

    /// An error raised by the workflow body itself, or re-raised from a
    /// sub-workflow it awaited without recovering from.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
