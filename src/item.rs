//! Work items: the universal unit the dispatch fabric routes around.
//!
//! Each concrete item (`FetchItem`, `SubprocessItem`, `TimerItem`) carries
//! inputs, result fields, and an error slot. Which worker pool handles an
//! item is decided by its `ItemKind`, not by matching on a runtime type.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;

use crate::error::WorkError;

/// Identity assigned to a dispatched item, used to track it while it's
/// in flight.
///
/// An explicit, monotonically increasing id stands in for object identity.
/// Assigned by the coordinator at dispatch time (`Coordinator::dispatch_tracked`),
/// not at construction — an item built with `FetchItem::new` carries
/// `ItemId::UNASSIGNED` until it is actually sent to a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub(crate) u64);

impl ItemId {
    pub const UNASSIGNED: ItemId = ItemId(0);
}

impl Default for ItemId {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// The kind of a work item, used to route it to the worker pool registered
/// for that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Fetch,
    Subprocess,
    Timer,
}

/// Work item handled by making an HTTP request.
#[derive(Debug, Clone)]
pub struct FetchItem {
    pub id: ItemId,
    pub url: String,
    pub form: Option<HashMap<String, String>>,
    pub timeout: Duration,
    pub status_code: Option<u16>,
    pub data: Option<Vec<u8>>,
    pub headers: Option<HeaderMap>,
    pub error: Option<WorkError>,
}

impl FetchItem {
    /// Default timeout for a fetch item.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: ItemId::UNASSIGNED,
            url: url.into(),
            form: None,
            timeout: Self::DEFAULT_TIMEOUT,
            status_code: None,
            data: None,
            headers: None,
            error: None,
        }
    }

    pub fn with_form(mut self, form: HashMap<String, String>) -> Self {
        self.form = Some(form);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// De-JSONed response body, or `None` if the response wasn't
    /// `application/json` or hasn't completed yet.
    pub fn json(&self) -> Option<serde_json::Value> {
        let is_json = self
            .headers
            .as_ref()
            .and_then(|h| h.get(reqwest::header::CONTENT_TYPE))
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);
        if !is_json {
            return None;
        }
        self.data
            .as_ref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }
}

/// Work item handled by running an external subprocess.
///
/// The argument vector is *not* a field here — it's supplied by a
/// `SubprocessArgs` hook the subprocess worker pool is built with, not by
/// the item itself.
#[derive(Debug, Clone)]
pub struct SubprocessItem {
    pub id: ItemId,
    pub log_path: PathBuf,
    pub timeout: Duration,
    /// Process exit code. `return_code` is the sole spelling used anywhere
    /// in this crate.
    pub return_code: Option<i32>,
    pub error: Option<WorkError>,
}

impl SubprocessItem {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            id: ItemId::UNASSIGNED,
            log_path: log_path.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            return_code: None,
            error: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Work item for waiting until a deadline passes.
#[derive(Debug, Clone)]
pub struct TimerItem {
    pub id: ItemId,
    pub ready_time: Instant,
    pub error: Option<WorkError>,
}

impl TimerItem {
    pub fn after(delay: Duration) -> Self {
        Self {
            id: ItemId::UNASSIGNED,
            ready_time: Instant::now() + delay,
            error: None,
        }
    }
}

impl crate::barrier::HasError for FetchItem {
    fn error(&self) -> Option<&WorkError> {
        self.error.as_ref()
    }
}

impl crate::barrier::HasError for SubprocessItem {
    fn error(&self) -> Option<&WorkError> {
        self.error.as_ref()
    }
}

impl crate::barrier::HasError for TimerItem {
    fn error(&self) -> Option<&WorkError> {
        self.error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_item_json_requires_content_type() {
        let mut item = FetchItem::new("http://localhost/ok");
        item.data = Some(br#"{"a":1}"#.to_vec());
        assert!(item.json().is_none());

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "application/json".parse().unwrap(),
        );
        item.headers = Some(headers);
        assert_eq!(item.json().unwrap()["a"], 1);
    }
}
