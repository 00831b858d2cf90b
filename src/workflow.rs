//! The workflow surface user code subclasses.
//!
//! A workflow's `run()` yields work items and is resumed with their
//! completions. This crate models that as an `async fn`: a yield point is
//! just `.await` on [`crate::Coordinator::join_one`] /
//! [`crate::Coordinator::join_many`], and a sub-workflow is just another
//! `Workflow` the parent `.await`s via [`crate::Coordinator::join_workflow`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::coordinator::Coordinator;
use crate::error::WorkflowError;

/// Subclass this and override `run` to compose work items imperatively.
///
/// `run` receives the coordinator so it can dispatch child items; it does
/// not receive a separate `done`/`result`/`error` triple, because those are
/// exactly what an `async fn`'s own return value already models —
/// `Ok(output)` is "done with a result", `Err(WorkflowError)` is "done
/// with an error", and there is no observable "not done" state for a type
/// that hasn't been polled yet.
#[async_trait]
pub trait Workflow: Send + Sync {
    /// What a successful run produces. `()` for workflows run purely for
    /// their side effects.
    type Output: Send;

    async fn run(&self, ctx: Arc<Coordinator>) -> Result<Self::Output, WorkflowError>;
}
