//! workyard - a concurrent work-item coordinator.
//!
//! Drives a directed acyclic graph of asynchronous operations (HTTP
//! fetches, subprocesses, timed delays) while letting higher-level
//! workflows compose those primitives imperatively and fan out work in
//! parallel with join-on-all semantics. `README`-equivalent usage lives in
//! `src/main.rs` (the `yard` demo CLI).

pub mod barrier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetch_worker;
pub mod item;
pub mod registry;
pub mod subprocess_worker;
pub mod timer_worker;
pub mod worker;
pub mod workflow;

pub use barrier::{Barrier, HasError, Yielded};
pub use config::Config;
pub use coordinator::{Coordinator, Dispatchable, WorkflowHandle};
pub use error::{WorkError, WorkflowError};
pub use fetch_worker::FetchWorker;
pub use item::{FetchItem, ItemId, ItemKind, SubprocessItem, TimerItem};
pub use registry::{WorkMap, WorkMapBuilder, WorkSender};
pub use subprocess_worker::{SubprocessArgs, SubprocessWorker};
pub use timer_worker::TimerWorker;
pub use worker::{Envelope, ItemHandler};
pub use workflow::Workflow;
