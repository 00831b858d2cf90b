//! Workflow Driver (Coordinator).
//!
//! Rather than a dedicated thread multiplexing explicit resume calls across
//! every outstanding workflow with a pending-item table routing completions
//! back to the barrier awaiting them, this crate uses Rust's native async
//! model: a workflow's `.await` chain *is* its own continuation, so there is
//! no separate resume loop to write. What remains of that pending-item
//! table is kept as `Coordinator::in_flight`, purely for introspection (it
//! is never consulted to route anything — routing is the oneshot reply
//! embedded in each dispatched [`crate::worker::Envelope`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::info;

use crate::barrier::{Barrier, HasError};
use crate::config::Config;
use crate::error::WorkflowError;
use crate::fetch_worker::FetchWorker;
use crate::item::{FetchItem, ItemId, ItemKind, SubprocessItem, TimerItem};
use crate::registry::{WorkMap, WorkMapBuilder, WorkSender};
use crate::subprocess_worker::{SubprocessArgs, SubprocessWorker};
use crate::timer_worker::TimerWorker;
use crate::worker::{run_pool, run_pool_shared, Envelope};
use crate::workflow::Workflow;

/// Implemented by every concrete item type so [`Coordinator::join_one`] /
/// [`Coordinator::join_many`] can dispatch generically instead of each
/// caller hand-writing the send/await boilerplate per kind.
#[async_trait]
pub trait Dispatchable: HasError + Send + Sized + 'static {
    fn kind() -> ItemKind;
    fn set_id(&mut self, id: ItemId);

    /// Sends `self` to the channel registered for its kind and awaits the
    /// completed item. Panics if no pool is registered for the kind — a
    /// programming error treated as a fatal assertion rather than a
    /// recoverable condition.
    async fn dispatch(self, work_map: &WorkMap) -> Self;
}

#[async_trait]
impl Dispatchable for FetchItem {
    fn kind() -> ItemKind {
        ItemKind::Fetch
    }

    fn set_id(&mut self, id: ItemId) {
        self.id = id;
    }

    async fn dispatch(self, work_map: &WorkMap) -> Self {
        let sender = match work_map.get(ItemKind::Fetch) {
            WorkSender::Fetch(tx) => tx.clone(),
            _ => unreachable!("WorkMap::get returned wrong variant for ItemKind::Fetch"),
        };
        let (reply, rx) = oneshot::channel();
        sender
            .send(Envelope { item: self, reply })
            .await
            .expect("fetch worker pool closed its input channel");
        rx.await.expect("fetch worker dropped reply without answering")
    }
}

#[async_trait]
impl Dispatchable for SubprocessItem {
    fn kind() -> ItemKind {
        ItemKind::Subprocess
    }

    fn set_id(&mut self, id: ItemId) {
        self.id = id;
    }

    async fn dispatch(self, work_map: &WorkMap) -> Self {
        let sender = match work_map.get(ItemKind::Subprocess) {
            WorkSender::Subprocess(tx) => tx.clone(),
            _ => unreachable!("WorkMap::get returned wrong variant for ItemKind::Subprocess"),
        };
        let (reply, rx) = oneshot::channel();
        sender
            .send(Envelope { item: self, reply })
            .await
            .expect("subprocess worker pool closed its input channel");
        rx.await
            .expect("subprocess worker dropped reply without answering")
    }
}

#[async_trait]
impl Dispatchable for TimerItem {
    fn kind() -> ItemKind {
        ItemKind::Timer
    }

    fn set_id(&mut self, id: ItemId) {
        self.id = id;
    }

    async fn dispatch(self, work_map: &WorkMap) -> Self {
        let sender = match work_map.get(ItemKind::Timer) {
            WorkSender::Timer(tx) => tx.clone(),
            _ => unreachable!("WorkMap::get returned wrong variant for ItemKind::Timer"),
        };
        let (reply, rx) = oneshot::channel();
        sender
            .send(Envelope { item: self, reply })
            .await
            .expect("timer worker pool closed its input channel");
        rx.await.expect("timer worker dropped reply without answering")
    }
}

/// A worker pool awaiting its `start()` call, stashed here by
/// [`Coordinator::standard`] so construction (wiring the Work Map) and
/// lifecycle (spawning tasks) stay separate: `start` is what actually
/// launches every registered worker pool.
enum PendingPool {
    Fetch {
        input: crate::worker::SharedReceiver<FetchItem>,
        handler: Arc<FetchWorker>,
        task_count: usize,
    },
    Subprocess {
        input: mpsc::Receiver<Envelope<SubprocessItem>>,
        handler: Arc<SubprocessWorker>,
    },
    Timer {
        input: mpsc::Receiver<Envelope<TimerItem>>,
        handler: Arc<TimerWorker>,
    },
}

/// Handle returned by [`Coordinator::submit`], the completion sink for one
/// root workflow. Each root submission gets its own typed handle rather
/// than all root workflows multiplexing onto one untyped channel, since in
/// Rust the output type varies per [`Workflow::Output`]; see DESIGN.md for
/// the tradeoff this records against a single shared completion channel.
pub struct WorkflowHandle<T> {
    rx: oneshot::Receiver<Result<T, WorkflowError>>,
}

impl<T> WorkflowHandle<T> {
    /// Waits for the root workflow to finish, returning its result or its
    /// unhandled error — an unhandled error in a root workflow is delivered
    /// through this handle, never raised inside the driver.
    pub async fn join(self) -> Result<T, WorkflowError> {
        self.rx
            .await
            .expect("workflow task ended without reporting a result")
    }
}

/// The coordinator: owns the Work Map, starts/stops worker pools, and is
/// the `ctx` every [`Workflow::run`] dispatches child items through.
pub struct Coordinator {
    work_map: WorkMap,
    pending_pools: Mutex<Option<Vec<PendingPool>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// Tasks spawned by [`Coordinator::submit`], tracked separately from
    /// worker-pool `handles` so `stop()` can wait for every outstanding
    /// root workflow to actually finish before it tears down the pools
    /// those workflows are still dispatching into.
    workflow_handles: Mutex<Vec<JoinHandle<()>>>,
    interrupted: Arc<AtomicBool>,
    started: AtomicBool,
    stopped: AtomicBool,
    next_id: AtomicU64,
    in_flight: Mutex<HashMap<ItemId, ItemKind>>,
    config: Config,
}

impl Coordinator {
    /// Factory for the standard pool set: `fetch_worker_count` Fetch Worker
    /// tasks sharing one input channel, one Subprocess Worker, one Timer
    /// Worker. Returns a not-yet-started coordinator; call `start()` before
    /// submitting any workflow.
    pub fn standard(config: Config, subprocess_args: Arc<dyn SubprocessArgs>) -> Arc<Self> {
        let interrupted = Arc::new(AtomicBool::new(false));
        let mut builder = WorkMapBuilder::new();
        let mut pending = Vec::new();

        let (fetch_tx, fetch_rx) = mpsc::channel(config.channel_capacity);
        builder = builder.register(WorkSender::Fetch(fetch_tx));
        let fetch_worker = Arc::new(FetchWorker::new(config.fetch_frequency_hz, config.poll_interval));
        pending.push(PendingPool::Fetch {
            input: Arc::new(AsyncMutex::new(fetch_rx)),
            handler: fetch_worker,
            task_count: config.fetch_worker_count.max(1),
        });

        let (sub_tx, sub_rx) = mpsc::channel(config.channel_capacity);
        builder = builder.register(WorkSender::Subprocess(sub_tx));
        let subprocess_worker = Arc::new(SubprocessWorker::new(
            subprocess_args,
            config.poll_interval,
            Arc::clone(&interrupted),
        ));
        pending.push(PendingPool::Subprocess {
            input: sub_rx,
            handler: subprocess_worker,
        });

        let (timer_tx, timer_rx) = mpsc::channel(config.channel_capacity);
        builder = builder.register(WorkSender::Timer(timer_tx));
        let timer_worker = Arc::new(TimerWorker::new(config.poll_interval));
        pending.push(PendingPool::Timer {
            input: timer_rx,
            handler: timer_worker,
        });

        Arc::new(Self {
            work_map: builder.build(),
            pending_pools: Mutex::new(Some(pending)),
            handles: Mutex::new(Vec::new()),
            workflow_handles: Mutex::new(Vec::new()),
            interrupted,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            in_flight: Mutex::new(HashMap::new()),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Launches every registered worker pool. Not re-entrant — a second
    /// call after the first is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let pools = self
            .pending_pools
            .lock()
            .expect("pending_pools poisoned")
            .take()
            .expect("start() called after pools were already taken");

        let mut handles = self.handles.lock().expect("handles poisoned");
        let mut pool_count = 0usize;

        for pool in pools {
            match pool {
                PendingPool::Fetch {
                    input,
                    handler,
                    task_count,
                } => {
                    for _ in 0..task_count {
                        let input = Arc::clone(&input);
                        let handler = Arc::clone(&handler);
                        let interrupted = Arc::clone(&self.interrupted);
                        handles.push(tokio::spawn(run_pool_shared(input, handler, interrupted)));
                        pool_count += 1;
                    }
                }
                PendingPool::Subprocess { input, handler } => {
                    let interrupted = Arc::clone(&self.interrupted);
                    handles.push(tokio::spawn(run_pool(input, handler, interrupted)));
                    pool_count += 1;
                }
                PendingPool::Timer { input, handler } => {
                    let interrupted = Arc::clone(&self.interrupted);
                    handles.push(tokio::spawn(run_pool(input, handler, interrupted)));
                    pool_count += 1;
                }
            }
        }

        info!(workers = pool_count, "coordinator starting worker pools");
    }

    /// Waits for every root workflow submitted via [`Coordinator::submit`]
    /// to finish, then interrupts every worker pool and joins all worker
    /// tasks. Not re-entrant — a second call after the first is a no-op.
    ///
    /// Workflow tasks are drained first, deliberately: a workflow mid-flight
    /// on a child dispatch depends on the worker pool it's dispatching into
    /// still being alive to answer. Interrupting the pools first would have
    /// the pool's channel close and its tasks exit out from underneath an
    /// in-flight dispatch, which would panic rather than let the workflow
    /// observe a graceful error.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let workflow_handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.workflow_handles.lock().expect("workflow_handles poisoned"));
        for handle in workflow_handles {
            let _ = handle.await;
        }

        self.interrupted.store(true, Ordering::SeqCst);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock().expect("handles poisoned"));
        for handle in handles {
            let _ = handle.await;
        }
        info!("coordinator stopped");
    }

    fn allocate_id(&self) -> ItemId {
        ItemId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn track(&self, id: ItemId, kind: ItemKind) {
        self.in_flight
            .lock()
            .expect("in_flight poisoned")
            .insert(id, kind);
    }

    fn untrack(&self, id: ItemId) {
        self.in_flight.lock().expect("in_flight poisoned").remove(&id);
    }

    /// Count of items dispatched but not yet returned to their originator.
    /// Introspection only — nothing routes through this map (see the
    /// module doc comment).
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().expect("in_flight poisoned").len()
    }

    async fn dispatch_tracked<T: Dispatchable>(&self, mut item: T) -> T {
        let id = self.allocate_id();
        item.set_id(id);
        self.track(id, T::kind());
        let completed = item.dispatch(&self.work_map).await;
        self.untrack(id);
        completed
    }

    /// One yield point, single item. Errors in the child are re-raised at
    /// the yielding `.await` via `Err(WorkflowError::Child(..))`.
    pub async fn join_one<T: Dispatchable>(&self, item: T) -> Result<T, WorkflowError> {
        let completed = self.dispatch_tracked(item).await;
        match completed.error() {
            Some(err) => Err(WorkflowError::Child(err.clone())),
            None => Ok(completed),
        }
    }

    /// One yield point, a batch of items. Preserves yield order on the
    /// returned `Vec` regardless of completion order, and implements
    /// first-error-wins via [`Barrier::join`].
    pub async fn join_many<T>(self: &Arc<Self>, items: Vec<T>) -> Result<Vec<T>, WorkflowError>
    where
        T: Dispatchable + Send + 'static,
    {
        let coordinator = Arc::clone(self);
        Barrier::join(items, move |item| {
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.dispatch_tracked(item).await }
        })
        .await
        .map_err(WorkflowError::Child)
    }

    /// Runs a sub-workflow to completion. Sub-workflow transparency needs
    /// no re-enqueue step here: the parent's `.await` on this call *is*
    /// the continuation a re-enqueued completion would otherwise have
    /// resumed.
    pub async fn join_workflow<W>(self: &Arc<Self>, workflow: W) -> Result<W::Output, WorkflowError>
    where
        W: Workflow,
    {
        workflow.run(Arc::clone(self)).await
    }

    /// A parallel batch of sub-workflows, joined with first-error-wins
    /// semantics mirroring [`Barrier::join`] but operating on
    /// `Result<Output, WorkflowError>` instead of [`HasError`] items (a
    /// workflow's own `Result` already models its error slot).
    pub async fn join_many_workflows<W>(
        self: &Arc<Self>,
        workflows: Vec<W>,
    ) -> Result<Vec<W::Output>, WorkflowError>
    where
        W: Workflow + Send + 'static,
        W::Output: Send + 'static,
    {
        let total = workflows.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut in_flight = FuturesUnordered::new();
        for (index, workflow) in workflows.into_iter().enumerate() {
            let coordinator = Arc::clone(self);
            in_flight.push(async move { (index, workflow.run(coordinator).await) });
        }

        let mut results: Vec<Option<W::Output>> = (0..total).map(|_| None).collect();
        let mut first_error: Option<WorkflowError> = None;

        while let Some((index, completed)) = in_flight.next().await {
            match completed {
                Ok(value) => results[index] = Some(value),
                Err(err) => {
                    first_error.get_or_insert(err);
                    tokio::spawn(async move { while in_flight.next().await.is_some() {} });
                    break;
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(results.into_iter().map(|slot| slot.expect("filled")).collect()),
        }
    }

    /// Submits a root workflow. The returned handle resolves when the
    /// workflow finishes, successfully or not — a root workflow's error is
    /// returned from `join()`, never panics the coordinator. The spawned
    /// task is tracked in `workflow_handles` so `stop()` can wait for it
    /// before tearing down the worker pools it dispatches into.
    pub fn submit<W>(self: &Arc<Self>, workflow: W) -> WorkflowHandle<W::Output>
    where
        W: Workflow + Send + 'static,
        W::Output: Send + 'static,
    {
        let coordinator = Arc::clone(self);
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let result = workflow.run(coordinator).await;
            let _ = tx.send(result);
        });
        self.workflow_handles
            .lock()
            .expect("workflow_handles poisoned")
            .push(handle);
        WorkflowHandle { rx }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::subprocess_worker::SubprocessArgs;

    struct NoArgs;
    impl SubprocessArgs for NoArgs {
        fn args(&self, _item: &SubprocessItem) -> Vec<String> {
            Vec::new()
        }
    }

    fn test_coordinator() -> Arc<Coordinator> {
        let coordinator = Coordinator::standard(Config::base_default(), Arc::new(NoArgs));
        coordinator.start();
        coordinator
    }

    struct TimerWorkflow {
        delay: Duration,
    }

    #[async_trait]
    impl Workflow for TimerWorkflow {
        type Output = ();

        async fn run(&self, ctx: Arc<Coordinator>) -> Result<(), WorkflowError> {
            ctx.join_one(TimerItem::after(self.delay)).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn single_yield_resumes_after_deadline() {
        let coordinator = test_coordinator();
        let before = std::time::Instant::now();
        let handle = coordinator.submit(TimerWorkflow {
            delay: Duration::from_millis(100),
        });
        handle.join().await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(100));
        coordinator.stop().await;
    }

    struct BatchWorkflow;

    #[async_trait]
    impl Workflow for BatchWorkflow {
        type Output = Vec<Duration>;

        async fn run(&self, ctx: Arc<Coordinator>) -> Result<Vec<Duration>, WorkflowError> {
            let items = vec![
                TimerItem::after(Duration::from_millis(30)),
                TimerItem::after(Duration::from_millis(10)),
                TimerItem::after(Duration::from_millis(20)),
            ];
            let completed = ctx.join_many(items).await?;
            Ok(completed.into_iter().map(|i| i.ready_time.elapsed()).collect())
        }
    }

    #[tokio::test]
    async fn batch_yield_preserves_order_regardless_of_completion_order() {
        let coordinator = test_coordinator();
        let handle = coordinator.submit(BatchWorkflow);
        let elapsed = handle.join().await.unwrap();
        assert_eq!(elapsed.len(), 3);
        coordinator.stop().await;
    }

    #[tokio::test]
    async fn root_workflow_error_is_delivered_not_panicked() {
        let coordinator = test_coordinator();
        let mut unroutable = FetchItem::new("http://127.0.0.1:1");
        unroutable.timeout = Duration::from_millis(200);

        struct FailingFetch(FetchItem);

        #[async_trait]
        impl Workflow for FailingFetch {
            type Output = ();

            async fn run(&self, ctx: Arc<Coordinator>) -> Result<(), WorkflowError> {
                ctx.join_one(self.0.clone()).await?;
                Ok(())
            }
        }

        let handle = coordinator.submit(FailingFetch(unroutable));
        let result = handle.join().await;
        assert!(result.is_err());
        coordinator.stop().await;
    }

    struct ParentRecoversWorkflow;

    #[async_trait]
    impl Workflow for ParentRecoversWorkflow {
        type Output = &'static str;

        async fn run(&self, ctx: Arc<Coordinator>) -> Result<&'static str, WorkflowError> {
            let mut child = FetchItem::new("http://127.0.0.1:1");
            child.timeout = Duration::from_millis(200);
            match ctx.join_one(child).await {
                Ok(_) => Ok("unexpected success"),
                Err(_) => Ok("recovered"),
            }
        }
    }

    #[tokio::test]
    async fn parent_can_recover_from_child_error() {
        let coordinator = test_coordinator();
        let handle = coordinator.submit(ParentRecoversWorkflow);
        let result = handle.join().await.unwrap();
        assert_eq!(result, "recovered");
        coordinator.stop().await;
    }

    #[tokio::test]
    async fn stop_and_start_are_not_reentrant() {
        let coordinator = test_coordinator();
        coordinator.start(); // no-op, already started
        coordinator.stop().await;
        coordinator.stop().await; // no-op, already stopped
    }
}
