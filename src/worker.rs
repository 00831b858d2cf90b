//! The abstract worker contract.
//!
//! Rather than a base class to subclass, the Rust translation is a small
//! trait (`ItemHandler`) plus one generic loop (`run_pool`) that drives any
//! handler — the Fetch, Subprocess, and Timer workers are all just
//! `ItemHandler` implementations plugged into the same loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

/// One dispatched item paired with the reply channel its originator is
/// waiting on. This is the Rust-native stand-in for "return the item to
/// the coordinator's input channel" — the originator *is* whoever holds
/// `reply`'s matching receiver.
pub struct Envelope<T> {
    pub item: T,
    pub reply: oneshot::Sender<T>,
}

/// Contract a worker pool implements: consume one item at a time, and
/// react to an idle input channel via `handle_nothing`.
#[async_trait]
pub trait ItemHandler<T: Send + 'static>: Send + Sync {
    /// Process a single item and resolve its reply. Implementations are
    /// responsible for calling `envelope.reply.send(item)` themselves
    /// (the Timer worker, uniquely, defers this until the item's deadline
    /// passes rather than resolving it immediately).
    async fn handle(&self, envelope: Envelope<T>);

    /// Runs whenever the input channel yields no work within one poll
    /// interval. Default no-op; the Timer worker overrides this to release
    /// due timers.
    async fn handle_nothing(&self) {}

    /// How long to wait for the next input item before calling
    /// `handle_nothing`. Most workers return a fixed configured interval;
    /// the Timer worker adapts this to the next deadline.
    fn poll_interval(&self) -> Duration;
}

/// Drives an `ItemHandler` against its input channel until `interrupted`
/// is set or the channel is closed. Interruption is checked at the top of
/// each iteration, giving the cooperative-cancellation contract every pool
/// shares.
pub async fn run_pool<T, H>(
    mut input: mpsc::Receiver<Envelope<T>>,
    handler: Arc<H>,
    interrupted: Arc<AtomicBool>,
) where
    T: Send + 'static,
    H: ItemHandler<T> + 'static,
{
    loop {
        if interrupted.load(Ordering::Relaxed) {
            break;
        }

        match tokio::time::timeout(handler.poll_interval(), input.recv()).await {
            Ok(Some(envelope)) => handler.handle(envelope).await,
            Ok(None) => break,
            Err(_elapsed) => handler.handle_nothing().await,
        }
    }
}

/// A single channel's receiving end, shared by several worker tasks.
///
/// `tokio::sync::mpsc::Receiver` has exactly one owner, but several Fetch
/// Worker tasks need to pull from the same input channel while throttling
/// independently. Wrapping the receiver behind an async mutex is the
/// standard way to give several tasks turns at one `mpsc` receiver without
/// a second layer of fan-out channels.
pub type SharedReceiver<T> = Arc<AsyncMutex<mpsc::Receiver<Envelope<T>>>>;

/// Same contract as [`run_pool`], but for a pool whose input channel is
/// shared across worker tasks (spawn one of these per task, all wrapping
/// the same [`SharedReceiver`]).
pub async fn run_pool_shared<T, H>(
    input: SharedReceiver<T>,
    handler: Arc<H>,
    interrupted: Arc<AtomicBool>,
) where
    T: Send + 'static,
    H: ItemHandler<T> + 'static,
{
    loop {
        if interrupted.load(Ordering::Relaxed) {
            break;
        }

        // The lock is held only long enough to pull one item or observe an
        // idle tick; `handle`/`handle_nothing` run outside the lock so
        // sibling tasks aren't blocked on this task's work.
        let received = {
            let mut guard = input.lock().await;
            tokio::time::timeout(handler.poll_interval(), guard.recv()).await
        };

        match received {
            Ok(Some(envelope)) => handler.handle(envelope).await,
            Ok(None) => break,
            Err(_elapsed) => handler.handle_nothing().await,
        }
    }
}
