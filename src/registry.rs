//! Registry & Factory: binds item kinds to the channel a worker pool
//! consumes from, and wires the standard pool set.
//!
//! An explicit tagged-variant type for items plus a mapping from tag to
//! channel stands in for routing on runtime class. `WorkSender` is that
//! tagged variant on the sending side — one `mpsc` sender per concrete
//! item type, wrapped so they can all live in one
//! `HashMap<ItemKind, WorkSender>` despite having different `T` in
//! `Envelope<T>`. This map from item kind to the channel registered for
//! that kind is built once and read-only after `Coordinator::build`.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::error::WorkError;
use crate::item::ItemKind;
use crate::worker::Envelope;
use crate::{FetchItem, SubprocessItem, TimerItem};

/// One worker pool's input sender, tagged by the kind it accepts.
#[derive(Clone)]
pub enum WorkSender {
    Fetch(mpsc::Sender<Envelope<FetchItem>>),
    Subprocess(mpsc::Sender<Envelope<SubprocessItem>>),
    Timer(mpsc::Sender<Envelope<TimerItem>>),
}

impl WorkSender {
    pub fn kind(&self) -> ItemKind {
        match self {
            WorkSender::Fetch(_) => ItemKind::Fetch,
            WorkSender::Subprocess(_) => ItemKind::Subprocess,
            WorkSender::Timer(_) => ItemKind::Timer,
        }
    }
}

/// Read-only mapping from [`ItemKind`] to the channel registered for it.
///
/// Dispatch by kind is total: every kind the crate defines has exactly one
/// registered sender once [`WorkMapBuilder::build`] has run. A lookup miss
/// means some kind was never registered — a programming error the caller
/// is expected to treat as a fatal assertion, not a recoverable condition;
/// [`WorkMap::get`] panics using [`WorkError::Dispatch`]'s message rather
/// than leaving that error variant unused.
pub struct WorkMap {
    senders: HashMap<ItemKind, WorkSender>,
}

impl WorkMap {
    pub fn get(&self, kind: ItemKind) -> &WorkSender {
        self.senders
            .get(&kind)
            .unwrap_or_else(|| panic!("{}", WorkError::Dispatch(kind)))
    }
}

/// Factory for a [`WorkMap`]: the standard configuration wires the driver,
/// one or more Fetch Workers, and one Timer Worker, with the URL-fetch
/// channel and timer channel registered against the Fetch Item and Timer
/// Item kinds respectively.
///
/// `register` binds a custom item kind to a worker-consumed channel, and
/// must be called before `Coordinator::start` spawns any pool.
#[derive(Default)]
pub struct WorkMapBuilder {
    senders: HashMap<ItemKind, WorkSender>,
}

impl WorkMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, sender: WorkSender) -> Self {
        self.senders.insert(sender.kind(), sender);
        self
    }

    pub fn build(self) -> WorkMap {
        WorkMap {
            senders: self.senders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_registered_sender_for_its_own_kind() {
        let (tx, _rx) = mpsc::channel(1);
        let map = WorkMapBuilder::new()
            .register(WorkSender::Fetch(tx))
            .build();
        assert_eq!(map.get(ItemKind::Fetch).kind(), ItemKind::Fetch);
    }

    #[tokio::test]
    #[should_panic(expected = "no worker registered")]
    async fn lookup_of_unregistered_kind_panics() {
        let map = WorkMapBuilder::new().build();
        let _ = map.get(ItemKind::Timer);
    }
}
