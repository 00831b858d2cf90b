//! Barrier: groups the items yielded from a single workflow suspension
//! point.
//!
//! `Yielded` is a sum type distinguishing a single yielded item from a
//! parallel batch. `Barrier::join` implements first-error-wins join
//! semantics: every dispatched child keeps running to completion (in-flight
//! siblings are not cancelled), but as soon as the first error among them is
//! observed the barrier stops waiting and the remaining completions are
//! drained quietly in the background.

use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::error::WorkError;

/// What a workflow yielded at one suspension point: a single item, or a
/// batch to run in parallel. Branch on this exhaustively instead of
/// checking a `was_list` flag.
#[derive(Debug)]
pub enum Yielded<T> {
    One(T),
    Many(Vec<T>),
}

/// Anything that can report whether it completed with an error — the
/// trait `Barrier::join` needs to implement first-error-wins without
/// caring what the underlying item type is.
pub trait HasError {
    fn error(&self) -> Option<&WorkError>;
}

/// Join record for a parallel batch yield.
pub struct Barrier;

impl Barrier {
    /// Dispatches every item in `items` via `dispatch`, preserving yield
    /// order in the returned `Vec` on success. If any item completes with
    /// an error, returns that error (the first one observed in completion
    /// order) without waiting for the rest; the remaining dispatches are
    /// spawned off to finish quietly.
    pub async fn join<T, F, Fut>(items: Vec<T>, dispatch: F) -> Result<Vec<T>, WorkError>
    where
        T: HasError + Send + 'static,
        F: Fn(T) -> Fut,
        Fut: std::future::Future<Output = T> + Send + 'static,
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut in_flight = FuturesUnordered::new();
        for (index, item) in items.into_iter().enumerate() {
            let fut = dispatch(item);
            in_flight.push(async move { (index, fut.await) });
        }

        let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut first_error: Option<WorkError> = None;

        while let Some((index, completed)) = in_flight.next().await {
            if first_error.is_none() {
                if let Some(err) = completed.error() {
                    first_error = Some(err.clone());
                }
            }
            results[index] = Some(completed);

            if first_error.is_some() {
                // Barrier is ready. Let the stragglers finish without us;
                // in-flight siblings are not cancelled, their completions
                // are simply unobserved.
                tokio::spawn(async move { while in_flight.next().await.is_some() {} });
                break;
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(results.into_iter().map(|slot| slot.expect("filled")).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Probe {
        label: &'static str,
        error: Option<WorkError>,
    }

    impl HasError for Probe {
        fn error(&self) -> Option<&WorkError> {
            self.error.as_ref()
        }
    }

    #[tokio::test]
    async fn preserves_yield_order_on_success() {
        let items = vec![
            Probe { label: "a", error: None },
            Probe { label: "b", error: None },
            Probe { label: "c", error: None },
        ];

        let result = Barrier::join(items, |item| async move {
            // Complete out of order to prove index-based reassembly.
            let delay = match item.label {
                "a" => 30,
                "b" => 10,
                _ => 20,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            item
        })
        .await
        .unwrap();

        let labels: Vec<_> = result.iter().map(|p| p.label).collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn first_error_wins() {
        let items = vec![
            Probe { label: "a", error: None },
            Probe {
                label: "b",
                error: Some(WorkError::Transport {
                    url: "http://x".into(),
                    message: "boom".into(),
                }),
            },
            Probe { label: "c", error: None },
        ];

        let err = Barrier::join(items, |item| async move { item })
            .await
            .unwrap_err();

        match err {
            WorkError::Transport { message, .. } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_batch_is_immediately_ready() {
        let items: Vec<Probe> = Vec::new();
        let result = Barrier::join(items, |item| async move { item }).await.unwrap();
        assert!(result.is_empty());
    }
}
