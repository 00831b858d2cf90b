//! Fetch Worker: one HTTP request per item, self-throttled to a per-worker
//! rate ceiling.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::WorkError;
use crate::item::FetchItem;
use crate::worker::{Envelope, ItemHandler};

/// Executes fetch items against the network, one at a time, sleeping after
/// each attempt to stay under `frequency_hz` requests/second.
pub struct FetchWorker {
    client: Client,
    frequency_hz: f64,
    poll_interval: Duration,
}

impl FetchWorker {
    pub fn new(frequency_hz: f64, poll_interval: Duration) -> Self {
        Self {
            client: Client::new(),
            frequency_hz,
            poll_interval,
        }
    }

    /// Sleeps the remainder of the nominal interval, if any:
    /// `wait = (1/rate) - elapsed`.
    async fn throttle(&self, started_at: Instant) {
        let nominal = Duration::from_secs_f64(1.0 / self.frequency_hz);
        let elapsed = started_at.elapsed();
        if let Some(wait) = nominal.checked_sub(elapsed) {
            if !wait.is_zero() {
                debug!(?wait, "rate limiting url fetch");
                tokio::time::sleep(wait).await;
            }
        }
    }
}

#[async_trait]
impl ItemHandler<FetchItem> for FetchWorker {
    async fn handle(&self, envelope: Envelope<FetchItem>) {
        let Envelope { mut item, reply } = envelope;
        let started_at = Instant::now();

        if let Err(err) = url::Url::parse(&item.url) {
            item.error = Some(WorkError::Transport {
                url: item.url.clone(),
                message: err.to_string(),
            });
            debug!(item = %item.id, url = %item.url, "fetch worker rejected malformed url");
            self.throttle(started_at).await;
            let _ = reply.send(item);
            return;
        }

        let mut builder = match &item.form {
            Some(form) => self.client.post(&item.url).form(form),
            None => self.client.get(&item.url),
        };
        builder = builder.timeout(item.timeout);

        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                item.status_code = Some(status.as_u16());
                item.headers = Some(response.headers().clone());
                if status.as_u16() == 200 {
                    match response.bytes().await {
                        Ok(bytes) => item.data = Some(bytes.to_vec()),
                        Err(err) => {
                            item.error = Some(WorkError::Transport {
                                url: item.url.clone(),
                                message: err.to_string(),
                            })
                        }
                    }
                }
                // Non-2xx: status code recorded, no body read — a normal
                // result, not an error.
            }
            Err(err) => {
                item.error = Some(WorkError::Transport {
                    url: item.url.clone(),
                    message: err.to_string(),
                });
            }
        }

        debug!(item = %item.id, url = %item.url, status = ?item.status_code, "fetch worker processed item");
        self.throttle(started_at).await;
        let _ = reply.send(item);
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn records_status_and_body_on_success() {
        // A worker pointed at an unroutable address should fail fast with
        // a Transport error rather than hang; this exercises the error
        // path without needing a live server.
        let worker = FetchWorker::new(1000.0, Duration::from_millis(50));
        let mut item = FetchItem::new("http://127.0.0.1:1");
        item.timeout = Duration::from_millis(200);
        let (tx, rx) = oneshot::channel();
        worker.handle(Envelope { item, reply: tx }).await;
        let completed = rx.await.unwrap();
        assert!(completed.error.is_some());
    }

    #[tokio::test]
    async fn rejects_malformed_url_without_making_a_request() {
        let worker = FetchWorker::new(1000.0, Duration::from_millis(50));
        let item = FetchItem::new("not a url");
        let (tx, rx) = oneshot::channel();
        worker.handle(Envelope { item, reply: tx }).await;
        let completed = rx.await.unwrap();
        assert!(completed.error.is_some());
        assert!(completed.status_code.is_none());
    }
}
