//! Subprocess Worker: runs an external program with merged stdout/stderr
//! redirected to a log file, enforcing a timeout.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::WorkError;
use crate::item::SubprocessItem;
use crate::worker::{Envelope, ItemHandler};

/// Extension point supplying the argument vector for a subprocess item.
/// Implementations typically close over whatever per-item context they
/// need to build `argv` (e.g. a URL or file path carried alongside the
/// item by the workflow that created it).
pub trait SubprocessArgs: Send + Sync {
    fn args(&self, item: &SubprocessItem) -> Vec<String>;
}

/// Spawns one subprocess per item, polling it at `poll_interval` and
/// force-killing it if it runs past its timeout or the worker is
/// interrupted.
pub struct SubprocessWorker {
    args_provider: Arc<dyn SubprocessArgs>,
    poll_interval: Duration,
    interrupted: Arc<AtomicBool>,
}

impl SubprocessWorker {
    pub fn new(
        args_provider: Arc<dyn SubprocessArgs>,
        poll_interval: Duration,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            args_provider,
            poll_interval,
            interrupted,
        }
    }
}

#[async_trait]
impl ItemHandler<SubprocessItem> for SubprocessWorker {
    async fn handle(&self, envelope: Envelope<SubprocessItem>) {
        let Envelope { mut item, reply } = envelope;
        let argv = self.args_provider.args(&item);

        if argv.is_empty() {
            item.error = Some(WorkError::Io("empty argument vector".to_string()));
            let _ = reply.send(item);
            return;
        }

        let log_file = match std::fs::File::create(&item.log_path) {
            Ok(f) => f,
            Err(err) => {
                item.error = Some(WorkError::Io(err.to_string()));
                let _ = reply.send(item);
                return;
            }
        };
        let stderr_file = match log_file.try_clone() {
            Ok(f) => f,
            Err(err) => {
                item.error = Some(WorkError::Io(err.to_string()));
                let _ = reply.send(item);
                return;
            }
        };

        debug!(item = %item.id, argv = ?argv, "spawning subprocess");
        let mut child = match tokio::process::Command::new(&argv[0])
            .args(&argv[1..])
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr_file))
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                item.error = Some(WorkError::Io(err.to_string()));
                let _ = reply.send(item);
                return;
            }
        };

        let pid = child.id().unwrap_or(0);
        let started_at = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    item.return_code = status.code();
                    break;
                }
                Ok(None) => {
                    let run_time = started_at.elapsed();
                    if run_time > item.timeout || self.interrupted.load(Ordering::Relaxed) {
                        warn!(item = %item.id, pid, ?run_time, "killing subprocess: timeout or interrupted");
                        let _ = child.kill().await;
                        let _ = child.wait().await;
                        item.error = Some(WorkError::Timeout {
                            item_id: item.id,
                            pid,
                            run_time,
                        });
                        break;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(err) => {
                    item.error = Some(WorkError::Io(err.to_string()));
                    break;
                }
            }
        }

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

    struct SleepArgs {
        seconds: u64,
    }

    impl SubprocessArgs for SleepArgs {
        fn args(&self, _item: &SubprocessItem) -> Vec<String> {
            vec!["sleep".to_string(), self.seconds.to_string()]
        }
    }

    #[tokio::test]
    async fn natural_exit_records_return_code() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.log");
        let worker = SubprocessWorker::new(
            Arc::new(SleepArgs { seconds: 0 }),
            Duration::from_millis(20),
            Arc::new(AtomicBool::new(false)),
        );
        let item = SubprocessItem::new(&log_path).with_timeout(Duration::from_secs(5));
        let (tx, rx) = oneshot::channel();
        worker.handle(Envelope { item, reply: tx }).await;
        let completed = rx.await.unwrap();
        assert_eq!(completed.return_code, Some(0));
        assert!(completed.error.is_none());
    }

    #[tokio::test]
    async fn exceeding_timeout_kills_and_reports_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.log");
        let worker = SubprocessWorker::new(
            Arc::new(SleepArgs { seconds: 10 }),
            Duration::from_millis(20),
            Arc::new(AtomicBool::new(false)),
        );
        let item = SubprocessItem::new(&log_path).with_timeout(Duration::from_millis(100));
        let (tx, rx) = oneshot::channel();
        worker.handle(Envelope { item, reply: tx }).await;
        let completed = rx.await.unwrap();
        match completed.error {
            Some(WorkError::Timeout { .. }) => {}
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
