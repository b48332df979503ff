//! ---
//! hpc_section: "03-cloud-synchronization"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Cloud API client and retry queue."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! Store-and-forward queue for telemetry the cloud could not accept.
//!
//! The queue is bounded; when it is full the newest payload is dropped
//! rather than the backlog, since the backlog preserves history the
//! cloud has not seen yet.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{error, warn};

use crate::{CloudClient, CloudError};

/// Roughly a week of 30-second telemetry.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20_000;

/// Pause after a failed redelivery so an unreachable cloud is not
/// hammered by the backlog.
const RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// One queued POST, body already serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEnvelope {
    pub path: String,
    pub body: String,
}

#[derive(Clone)]
pub struct RetrySender {
    tx: mpsc::Sender<RetryEnvelope>,
}

pub fn retry_channel(capacity: usize) -> (RetrySender, mpsc::Receiver<RetryEnvelope>) {
    let (tx, rx) = mpsc::channel(capacity);
    (RetrySender { tx }, rx)
}

impl RetrySender {
    /// Queue a failed delivery. Returns the delivery error unchanged,
    /// or wraps it when the queue had no room and the payload was
    /// dropped.
    pub(crate) fn enqueue_failed(&self, path: &str, body: String, err: CloudError) -> CloudError {
        warn!(path, error = %err, "delivery failed, queueing for retry");
        let envelope = RetryEnvelope {
            path: path.to_owned(),
            body,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => err,
            Err(_) => CloudError::QueueFull {
                path: path.to_owned(),
                source: Box::new(err),
            },
        }
    }

    fn requeue(&self, envelope: RetryEnvelope) {
        if self.tx.try_send(envelope).is_err() {
            error!("retry queue full, dropping redelivery");
        }
    }
}

/// Drain the queue one envelope at a time. A failed redelivery goes to
/// the back of the queue and the worker backs off before the next
/// attempt. Generic over the delivery function for tests.
pub async fn run_retry_worker<F, Fut>(
    mut rx: mpsc::Receiver<RetryEnvelope>,
    sender: RetrySender,
    mut deliver: F,
    backoff: Duration,
    mut shutdown: broadcast::Receiver<()>,
) where
    F: FnMut(RetryEnvelope) -> Fut,
    Fut: Future<Output = Result<(), CloudError>>,
{
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            received = rx.recv() => {
                let Some(envelope) = received else { return };
                if let Err(err) = deliver(envelope.clone()).await {
                    warn!(path = %envelope.path, error = %err, "redelivery failed, queueing again");
                    sender.requeue(envelope);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Production worker bound to the cloud client.
pub async fn run_cloud_retry_worker(
    client: Arc<CloudClient>,
    rx: mpsc::Receiver<RetryEnvelope>,
    sender: RetrySender,
    shutdown: broadcast::Receiver<()>,
) {
    run_retry_worker(
        rx,
        sender,
        move |envelope| {
            let client = client.clone();
            async move { client.post_raw(&envelope).await }
        },
        RETRY_BACKOFF,
        shutdown,
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Method, StatusCode};
    use std::sync::Mutex;
    use url::Url;

    fn delivery_error() -> CloudError {
        CloudError::Status {
            method: Method::POST,
            url: Url::parse("https://cloud.example.com/api/controller/metrics-v1").unwrap(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_owned(),
        }
    }

    fn envelope(body: &str) -> RetryEnvelope {
        RetryEnvelope {
            path: "api/controller/metrics-v1".to_owned(),
            body: body.to_owned(),
        }
    }

    #[tokio::test]
    async fn full_queue_drops_the_newest_payload() {
        let (sender, mut rx) = retry_channel(1);

        let err = sender.enqueue_failed("api/controller/metrics-v1", "{}".into(), delivery_error());
        assert!(matches!(err, CloudError::Status { .. }));

        let err = sender.enqueue_failed("api/controller/metrics-v1", "{}".into(), delivery_error());
        assert!(matches!(err, CloudError::QueueFull { .. }));

        // Only the first payload survived.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn worker_redelivers_until_the_cloud_accepts() {
        let (sender, rx) = retry_channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);
        let attempts = Arc::new(Mutex::new(0u32));

        sender
            .tx
            .try_send(envelope(r#"{"outdoor":-15.5}"#))
            .unwrap();

        let seen = attempts.clone();
        let worker = tokio::spawn(run_retry_worker(
            rx,
            sender.clone(),
            move |_| {
                let seen = seen.clone();
                async move {
                    let mut count = seen.lock().unwrap();
                    *count += 1;
                    if *count < 4 {
                        Err(delivery_error())
                    } else {
                        Ok(())
                    }
                }
            },
            Duration::ZERO,
            shutdown_tx.subscribe(),
        ));

        for _ in 0..200 {
            if *attempts.lock().unwrap() >= 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*attempts.lock().unwrap(), 4);

        shutdown_tx.send(()).unwrap();
        worker.await.unwrap();
        assert_eq!(*attempts.lock().unwrap(), 4, "no redelivery after success");
    }

    #[tokio::test]
    async fn worker_stops_on_shutdown() {
        let (sender, rx) = retry_channel(1);
        let (shutdown_tx, _) = broadcast::channel(1);
        let worker = tokio::spawn(run_retry_worker(
            rx,
            sender,
            |_| async { Ok(()) },
            Duration::ZERO,
            shutdown_tx.subscribe(),
        ));
        shutdown_tx.send(()).unwrap();
        worker.await.unwrap();
    }
}
