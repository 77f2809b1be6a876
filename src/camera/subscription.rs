use super::host::CameraEvent;
use std::future::Future;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Observer of camera events, removed deterministically by `unsubscribe`
/// or when dropped
pub struct Subscription {
    name: &'static str,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Forward every camera event to `handler` until cancelled
    pub fn spawn<F, Fut>(
        name: &'static str,
        mut receiver: broadcast::Receiver<CameraEvent>,
        parent: &CancellationToken,
        mut handler: F,
    ) -> Self
    where
        F: FnMut(CameraEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let token = parent.child_token();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    event = receiver.recv() => match event {
                        Ok(event) => handler(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Observer '{}' lagged by {} camera events", name, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Observer '{}' stopped", name);
        });

        Self {
            name,
            token,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
            && self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop observing
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
