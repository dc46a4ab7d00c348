use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared, monotonic cancellation flag.
///
/// Clones observe the same flag. Components check it at their suspension
/// points; nothing is interrupted mid-computation.
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    token: CancellationToken,
}

impl Canceller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            debug!("cancellation triggered");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`trigger`](Self::trigger) has been called on any clone.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Triggers cancellation once `after` elapses. The timer task ends early
    /// if cancellation happens first. Must be called inside a Tokio runtime.
    pub fn trigger_after(&self, after: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = this.token.cancelled() => {}
                _ = sleep(after) => {
                    debug!(?after, "deadline elapsed");
                    this.trigger();
                }
            }
        })
    }
}
