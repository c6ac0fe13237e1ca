use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A delayed task handed to a [`Scheduler`]
pub type ScheduledTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to an armed timer
pub trait TimerHandle: Send + Sync {
    /// Disarm the timer. A timer that already fired is unaffected and its task
    /// runs to completion.
    fn cancel(&self);
}

/// Timer primitive used for proactive refresh
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> Box<dyn TimerHandle>;
}

/// Runs each task on the tokio runtime after its delay
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler;

#[derive(Debug)]
struct TokioTimer {
    token: CancellationToken,
}

impl TimerHandle for TokioTimer {
    fn cancel(&self) {
        self.token.cancel();
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> Box<dyn TimerHandle> {
        let token = CancellationToken::new();
        let armed = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = armed.cancelled() => {}
                _ = tokio::time::sleep(delay) => task.await,
            }
        });
        Box::new(TokioTimer { token })
    }
}
