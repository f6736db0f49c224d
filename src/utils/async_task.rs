use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::Result;

/// Runs `task` up to `max_attempts` times, sleeping a random duration in
/// `[0, max_splay)` before every attempt.
///
/// Only errors accepted by `should_retry` are retried; anything else is
/// returned immediately. The last error is returned once attempts run out.
pub(crate) async fn task_with_random_splay<F, T, P, R>(
    task: F,
    max_attempts: usize,
    max_splay: Duration,
    should_retry: R,
) -> Result<P>
where
    F: Fn() -> T,
    T: Future<Output = Result<P>>,
    R: Fn(&crate::Error) -> bool,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let splay = random_splay(max_splay);
        if !splay.is_zero() {
            sleep(splay).await;
        }

        match task().await {
            Ok(r) => return Ok(r),
            Err(e) if should_retry(&e) && attempt < max_attempts => {
                debug!(attempt, "retryable failure: {:?}", e);
            }
            Err(e) => {
                if attempt >= max_attempts {
                    warn!("task failed after {} attempts", attempt);
                }
                return Err(e);
            }
        }
    }
}

fn random_splay(max_splay: Duration) -> Duration {
    let max_ms = max_splay.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

/// Spawns `task_fn` on `tracker`. Errors are logged with the task name since
/// nobody awaits the handle.
pub(crate) fn spawn_task<F, Fut>(
    tracker: &TaskTracker,
    name: &str,
    task_fn: F,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    tracker.spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    });
}
