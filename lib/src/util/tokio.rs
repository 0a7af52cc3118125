use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Reasons a task spawned by [`spawn_bounded`] did not produce its output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    #[error("tokio task timed out")]
    TimedOut,

    #[error("tokio task was cancelled")]
    Cancelled,

    #[error("tokio task failed to join: {0}")]
    Failed(String),
}

/// Spawns a future as a Tokio task bounded by a timeout and a cancellation
/// token.
///
/// The future is dropped inside the task when either bound fires, so any
/// resources it holds are released before this returns.
///
/// # Errors
///
/// - If the timeout is reached
/// - If the token is cancelled first
/// - If the task panics or fails to join
pub async fn spawn_bounded<T>(
    duration: Duration,
    token: CancellationToken,
    future: impl Future<Output = T> + Send + 'static,
) -> Result<T, Interrupted>
where
    T: Send + 'static,
{
    let task = tokio::spawn(async move {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(Interrupted::Cancelled),
            output = tokio::time::timeout(duration, future) => {
                output.map_err(|_elapsed| Interrupted::TimedOut)
            }
        }
    });
    task.await
        .map_err(|error| Interrupted::Failed(error.to_string()))?
}

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
pub struct AbortOnDrop<T>(pub JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn completes() {
        let token = CancellationToken::new();
        let got = spawn_bounded(Duration::from_secs(1), token, async { 7 }).await;
        assert_eq!(got, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let token = CancellationToken::new();
        let future = tokio::time::sleep(Duration::from_secs(60));
        let got = spawn_bounded(Duration::from_secs(1), token, future).await;
        assert_eq!(got, Err(Interrupted::TimedOut));
    }

    #[tokio::test]
    async fn cancelled_drops_future() {
        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let guard = SetOnDrop(dropped.clone());
        let token = CancellationToken::new();
        token.cancel();

        let future = async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        };
        let got = spawn_bounded(Duration::from_secs(60), token, future).await;
        assert_eq!(got, Err(Interrupted::Cancelled));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panic_is_failed() {
        let token = CancellationToken::new();
        let got = spawn_bounded(Duration::from_secs(1), token, async {
            panic!("boom");
        })
        .await;
        assert!(matches!(got, Err(Interrupted::Failed(_))));
    }
}
