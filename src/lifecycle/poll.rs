use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::time::Instant;

/// Deadline passed before the check broke out. Carries the last observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineExceeded<O> {
    pub last: Option<O>,
    pub waited: Duration,
}

/// Runs `check` every `interval` until it returns `Break` or `timeout` elapses.
///
/// The deadline is inclusive: the loop sleeps at most up to the deadline and
/// checks once more there before giving up.
pub async fn poll_until<T, O, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<T, DeadlineExceeded<O>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlFlow<T, O>>,
{
    let started = Instant::now();
    // A timeout too large to represent never expires.
    let deadline = started.checked_add(timeout);
    let mut last = None;

    loop {
        match check().await {
            ControlFlow::Break(value) => return Ok(value),
            ControlFlow::Continue(observation) => last = Some(observation),
        }

        let now = Instant::now();
        let pause = match deadline {
            Some(deadline) if now >= deadline => {
                return Err(DeadlineExceeded {
                    last,
                    waited: now - started,
                });
            }
            Some(deadline) => interval.min(deadline - now),
            None => interval,
        };
        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_breaks_on_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, DeadlineExceeded<()>> =
            poll_until(Duration::from_secs(2), Duration::from_secs(10), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 2 {
                        ControlFlow::Break(n)
                    } else {
                        ControlFlow::Continue(())
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_last_observation() {
        let started = Instant::now();
        let calls = AtomicU32::new(0);
        let result: Result<(), DeadlineExceeded<u32>> =
            poll_until(Duration::from_secs(2), Duration::from_secs(5), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { ControlFlow::Continue(n) }
            })
            .await;

        let err = result.unwrap_err();
        // checks at t = 0, 2, 4 and the deadline itself at 5
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.last, Some(3));
        assert_eq!(err.waited, Duration::from_secs(5));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_condition_met_exactly_at_deadline() {
        let started = Instant::now();
        let result: Result<(), DeadlineExceeded<()>> =
            poll_until(Duration::from_secs(3), Duration::from_secs(10), || async move {
                if started.elapsed() >= Duration::from_secs(10) {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_keeps_polling() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, DeadlineExceeded<()>> =
            poll_until(Duration::from_secs(2), Duration::MAX, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 3 {
                        ControlFlow::Break(n)
                    } else {
                        ControlFlow::Continue(())
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_checks_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DeadlineExceeded<()>> =
            poll_until(Duration::from_secs(1), Duration::ZERO, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { ControlFlow::Continue(()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
