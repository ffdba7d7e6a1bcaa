//! Bounded retry without backoff.

use std::future::Future;

use tracing::warn;

/// Runs `operation` up to `attempts` times (at least once) and returns the
/// first success, or the last error once the budget is spent. Attempts follow
/// each other immediately.
pub async fn retry_bounded<T, E, F, Fut>(operation_name: &str, attempts: usize, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!("Error {} NO. {}/{} - {}", operation_name, attempt, attempts, e);
                attempt += 1;
            }
            Err(e) => {
                warn!("Error {} NO. {}/{} - {}, giving up", operation_name, attempt, attempts, e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_succeeds_within_budget() {
        let calls = Cell::new(0);
        let result: Result<u32, String> = retry_bounded("test op", 3, || {
            calls.set(calls.get() + 1);
            let call = calls.get();
            async move { if call < 3 { Err(format!("failure {}", call)) } else { Ok(call) } }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error_when_exhausted() {
        let calls = Cell::new(0);
        let result: Result<(), String> = retry_bounded("test op", 2, || {
            calls.set(calls.get() + 1);
            let call = calls.get();
            async move { Err(format!("failure {}", call)) }
        })
        .await;
        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_zero_budget_still_tries_once() {
        let calls = Cell::new(0);
        let _: Result<(), String> = retry_bounded("test op", 0, || {
            calls.set(calls.get() + 1);
            async { Err("nope".to_string()) }
        })
        .await;
        assert_eq!(calls.get(), 1);
    }
}
