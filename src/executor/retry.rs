use std::future::Future;
use std::time::Duration;

/// Retry a fallible async operation with exponential backoff.
///
/// Only errors accepted by `retryable` are retried; any other error is returned at once.
pub async fn with_retry<F, Fut, T, E, R>(
    max_retries: u32,
    base_delay_ms: u64,
    operation_name: &str,
    retryable: R,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !retryable(&e) => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt > max_retries {
                    tracing::error!(
                        operation = operation_name,
                        attempts = attempt,
                        "All retry attempts exhausted"
                    );
                    return Err(e);
                }

                let delay = Duration::from_millis(base_delay_ms * 2u64.pow(attempt - 1));
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_retries = max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retry(3, 1, "flaky", |_| true, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err("not yet".to_string())
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry(3, 1, "fatal", |_| false, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("broken".to_string())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry(2, 1, "down", |_| true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("down".to_string())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
