use std::future::Future;

use error_stack::Report;

use crate::KernelError;

/// Default attempt budget shared by the atomic-claim and gateway paths.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Runs `operation` up to `attempts` times, retrying only contexts that
/// report themselves retryable. The last report is surfaced once the
/// budget is spent; terminal errors pass through on first sight.
pub async fn bounded<T, F, Fut>(
    attempts: u32,
    mut operation: F,
) -> error_stack::Result<T, KernelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = error_stack::Result<T, KernelError>>,
{
    let mut last: Option<Report<KernelError>> = None;
    for _ in 0..attempts.max(1) {
        match operation().await {
            Err(report) if report.current_context().is_retryable() => last = Some(report),
            other => return other,
        }
    }
    Err(last.unwrap_or_else(|| Report::new(KernelError::TransientConflict)))
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use error_stack::Report;

    use super::bounded;
    use crate::KernelError;

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = bounded(3, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Report::new(KernelError::TransientConflict))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.ok(), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_pass_through_immediately() {
        let calls = AtomicU32::new(0);
        let result: error_stack::Result<(), _> = bounded(3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Report::new(KernelError::CycleUnavailable))
        })
        .await;
        assert_eq!(
            result.unwrap_err().current_context(),
            &KernelError::CycleUnavailable
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_surfaces_last_report() {
        let result: error_stack::Result<(), _> =
            bounded(2, || async { Err(Report::new(KernelError::UpstreamTimeout)) }).await;
        assert_eq!(
            result.unwrap_err().current_context(),
            &KernelError::UpstreamTimeout
        );
    }
}
