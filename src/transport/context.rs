use super::codes;
use crate::core::TransportError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Caller-side controls attached to a request.
///
/// The adapter does not act on these; it forwards them untouched so the
/// transport can honor them.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelSignal>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_on(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled)
    }

    /// Drives `fut` under this context: fails with `CANCELLED` when the
    /// signal fires first and with `TIMEOUT` when the deadline passes first.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, TransportError>
    where
        F: Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(cancelled_error());
        }

        let timed = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                    TransportError::new(codes::TIMEOUT, format!("request timed out after {limit:?}"))
                }),
                None => Ok(fut.await),
            }
        };

        match &self.cancel {
            Some(signal) => tokio::select! {
                result = timed => result,
                _ = signal.cancelled() => Err(cancelled_error()),
            },
            None => timed.await,
        }
    }
}

pub(crate) fn cancelled_error() -> TransportError {
    TransportError::new(codes::CANCELLED, "request cancelled by caller")
}

/// Creates a connected cancel handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; never resolves if the handle is dropped first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_through() {
        let ctx = CallContext::new().timeout(Duration::from_secs(5));
        assert_eq!(ctx.guard(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_guard_reports_cancellation() {
        let (handle, signal) = cancel_pair();
        let ctx = CallContext::new().cancel_on(signal);
        handle.cancel();

        let err = ctx.guard(async { 7 }).await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some(codes::CANCELLED));
    }

    #[tokio::test]
    async fn test_guard_cancels_pending_work() {
        let (handle, signal) = cancel_pair();
        let ctx = CallContext::new().cancel_on(signal);

        let work = ctx.guard(tokio::time::sleep(Duration::from_secs(30)));
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        };
        let (result, _) = tokio::join!(work, cancel);
        assert_eq!(result.unwrap_err().code.as_deref(), Some(codes::CANCELLED));
    }

    #[tokio::test]
    async fn test_guard_reports_timeout() {
        let ctx = CallContext::new().timeout(Duration::from_millis(5));
        let err = ctx
            .guard(tokio::time::sleep(Duration::from_secs(30)))
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some(codes::TIMEOUT));
    }
}
