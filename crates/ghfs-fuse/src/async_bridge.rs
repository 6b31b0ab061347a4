//! Bridge between sync FUSE callbacks and async resolver operations.
//!
//! FUSE callbacks run on the session thread and must not block it while a
//! remote request is in flight. [`dispatch`] spawns the operation on the tokio
//! runtime and hands its outcome to a completion closure that sends the FUSE
//! reply, so independent requests proceed in parallel.
//!
//! Every operation is bounded by a timeout. When it expires the future is
//! dropped, which stops any page drain it was running.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Statistics for async bridge operations (for observability).
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub operations_started: AtomicU64,
    pub operations_completed: AtomicU64,
    pub operations_timed_out: AtomicU64,
}

impl BridgeStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_start(&self) {
        self.operations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_complete(&self) {
        self.operations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.operations_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Operations started but not yet finished either way.
    pub fn in_flight(&self) -> u64 {
        let started = self.operations_started.load(Ordering::Relaxed);
        let done = self.operations_completed.load(Ordering::Relaxed)
            + self.operations_timed_out.load(Ordering::Relaxed);
        started.saturating_sub(done)
    }
}

/// Error from async bridge operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl BridgeError {
    pub fn to_errno(&self) -> i32 {
        match self {
            BridgeError::Timeout(_) => libc::ETIMEDOUT,
        }
    }
}

/// Runs `future` on the runtime with a timeout and passes the outcome to
/// `complete`.
///
/// `complete` is called exactly once, from the runtime, with either the
/// future's output or [`BridgeError::Timeout`].
pub fn dispatch<F, T, C>(
    handle: &Handle,
    timeout: Duration,
    stats: Arc<BridgeStats>,
    future: F,
    complete: C,
) -> JoinHandle<()>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
    C: FnOnce(Result<T, BridgeError>) + Send + 'static,
{
    stats.record_start();
    handle.spawn(async move {
        let outcome = tokio::time::timeout(timeout, future).await;
        match outcome {
            Ok(value) => {
                stats.record_complete();
                complete(Ok(value));
            }
            Err(_elapsed) => {
                stats.record_timeout();
                tracing::warn!(?timeout, "operation timed out");
                complete(Err(BridgeError::Timeout(timeout)));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::oneshot;

    fn run<T: Send + 'static>(
        rt: &tokio::runtime::Runtime,
        timeout: Duration,
        stats: &Arc<BridgeStats>,
        future: impl Future<Output = T> + Send + 'static,
    ) -> Result<T, BridgeError> {
        let (tx, rx) = oneshot::channel();
        dispatch(rt.handle(), timeout, Arc::clone(stats), future, move |r| {
            let _ = tx.send(r);
        });
        rx.blocking_recv().unwrap()
    }

    #[test]
    fn test_dispatch_simple() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let stats = BridgeStats::new();
        assert_eq!(run(&rt, Duration::from_secs(5), &stats, async { 42 }), Ok(42));
        assert_eq!(stats.operations_completed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.in_flight(), 0);
    }

    #[test]
    fn test_timeout() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let stats = BridgeStats::new();
        let result = run(&rt, Duration::from_millis(10), &stats, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            42
        });
        assert_eq!(result, Err(BridgeError::Timeout(Duration::from_millis(10))));
        assert_eq!(stats.operations_timed_out.load(Ordering::Relaxed), 1);
        assert_eq!(stats.operations_completed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_timed_out_future_is_dropped() {
        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let rt = tokio::runtime::Runtime::new().unwrap();
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = SetOnDrop(Arc::clone(&dropped));
        let _ = run(&rt, Duration::from_millis(10), &BridgeStats::new(), async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_requests_run_concurrently() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let stats = BridgeStats::new();
        let (tx, rx) = std::sync::mpsc::channel();

        // Each sleeps 200ms; serially they would need 2s.
        let start = std::time::Instant::now();
        for i in 0..10 {
            let tx = tx.clone();
            dispatch(
                rt.handle(),
                Duration::from_secs(5),
                Arc::clone(&stats),
                async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    i
                },
                move |r| {
                    let _ = tx.send(r);
                },
            );
        }
        drop(tx);
        let results: Vec<_> = rx.iter().collect();
        assert_eq!(results.len(), 10);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
