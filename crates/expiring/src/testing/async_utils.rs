//! Async testing utilities

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::time::Duration;

/// Assert that an async condition becomes true within a timeout.
///
/// The condition is re-evaluated every 10ms.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use expiring_lazy::testing::SequenceProvider;
/// use expiring_lazy::EagerExpiringCache;
///
/// # async fn example() {
/// let provider = SequenceProvider::new(chrono::Duration::milliseconds(50));
/// let cache = EagerExpiringCache::new(provider.clone());
/// cache.get_value().await.expect("first value");
///
/// expiring_lazy::assert_eventually_async!(Duration::from_secs(1), async {
///     provider.calls() >= 2
/// });
/// # }
/// ```
#[macro_export]
macro_rules! assert_eventually_async {
    ($timeout:expr, $fut:expr) => {{
        let timeout_duration = $timeout;
        let result = tokio::time::timeout(timeout_duration, async {
            loop {
                if $fut.await {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await;

        assert!(result.is_ok(), "Condition did not become true within {:?}", timeout_duration);
    }};
}

/// Await `fut` with a timeout.
pub async fn timeout_ok<F, T>(duration: Duration, fut: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await
}
