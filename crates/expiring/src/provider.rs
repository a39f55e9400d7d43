//! The value provider (factory) contract.

use std::future::Future;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::metadata::ExpirationMetadata;

/// Failure message used when a provider reports success without a value.
pub(crate) const EMPTY_VALUE_MESSAGE: &str = "value provider returned no value";

/// Produces a new value and its expiry timestamp.
///
/// The provider receives an owned snapshot of the previously cached metadata
/// as a hint (for example to reuse a refresh token). On the first call the
/// snapshot is [`ExpirationMetadata::empty`]. Providers should report failures
/// as errors rather than returning metadata without a value; the caches treat
/// an empty successful result as a failure.
///
/// Async closures taking `ExpirationMetadata<T>` implement this trait, so most
/// callers never implement it by hand:
///
/// ```
/// use chrono::{Duration, Utc};
/// use expiring_lazy::{BoxError, ExpirationMetadata, LazyExpiringCache};
///
/// let cache = LazyExpiringCache::new(|_previous: ExpirationMetadata<u64>| async move {
///     Ok::<_, BoxError>(ExpirationMetadata::new(42, Utc::now() + Duration::seconds(30)))
/// });
/// # let _ = cache;
/// ```
#[async_trait]
pub trait ValueProvider<T>: Send + Sync + 'static {
    /// Produce a fresh value.
    async fn provide(
        &self,
        previous: ExpirationMetadata<T>,
    ) -> Result<ExpirationMetadata<T>, BoxError>;
}

#[async_trait]
impl<T, F, Fut> ValueProvider<T> for F
where
    T: Send + 'static,
    F: Fn(ExpirationMetadata<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ExpirationMetadata<T>, BoxError>> + Send + 'static,
{
    async fn provide(
        &self,
        previous: ExpirationMetadata<T>,
    ) -> Result<ExpirationMetadata<T>, BoxError> {
        (self)(previous).await
    }
}
