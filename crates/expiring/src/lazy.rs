//! Pull-based expiring cache.
//!
//! [`LazyExpiringCache`] refreshes on demand. Reads of a fresh value only take
//! a shared read lock; the first caller that finds the value stale takes the
//! refresh lock and calls the provider while everyone else queues behind it
//! and then reuses the result.

use std::fmt;

use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ExpiringCacheOptions;
use crate::error::{CacheError, CacheResult, ProviderError};
use crate::metadata::ExpirationMetadata;
use crate::provider::{ValueProvider, EMPTY_VALUE_MESSAGE};

struct LazySlot<T> {
    metadata: ExpirationMetadata<T>,
    disposed: bool,
}

/// Single-value cache refreshed inline by the first caller that needs it.
///
/// At most one provider call is in flight at a time. A failed refresh leaves
/// the stored metadata untouched and is returned to the caller that
/// triggered it; the next caller tries again.
///
/// A value counts as stale once less than
/// [`minimum_remaining_time`](ExpiringCacheOptions::minimum_remaining_time)
/// of its lifetime is left.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// use chrono::{Duration, Utc};
/// use expiring_lazy::{BoxError, ExpirationMetadata, LazyExpiringCache};
///
/// #[tokio::main]
/// async fn main() {
///     let issued = Arc::new(AtomicU32::new(0));
///     let counter = Arc::clone(&issued);
///     let cache = LazyExpiringCache::new(move |_previous: ExpirationMetadata<u32>| {
///         let next = counter.fetch_add(1, Ordering::SeqCst) + 1;
///         async move {
///             Ok::<_, BoxError>(ExpirationMetadata::new(next, Utc::now() + Duration::minutes(1)))
///         }
///     });
///
///     assert_eq!(cache.get_value().await.unwrap(), 1);
///     assert_eq!(cache.get_value().await.unwrap(), 1);
///
///     cache.invalidate().await;
///     assert_eq!(cache.get_value().await.unwrap(), 2);
///     assert_eq!(issued.load(Ordering::SeqCst), 2);
/// }
/// ```
pub struct LazyExpiringCache<T, C = SystemClock> {
    provider: Box<dyn ValueProvider<T>>,
    slot: RwLock<LazySlot<T>>,
    refresh_lock: AsyncMutex<()>,
    options: ExpiringCacheOptions,
    clock: C,
}

impl<T> LazyExpiringCache<T, SystemClock>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a cache with default options and the system clock.
    pub fn new<P>(provider: P) -> Self
    where
        P: ValueProvider<T>,
    {
        Self::with_options(provider, ExpiringCacheOptions::default())
    }

    /// Creates a cache with the given options and the system clock.
    pub fn with_options<P>(provider: P, options: ExpiringCacheOptions) -> Self
    where
        P: ValueProvider<T>,
    {
        Self::with_clock(provider, options, SystemClock)
    }
}

impl<T, C> LazyExpiringCache<T, C>
where
    T: Clone + Send + Sync + 'static,
    C: Clock,
{
    /// Creates a cache with the given options and clock.
    pub fn with_clock<P>(provider: P, options: ExpiringCacheOptions, clock: C) -> Self
    where
        P: ValueProvider<T>,
    {
        Self {
            provider: Box::new(provider),
            slot: RwLock::new(LazySlot { metadata: ExpirationMetadata::empty(), disposed: false }),
            refresh_lock: AsyncMutex::new(()),
            options,
            clock,
        }
    }

    /// Returns `true` if a value is stored and has not expired.
    pub fn value_created(&self) -> bool {
        let slot = self.slot.read();
        slot.metadata.is_fresh_at(self.clock.now(), chrono::Duration::zero())
    }

    /// Returns the cached value, refreshing it first if it is stale.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Disposed`] after [`dispose`](Self::dispose)
    /// - [`CacheError::Provider`] if this call refreshed and the provider
    ///   failed (or returned no value)
    #[instrument(skip(self), fields(cache = "lazy"))]
    pub async fn get_value(&self) -> CacheResult<T> {
        if let Some(value) = self.fresh_value()? {
            return Ok(value);
        }

        let _refresh = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we queued.
        if let Some(value) = self.fresh_value()? {
            debug!(
                cache = "lazy",
                event = "shared_refresh",
                "Reusing value refreshed by another caller"
            );
            return Ok(value);
        }

        let previous = self.snapshot();
        let produced = match self.provider.provide(previous).await {
            Ok(metadata) => match metadata.value.clone() {
                Some(value) => Ok((value, metadata)),
                None => Err(ProviderError::from_message(EMPTY_VALUE_MESSAGE)),
            },
            Err(err) => Err(ProviderError::new(err)),
        };

        let (value, metadata) = produced.map_err(|err| {
            let error = CacheError::Provider(err);
            warn!(
                cache = "lazy",
                event = "provider_failed",
                error_kind = error.kind(),
                error = %error,
                "Value provider failed"
            );
            error
        })?;

        let mut slot = self.slot.write();
        if slot.disposed {
            return Err(CacheError::Disposed);
        }
        debug!(
            cache = "lazy",
            event = "refresh",
            valid_until = %metadata.valid_until,
            "Stored refreshed value"
        );
        slot.metadata = metadata;
        Ok(value)
    }

    /// Drops the stored value so the next `get_value` refreshes.
    ///
    /// Waits for an in-flight refresh to finish first, so the value it
    /// produces is cleared as well.
    pub async fn invalidate(&self) {
        let _refresh = self.refresh_lock.lock().await;
        let mut slot = self.slot.write();
        if slot.disposed {
            return;
        }
        slot.metadata = ExpirationMetadata::empty();
        debug!(cache = "lazy", event = "invalidate", "Lazy expiring cache invalidated");
    }

    /// Clears the value and rejects every later call. Idempotent.
    pub fn dispose(&self) {
        let mut slot = self.slot.write();
        if slot.disposed {
            return;
        }
        slot.metadata = ExpirationMetadata::empty();
        slot.disposed = true;
        info!(cache = "lazy", event = "dispose", "Lazy expiring cache disposed");
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.slot.read().disposed
    }

    /// A copy of the stored metadata, fresh or not.
    pub fn snapshot(&self) -> ExpirationMetadata<T> {
        self.slot.read().metadata.clone()
    }

    /// The options this cache was built with.
    pub fn options(&self) -> &ExpiringCacheOptions {
        &self.options
    }

    fn fresh_value(&self) -> CacheResult<Option<T>> {
        let slot = self.slot.read();
        if slot.disposed {
            return Err(CacheError::Disposed);
        }
        Ok(slot.metadata.fresh_value(self.clock.now(), self.options.minimum_remaining()))
    }
}

impl<T, C> fmt::Debug for LazyExpiringCache<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("LazyExpiringCache")
            .field("has_value", &slot.metadata.has_value())
            .field("valid_until", &slot.metadata.valid_until)
            .field("disposed", &slot.disposed)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
