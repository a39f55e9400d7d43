//! Push-based expiring cache.
//!
//! [`EagerExpiringCache`] keeps its value fresh from a background task that
//! wakes up just before the current value expires. Readers wait on an
//! [`AsyncGate`] until a value has been published and then read it under the
//! slot lock, so in steady state `get_value` never calls the provider.
//!
//! # Control Flow
//!
//! 1. The first `get_value` starts the [`BackgroundRefresher`].
//! 2. Readers suspend on the gate until the refresher publishes.
//! 3. After waking, a reader re-checks freshness. If the refresher has fallen
//!    behind and the stored value already expired, the reader refreshes inline
//!    and publishes the result through the same path as the refresher.
//!
//! # Failures
//!
//! A provider failure stops the refresher and faults the gate. Every waiter,
//! present and future, observes the same [`ProviderError`] until
//! [`invalidate`](EagerExpiringCache::invalidate) clears it. The first reader
//! after an invalidation spawns one recovery refresh and every reader,
//! including that one, waits on the gate for its result. The background loop
//! is not restarted.

mod refresher;

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub use self::refresher::{BackgroundRefresher, RefreshTarget, RefresherState};
use crate::clock::{Clock, SystemClock};
use crate::config::ExpiringCacheOptions;
use crate::error::{CacheError, CacheResult, ProviderError};
use crate::metadata::ExpirationMetadata;
use crate::provider::{ValueProvider, EMPTY_VALUE_MESSAGE};
use crate::sync::AsyncGate;

/// The metadata slot plus the lifecycle flags, guarded together.
struct Slot<T> {
    metadata: ExpirationMetadata<T>,
    disposed: bool,
    /// A recovery refresh is in flight; cleared when it publishes or faults.
    recovering: bool,
}

/// State shared between the cache handle and the background loop.
struct EagerInner<T, C> {
    provider: Box<dyn ValueProvider<T>>,
    slot: Mutex<Slot<T>>,
    gate: AsyncGate,
    refresher: BackgroundRefresher,
    clock: C,
}

impl<T, C> EagerInner<T, C>
where
    T: Clone + Send + Sync + 'static,
    C: Clock,
{
    fn snapshot(&self) -> ExpirationMetadata<T> {
        self.slot.lock().metadata.clone()
    }

    /// Snapshot, call the provider, and route failures through the fault path.
    async fn produce(&self) -> CacheResult<ExpirationMetadata<T>> {
        let previous = self.snapshot();

        let err = match self.provider.provide(previous).await {
            Ok(metadata) if metadata.has_value() => return Ok(metadata),
            Ok(_) => ProviderError::from_message(EMPTY_VALUE_MESSAGE),
            Err(err) => ProviderError::new(err),
        };

        self.fault(err.clone());
        Err(CacheError::Provider(err))
    }

    /// Store a produced value and open the gate. Last writer wins.
    fn publish(&self, metadata: ExpirationMetadata<T>) {
        let mut slot = self.slot.lock();
        if slot.disposed {
            debug!(
                cache = "eager",
                event = "publish_after_dispose",
                "Dropping value produced after dispose"
            );
            return;
        }

        slot.metadata = metadata;
        slot.recovering = false;
        if !self.gate.is_set() {
            self.gate.signal();
        }
    }

    /// Stop the refresher and replay `err` to every waiter.
    fn fault(&self, err: ProviderError) {
        let mut slot = self.slot.lock();
        if slot.disposed {
            return;
        }

        let error = CacheError::Provider(err);
        warn!(
            cache = "eager",
            event = "provider_failed",
            error_kind = error.kind(),
            error = %error,
            "Value provider failed"
        );
        slot.recovering = false;
        self.refresher.stop();
        self.gate.reset();
        self.gate.fault(error);
    }

    /// Refresh on the caller's task and return the new value.
    async fn refresh_inline(&self) -> CacheResult<T> {
        let metadata = self.produce().await?;
        let value = metadata.value.clone().ok_or_else(|| {
            CacheError::Provider(ProviderError::from_message(EMPTY_VALUE_MESSAGE))
        })?;
        self.publish(metadata);
        Ok(value)
    }

    /// The stored value if it has not expired yet.
    fn fresh_value(&self) -> CacheResult<Option<T>> {
        let slot = self.slot.lock();
        if slot.disposed {
            return Err(CacheError::Disposed);
        }
        Ok(slot.metadata.fresh_value(self.clock.now(), chrono::Duration::zero()))
    }

    /// Claim the recovery refresh. Succeeds for exactly one caller while
    /// nothing else will ever open the gate: the refresher stopped after a
    /// fault and the cache was invalidated since.
    fn claim_recovery(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.disposed
            || slot.recovering
            || !self.refresher.is_stopped()
            || self.gate.is_resolved()
        {
            return false;
        }
        slot.recovering = true;
        true
    }

    fn ensure_active(&self) -> CacheResult<()> {
        if self.slot.lock().disposed {
            Err(CacheError::Disposed)
        } else {
            Ok(())
        }
    }

    fn dispose(&self) {
        let mut slot = self.slot.lock();
        if slot.disposed {
            return;
        }

        self.refresher.stop();
        self.gate.reset();
        // Wake pending readers; nothing will ever publish again.
        self.gate.fault(CacheError::Disposed);
        slot.metadata = ExpirationMetadata::empty();
        slot.disposed = true;

        info!(cache = "eager", event = "dispose", "Eager expiring cache disposed");
    }
}

#[async_trait]
impl<T, C> RefreshTarget for EagerInner<T, C>
where
    T: Clone + Send + Sync + 'static,
    C: Clock,
{
    async fn refresh(&self) -> Option<chrono::Duration> {
        let metadata = self.produce().await.ok()?;
        let remaining = metadata.remaining(self.clock.now());
        self.publish(metadata);
        debug!(
            cache = "eager",
            event = "background_refresh",
            remaining_ms = remaining.num_milliseconds(),
            "Background refresh published a new value"
        );
        Some(remaining)
    }

    fn needs_refresh(&self) -> bool {
        let slot = self.slot.lock();
        !slot.disposed && !slot.metadata.has_value()
    }
}

/// Single-value cache refreshed ahead of expiry by a background task.
///
/// The background task is started by the first
/// [`get_value`](Self::get_value) call and lives until the cache is disposed
/// or dropped. Share the cache between tasks with an `Arc`.
///
/// # Type Parameters
///
/// * `T` - Cached value type (cloned out to every reader; wrap large values
///   in an `Arc`)
/// * `C` - Clock used for freshness checks (defaults to `SystemClock`)
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use expiring_lazy::{BoxError, EagerExpiringCache, ExpirationMetadata};
///
/// #[tokio::main]
/// async fn main() {
///     let cache = EagerExpiringCache::new(|_previous: ExpirationMetadata<String>| async move {
///         Ok::<_, BoxError>(ExpirationMetadata::new(
///             "access-token".to_string(),
///             Utc::now() + Duration::minutes(10),
///         ))
///     });
///
///     assert!(!cache.value_created());
///     assert_eq!(cache.get_value().await.unwrap(), "access-token");
///     assert!(cache.value_created());
///
///     cache.dispose();
///     assert!(cache.get_value().await.is_err());
/// }
/// ```
pub struct EagerExpiringCache<T, C = SystemClock>
where
    T: Clone + Send + Sync + 'static,
    C: Clock,
{
    inner: Arc<EagerInner<T, C>>,
}

impl<T> EagerExpiringCache<T, SystemClock>
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

impl<T, C> EagerExpiringCache<T, C>
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
            inner: Arc::new(EagerInner {
                provider: Box::new(provider),
                slot: Mutex::new(Slot {
                    metadata: ExpirationMetadata::empty(),
                    disposed: false,
                    recovering: false,
                }),
                gate: AsyncGate::new(),
                refresher: BackgroundRefresher::new(&options),
                clock,
            }),
        }
    }

    /// Returns `true` if a value is stored, fresh or not.
    pub fn value_created(&self) -> bool {
        self.inner.slot.lock().metadata.has_value()
    }

    /// Returns the current value, waiting for the first refresh if needed.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Disposed`] after [`dispose`](Self::dispose)
    /// - [`CacheError::Provider`] with the cached failure while the cache is
    ///   faulted, or the failure of an inline refresh
    pub async fn get_value(&self) -> CacheResult<T> {
        self.get_value_with_cancellation(&CancellationToken::new()).await
    }

    /// Like [`get_value`](Self::get_value), but gives up waiting for the
    /// first value with [`CacheError::Cancelled`] once `cancel` fires.
    ///
    /// Cancellation only affects this caller's wait; the background refresh
    /// keeps running.
    #[instrument(skip(self, cancel), fields(cache = "eager"))]
    pub async fn get_value_with_cancellation(&self, cancel: &CancellationToken) -> CacheResult<T> {
        let inner = &self.inner;
        inner.ensure_active()?;

        let weak = Arc::downgrade(&self.inner);
        let target: Weak<dyn RefreshTarget> = weak;
        inner.refresher.start_if_not_running(target);

        if inner.claim_recovery() {
            debug!(
                cache = "eager",
                event = "recovery_refresh",
                "Background refresher is stopped; spawning recovery refresh"
            );
            // Detached so a cancelled reader cannot strand the other waiters.
            let recovery = Arc::clone(&self.inner);
            tokio::spawn(async move {
                // Failures fault the gate; waiters observe them there.
                let _ = recovery.refresh_inline().await;
            });
        }

        inner.gate.wait(cancel).await?;

        if let Some(value) = inner.fresh_value()? {
            return Ok(value);
        }

        warn!(
            cache = "eager",
            event = "fallback_refresh",
            "Background refresher did not keep the value fresh; refreshing inline"
        );
        inner.refresh_inline().await
    }

    /// Drops the stored value (or cached failure) and closes the gate.
    ///
    /// The next `get_value` waits for a newly produced value. A running
    /// background refresher is woken to produce it right away.
    pub fn invalidate(&self) {
        {
            let mut slot = self.inner.slot.lock();
            if slot.disposed {
                return;
            }
            self.inner.gate.reset();
            slot.metadata = ExpirationMetadata::empty();
        }

        self.inner.refresher.wake();
        debug!(cache = "eager", event = "invalidate", "Eager expiring cache invalidated");
    }

    /// Stops the background refresher and clears the value. Idempotent.
    ///
    /// Every later `get_value` fails with [`CacheError::Disposed`]; pending
    /// waiters are woken with the same error.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.slot.lock().disposed
    }

    /// A copy of the stored metadata, fresh or not.
    pub fn snapshot(&self) -> ExpirationMetadata<T> {
        self.inner.snapshot()
    }

    /// The failure every reader currently observes, if the cache is faulted.
    pub fn cached_error(&self) -> Option<CacheError> {
        self.inner.gate.fault_error()
    }

    /// Lifecycle state of the background refresher.
    pub fn refresher_state(&self) -> RefresherState {
        self.inner.refresher.state()
    }
}

impl<T, C> fmt::Debug for EagerExpiringCache<T, C>
where
    T: Clone + Send + Sync + 'static,
    C: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerExpiringCache")
            .field("value_created", &self.value_created())
            .field("disposed", &self.is_disposed())
            .field("refresher", &self.inner.refresher)
            .finish_non_exhaustive()
    }
}

impl<T, C> Drop for EagerExpiringCache<T, C>
where
    T: Clone + Send + Sync + 'static,
    C: Clock,
{
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for eager.
    use std::time::Duration;

    use super::*;
    use crate::testing::{FailingProvider, SequenceProvider, Token};

    fn seconds(secs: i64) -> chrono::Duration {
        chrono::Duration::seconds(secs)
    }

    #[tokio::test]
    async fn value_not_created_before_first_get() {
        let provider = SequenceProvider::new(seconds(60));
        let cache = EagerExpiringCache::new(provider.clone());

        assert!(!cache.value_created());
        assert_eq!(cache.refresher_state(), RefresherState::Idle);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn first_get_starts_refresher_and_waits_for_value() {
        let provider = SequenceProvider::new(seconds(60)).with_delay(Duration::from_millis(50));
        let cache = EagerExpiringCache::new(provider.clone());

        let token = cache.get_value().await.expect("value produced");
        assert_eq!(token.serial, 1);
        assert!(cache.value_created());
        assert_eq!(cache.refresher_state(), RefresherState::Running);

        let again = cache.get_value().await.expect("cached value");
        assert_eq!(again, token);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_readers_share_first_value() {
        let provider = SequenceProvider::new(seconds(60)).with_delay(Duration::from_millis(100));
        let cache = Arc::new(EagerExpiringCache::new(provider.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.get_value().await }));
        }

        for handle in handles {
            let token = handle.await.expect("reader task").expect("value");
            assert_eq!(token.serial, 1);
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn provider_receives_previous_metadata() {
        let provider = SequenceProvider::new(chrono::Duration::milliseconds(50));
        let cache = EagerExpiringCache::new(provider.clone());

        cache.get_value().await.expect("first value");
        tokio::time::sleep(Duration::from_millis(120)).await;

        let hints = provider.hints();
        assert!(hints.len() >= 2, "expected a background refresh, got {hints:?}");
        assert_eq!(hints[0], None);
        assert_eq!(hints[1], Some(1));
    }

    #[tokio::test]
    async fn failure_is_cached_and_replayed() {
        let provider = FailingProvider::new();
        let cache: EagerExpiringCache<Token> = EagerExpiringCache::new(provider.clone());

        let first = cache.get_value().await.expect_err("provider fails");
        let second = cache.get_value().await.expect_err("failure replayed");

        let first = first.provider_error().expect("provider failure").clone();
        let second = second.provider_error().expect("provider failure").clone();
        assert!(first.ptr_eq(&second));
        assert_eq!(provider.calls(), 1);
        assert_eq!(cache.refresher_state(), RefresherState::Stopped);
    }

    #[tokio::test]
    async fn invalidate_after_failure_repopulates_inline() {
        let provider = SequenceProvider::new(seconds(60));
        provider.fail_next(1);
        let cache = EagerExpiringCache::new(provider.clone());

        assert!(cache.get_value().await.is_err());
        assert_eq!(cache.refresher_state(), RefresherState::Stopped);

        cache.invalidate();
        let token = cache.get_value().await.expect("recovered inline");
        assert_eq!(token.serial, 2);
        assert_eq!(cache.refresher_state(), RefresherState::Stopped);

        let cached = cache.get_value().await.expect("cached after recovery");
        assert_eq!(cached, token);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn recovery_after_failure_calls_provider_once() {
        let provider = SequenceProvider::new(seconds(60)).with_delay(Duration::from_millis(100));
        provider.fail_next(1);
        let cache = Arc::new(EagerExpiringCache::new(provider.clone()));

        assert!(cache.get_value().await.is_err());
        cache.invalidate();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_value().await })
            })
            .collect();

        for handle in handles {
            let token = handle.await.expect("reader task").expect("recovered value");
            assert_eq!(token.serial, 2);
        }
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn cancelled_recovery_reader_does_not_strand_others() {
        let provider = SequenceProvider::new(seconds(60)).with_delay(Duration::from_millis(100));
        provider.fail_next(1);
        let cache = EagerExpiringCache::new(provider.clone());

        assert!(cache.get_value().await.is_err());
        cache.invalidate();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cache.get_value_with_cancellation(&cancel).await.expect_err("cancelled");
        assert!(matches!(err, CacheError::Cancelled));

        let token = cache.get_value().await.expect("recovery still completes");
        assert_eq!(token.serial, 2);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn cached_error_tracks_fault_and_invalidate() {
        let provider = SequenceProvider::new(seconds(60));
        provider.fail_next(1);
        let cache = EagerExpiringCache::new(provider);

        assert!(cache.cached_error().is_none());
        let err = cache.get_value().await.expect_err("provider fails");
        let cached = cache.cached_error().expect("failure cached");
        assert!(cached
            .provider_error()
            .zip(err.provider_error())
            .is_some_and(|(cached, returned)| cached.ptr_eq(returned)));

        cache.invalidate();
        assert!(cache.cached_error().is_none());
    }

    #[tokio::test]
    async fn invalidate_during_background_refresh_does_not_refresh_twice() {
        let provider = SequenceProvider::new(seconds(60)).with_delay(Duration::from_millis(200));
        let cache = EagerExpiringCache::new(provider.clone());

        cache.get_value().await.expect("first value");
        cache.invalidate();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(provider.calls(), 2);

        // The second call is still in flight; its value is published anyway.
        cache.invalidate();
        let token = cache.get_value().await.expect("value from in-flight refresh");
        assert_eq!(token.serial, 2);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn invalidate_after_publish_still_wakes_loop() {
        let provider = SequenceProvider::new(seconds(60));
        let cache = EagerExpiringCache::new(provider.clone());

        for expected in 1..=4u64 {
            let token = cache.get_value().await.expect("value");
            assert_eq!(token.serial, expected);
            cache.invalidate();
        }
        assert_eq!(cache.refresher_state(), RefresherState::Running);
    }

    #[tokio::test]
    async fn empty_provider_result_is_a_failure() {
        let cache: EagerExpiringCache<u32> =
            EagerExpiringCache::new(|_previous: ExpirationMetadata<u32>| async move {
                Ok::<_, crate::BoxError>(ExpirationMetadata::<u32>::empty())
            });

        let err = cache.get_value().await.expect_err("empty result rejected");
        assert_eq!(err.to_string(), format!("value provider failed: {EMPTY_VALUE_MESSAGE}"));
        assert!(!cache.value_created());
    }

    #[tokio::test]
    async fn invalidate_clears_value_and_refreshes() {
        let provider = SequenceProvider::new(seconds(60));
        let cache = EagerExpiringCache::new(provider.clone());

        let first = cache.get_value().await.expect("first value");
        cache.invalidate();
        assert!(!cache.value_created());

        let second = cache.get_value().await.expect("refreshed value");
        assert_ne!(first, second);
        assert!(cache.value_created());
    }

    #[tokio::test]
    async fn stale_value_triggers_inline_refresh() {
        // Values expire immediately; the refresher can never keep up.
        let provider = SequenceProvider::new(chrono::Duration::milliseconds(-1));
        let options = ExpiringCacheOptions::builder()
            .min_refresh_delay(Duration::from_secs(3600))
            .build()
            .expect("valid options");
        let cache = EagerExpiringCache::with_options(provider.clone(), options);

        // The inline value is already expired too, but it is what the provider produced.
        let token = cache.get_value().await.expect("inline refresh result");
        assert_eq!(token.serial, 2);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn dispose_is_terminal_and_idempotent() {
        let provider = SequenceProvider::new(seconds(60));
        let cache = EagerExpiringCache::new(provider.clone());

        cache.get_value().await.expect("value");
        cache.dispose();
        cache.dispose();

        assert!(cache.is_disposed());
        assert!(!cache.value_created());
        assert_eq!(cache.refresher_state(), RefresherState::Stopped);
        assert!(matches!(cache.get_value().await, Err(CacheError::Disposed)));

        cache.invalidate();
        assert!(matches!(cache.get_value().await, Err(CacheError::Disposed)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispose_wakes_pending_readers() {
        let provider = SequenceProvider::new(seconds(60)).with_delay(Duration::from_millis(300));
        let cache = Arc::new(EagerExpiringCache::new(provider));

        let reader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_value().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.dispose();

        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader woke up")
            .expect("reader task");
        assert!(matches!(result, Err(CacheError::Disposed)));
    }

    #[tokio::test]
    async fn cancelled_wait_reports_cancelled() {
        let provider = SequenceProvider::new(seconds(60)).with_delay(Duration::from_secs(5));
        let cache = EagerExpiringCache::new(provider);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = cache.get_value_with_cancellation(&cancel).await.expect_err("cancelled");
        assert!(matches!(err, CacheError::Cancelled));
        assert!(!cache.is_disposed());
    }

    #[tokio::test]
    async fn background_refresh_replaces_value_before_reader_needs_it() {
        let provider = SequenceProvider::new(chrono::Duration::milliseconds(100));
        let cache = EagerExpiringCache::new(provider.clone());

        let first = cache.get_value().await.expect("first");
        tokio::time::sleep(Duration::from_millis(250)).await;

        let snapshot = cache.snapshot();
        let stored = snapshot.value().expect("value stored").clone();
        assert!(stored.serial > first.serial);
        assert!(provider.calls() >= 2);

        let current = cache.get_value().await.expect("current");
        assert!(current.serial >= stored.serial);
    }

    #[tokio::test]
    async fn dropping_cache_stops_background_loop() {
        let provider = SequenceProvider::new(chrono::Duration::milliseconds(20));
        let cache = EagerExpiringCache::new(provider.clone());

        cache.get_value().await.expect("value");
        drop(cache);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = provider.calls();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.calls(), calls);
    }
}
