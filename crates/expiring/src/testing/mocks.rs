//! Scripted value providers for tests
//!
//! Both providers are cheap to clone; clones share their call counters, so a
//! test can hand one clone to a cache and inspect the other.

#![allow(clippy::missing_panics_doc)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::error::BoxError;
use crate::metadata::ExpirationMetadata;
use crate::provider::ValueProvider;

type HintLog = Arc<Mutex<Vec<Option<u64>>>>;

/// Value handed out by [`SequenceProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    /// 1-based number of the provider call that produced this token
    pub serial: u64,
    /// Same instant as the metadata's `valid_until`
    pub valid_until: DateTime<Utc>,
}

impl Token {
    /// Returns `true` if the token has not expired at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}

/// Provider that returns a new [`Token`] on every call.
///
/// Each token is valid for `lifetime` from the moment it was produced
/// (negative lifetimes produce tokens that are already expired).
///
/// # Examples
///
/// ```
/// use expiring_lazy::testing::SequenceProvider;
///
/// let provider = SequenceProvider::new(chrono::Duration::seconds(5));
/// provider.fail_next(1);
/// assert_eq!(provider.calls(), 0);
/// ```
#[derive(Clone)]
pub struct SequenceProvider {
    lifetime: chrono::Duration,
    delay: Duration,
    clock: Arc<dyn Clock>,
    calls: Arc<AtomicUsize>,
    pending_failures: Arc<AtomicUsize>,
    hints: HintLog,
}

impl SequenceProvider {
    /// Tokens valid for `lifetime`, produced without delay.
    pub fn new(lifetime: chrono::Duration) -> Self {
        Self {
            lifetime,
            delay: Duration::ZERO,
            clock: Arc::new(SystemClock),
            calls: Arc::new(AtomicUsize::new(0)),
            pending_failures: Arc::new(AtomicUsize::new(0)),
            hints: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep for `delay` inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Compute expiry from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Make the next `times` calls fail.
    pub fn fail_next(&self, times: usize) {
        self.pending_failures.store(times, Ordering::SeqCst);
    }

    /// Number of calls so far, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Serial of the previous token passed to each call, in call order.
    pub fn hints(&self) -> Vec<Option<u64>> {
        self.hints.lock().clone()
    }
}

impl std::fmt::Debug for SequenceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceProvider")
            .field("lifetime", &self.lifetime)
            .field("delay", &self.delay)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ValueProvider<Token> for SequenceProvider {
    async fn provide(
        &self,
        previous: ExpirationMetadata<Token>,
    ) -> Result<ExpirationMetadata<Token>, BoxError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.hints.lock().push(previous.value.as_ref().map(|token| token.serial));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let fail = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(format!("provider failure on call {call}").into());
        }

        let valid_until = self.clock.now() + self.lifetime;
        let token = Token { serial: call as u64, valid_until };
        Ok(ExpirationMetadata::new(token, valid_until))
    }
}

/// Provider that always fails with `"provider failure #<n>"`.
#[derive(Debug, Clone, Default)]
pub struct FailingProvider {
    calls: Arc<AtomicUsize>,
}

impl FailingProvider {
    /// Create a new failing provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Send + 'static> ValueProvider<T> for FailingProvider {
    async fn provide(
        &self,
        _previous: ExpirationMetadata<T>,
    ) -> Result<ExpirationMetadata<T>, BoxError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err(format!("provider failure #{call}").into())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for testing::mocks.
    use super::*;
    use crate::clock::MockClock;

    #[tokio::test]
    async fn sequence_provider_numbers_calls_and_records_hints() {
        let clock = MockClock::new();
        let provider =
            SequenceProvider::new(chrono::Duration::seconds(10)).with_clock(clock.clone());

        let first = provider.provide(ExpirationMetadata::empty()).await.expect("first");
        let second = provider.provide(first.clone()).await.expect("second");

        assert_eq!(first.value().map(|t| t.serial), Some(1));
        assert_eq!(second.value().map(|t| t.serial), Some(2));
        assert_eq!(first.valid_until, clock.now() + chrono::Duration::seconds(10));
        assert_eq!(provider.hints(), vec![None, Some(1)]);
    }

    #[tokio::test]
    async fn fail_next_fails_exactly_that_many_calls() {
        let provider = SequenceProvider::new(chrono::Duration::seconds(10));
        provider.fail_next(2);

        assert!(provider.provide(ExpirationMetadata::empty()).await.is_err());
        assert!(provider.provide(ExpirationMetadata::empty()).await.is_err());
        let third = provider.provide(ExpirationMetadata::empty()).await.expect("third succeeds");

        assert_eq!(third.value().map(|t| t.serial), Some(3));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn failing_provider_counts_calls() {
        let provider = FailingProvider::new();
        let err = ValueProvider::<u8>::provide(&provider, ExpirationMetadata::empty())
            .await
            .expect_err("always fails");

        assert_eq!(err.to_string(), "provider failure #1");
        assert_eq!(provider.calls(), 1);
    }
}
