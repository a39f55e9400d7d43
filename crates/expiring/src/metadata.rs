//! A cached value paired with its expiry timestamp.

use chrono::{DateTime, Duration, Utc};

/// A value together with the instant it stops being valid.
///
/// `value` is `None` only in the initial or invalidated state. A stored value
/// whose `valid_until` is already in the past is a legal, detectable state
/// (stale), not a broken one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationMetadata<T> {
    /// The cached value, if one has been produced
    pub value: Option<T>,

    /// Expiry timestamp of `value`
    pub valid_until: DateTime<Utc>,
}

impl<T> ExpirationMetadata<T> {
    /// Metadata for a value valid until the given timestamp.
    pub fn new(value: T, valid_until: DateTime<Utc>) -> Self {
        Self { value: Some(value), valid_until }
    }

    /// Metadata for a value valid for `ttl` starting at `now`.
    pub fn valid_for(value: T, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self::new(value, now + ttl)
    }

    /// The initial (and invalidated) state: no value, already expired.
    pub fn empty() -> Self {
        Self { value: None, valid_until: DateTime::<Utc>::MIN_UTC }
    }

    /// Returns `true` if a value has been stored.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Time left until expiry; zero or negative means expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.valid_until.signed_duration_since(now)
    }

    /// Returns `true` if there is no value or the value has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_fresh_at(now, Duration::zero())
    }

    /// Returns `true` if a value is present and more than `minimum_remaining`
    /// of its lifetime is left at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, minimum_remaining: Duration) -> bool {
        self.has_value() && self.remaining(now) > minimum_remaining
    }

    /// Borrow the stored value.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Consume the metadata and return the stored value.
    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

impl<T: Clone> ExpirationMetadata<T> {
    /// Clone the stored value if it is fresh at `now`.
    pub(crate) fn fresh_value(&self, now: DateTime<Utc>, minimum_remaining: Duration) -> Option<T> {
        if self.is_fresh_at(now, minimum_remaining) {
            self.value.clone()
        } else {
            None
        }
    }
}

impl<T> Default for ExpirationMetadata<T> {
    fn default() -> Self {
        Self::empty()
    }
}
