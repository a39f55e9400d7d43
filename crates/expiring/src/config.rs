//! Cache options and builder.
//!
//! Options only shape refresh timing; they never change which value is
//! returned. With the defaults, a value is refreshed once it has expired.
//!
//! # Example
//! ```
//! use std::time::Duration;
//!
//! use expiring_lazy::ExpiringCacheOptions;
//!
//! let options = ExpiringCacheOptions::builder()
//!     .minimum_remaining_time(Duration::from_secs(20))
//!     .min_refresh_delay(Duration::from_millis(250))
//!     .build()
//!     .expect("valid options");
//!
//! assert_eq!(options.minimum_remaining_time, Duration::from_secs(20));
//! ```

use std::time::Duration;

use thiserror::Error;

/// Default floor for the background refresh delay.
pub const DEFAULT_MIN_REFRESH_DELAY: Duration = Duration::from_millis(100);

/// Options shared by the lazy and eager caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExpiringCacheOptions {
    /// Refresh once less than this much lifetime is left.
    ///
    /// The eager cache schedules its background refresh this long before
    /// expiry; the lazy cache treats values inside this window as stale.
    /// Zero means "refresh only once expired".
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub minimum_remaining_time: Duration,

    /// Smallest delay the background refresher sleeps between refreshes.
    ///
    /// Guards against a hot loop when the provider hands out values that are
    /// already expired (or expire inside `minimum_remaining_time`).
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub min_refresh_delay: Duration,
}

impl Default for ExpiringCacheOptions {
    fn default() -> Self {
        Self {
            minimum_remaining_time: Duration::ZERO,
            min_refresh_delay: DEFAULT_MIN_REFRESH_DELAY,
        }
    }
}

impl ExpiringCacheOptions {
    /// Create a new options builder
    pub fn builder() -> ExpiringCacheOptionsBuilder {
        ExpiringCacheOptionsBuilder::default()
    }

    /// Quick preset that refreshes `lead` ahead of expiry.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use expiring_lazy::ExpiringCacheOptions;
    ///
    /// let options = ExpiringCacheOptions::refresh_ahead(Duration::from_secs(30));
    /// assert_eq!(options.minimum_remaining_time, Duration::from_secs(30));
    /// ```
    pub fn refresh_ahead(lead: Duration) -> Self {
        Self { minimum_remaining_time: lead, ..Self::default() }
    }

    /// Validate the options.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_refresh_delay.is_zero() {
            return Err(ConfigError::Invalid {
                message: "min_refresh_delay must be greater than 0".to_string(),
            });
        }

        if chrono::Duration::from_std(self.minimum_remaining_time).is_err() {
            return Err(ConfigError::Invalid {
                message: "minimum_remaining_time is out of range".to_string(),
            });
        }

        Ok(())
    }

    /// `minimum_remaining_time` as a signed duration for expiry arithmetic.
    pub(crate) fn minimum_remaining(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.minimum_remaining_time).unwrap_or(chrono::Duration::MAX)
    }
}

/// Builder for ExpiringCacheOptions
#[derive(Debug, Default)]
pub struct ExpiringCacheOptionsBuilder {
    options: ExpiringCacheOptions,
}

impl ExpiringCacheOptionsBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh once less than `lead` lifetime is left
    pub fn minimum_remaining_time(mut self, lead: Duration) -> Self {
        self.options.minimum_remaining_time = lead;
        self
    }

    /// Floor for the background refresh delay
    pub fn min_refresh_delay(mut self, delay: Duration) -> Self {
        self.options.min_refresh_delay = delay;
        self
    }

    /// Validate and build the options
    pub fn build(self) -> ConfigResult<ExpiringCacheOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Invalid option values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An option is out of its allowed range
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// What is wrong
        message: String,
    },
}

/// Convenience type alias for option validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Serde helpers for `Duration` as milliseconds (u64).
#[cfg(feature = "serde")]
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serde serialization result type
    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    pub(super) fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
