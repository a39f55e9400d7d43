//! Single-value async caches for expensive, time-bounded values.
//!
//! A typical use is a short-lived credential (an OAuth access token, a signed
//! URL, a lease) that is expensive to obtain and expires on its own schedule.
//! The value is produced by a [`ValueProvider`] which receives the previous
//! [`ExpirationMetadata`] as a hint and returns a new value together with its
//! expiry timestamp.
//!
//! # Refresh Strategies
//!
//! - [`LazyExpiringCache`]: pull-based. The first caller that finds the value
//!   expired refreshes it inline while concurrent callers wait on the same
//!   refresh. At most one provider call runs per expiration cycle.
//! - [`EagerExpiringCache`]: push-based. A background task refreshes the value
//!   just before it expires, so readers normally never pay for the provider
//!   call. Readers fall back to an inline refresh only when the background task
//!   has fallen behind.
//!
//! # Feature Flags
//!
//! - `serde`: `Serialize`/`Deserialize` for [`ExpiringCacheOptions`]
//! - `test-utils`: test fixtures in [`testing`]
//!
//! # Example
//!
//! ```no_run
//! use chrono::{Duration, Utc};
//! use expiring_lazy::{BoxError, EagerExpiringCache, ExpirationMetadata};
//!
//! # async fn example() -> Result<(), expiring_lazy::CacheError> {
//! let cache = EagerExpiringCache::new(|_previous: ExpirationMetadata<String>| async move {
//!     // fetch a fresh credential here
//!     Ok::<_, BoxError>(ExpirationMetadata::new(
//!         "token".to_string(),
//!         Utc::now() + Duration::minutes(5),
//!     ))
//! });
//!
//! let token = cache.get_value().await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod clock;
pub mod config;
pub mod eager;
pub mod error;
pub mod lazy;
pub mod metadata;
pub mod provider;
pub mod sync;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{ConfigError, ExpiringCacheOptions, ExpiringCacheOptionsBuilder};
pub use eager::{BackgroundRefresher, EagerExpiringCache, RefreshTarget, RefresherState};
pub use error::{
    BoxError, CacheError, CacheResult, ErrorClassification, ErrorSeverity, ProviderError,
};
pub use lazy::LazyExpiringCache;
pub use metadata::ExpirationMetadata;
pub use provider::ValueProvider;
pub use sync::AsyncGate;
pub use tokio_util::sync::CancellationToken;
