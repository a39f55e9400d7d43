//! Error types for the expiring caches.
//!
//! # Error Taxonomy
//!
//! | Variant | Raised when | Observed by |
//! |---------|-------------|-------------|
//! | **Provider** | The value provider failed | Lazy: the triggering caller. Eager: every waiter until the next successful refresh |
//! | **Disposed** | Any operation after `dispose()` | Every caller, forever |
//! | **Cancelled** | A caller's cancellation token fired while waiting | That caller only |
//!
//! Provider failures are wrapped once in a [`ProviderError`] and shared by
//! reference count afterwards, so the eager cache can replay the *same*
//! failure to every waiter instead of calling a failing provider again.
//! Use [`ProviderError::ptr_eq`] to check that two observed errors are the same
//! instance.
//!
//! ## ErrorClassification Trait
//!
//! [`CacheError`] implements [`ErrorClassification`] so callers can share retry
//! and alerting logic with the rest of their error types:
//!
//! - **`is_retryable()`**: provider failures and cancellations can be retried
//!   (after `invalidate()` for the eager cache), disposal cannot.
//! - **`severity()`**: how loud monitoring should be about it.
//! - **`is_critical()`**: never true for cache errors.
//! - **`retry_after()`**: no suggestion is made.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Boxed error returned by value providers.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Convenience type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by [`LazyExpiringCache`](crate::LazyExpiringCache) and
/// [`EagerExpiringCache`](crate::EagerExpiringCache).
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The value provider failed
    #[error("value provider failed: {0}")]
    Provider(#[from] ProviderError),

    /// The cache has been disposed
    #[error("cache has been disposed")]
    Disposed,

    /// The wait was cancelled by the caller
    #[error("wait for cached value was cancelled")]
    Cancelled,
}

impl CacheError {
    /// Returns the provider failure, if this is one.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(err) => Some(err),
            _ => None,
        }
    }

    /// Short machine-readable kind, used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider_failed",
            Self::Disposed => "disposed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A value provider failure, shared between every observer of it.
///
/// Cloning is cheap and preserves identity: all clones point at the same
/// underlying error.
#[derive(Clone)]
pub struct ProviderError {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl ProviderError {
    /// Wrap a provider failure.
    pub fn new(err: BoxError) -> Self {
        Self { inner: Arc::from(err) }
    }

    /// Build a provider failure from a plain message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::new(message.into())
    }

    /// Returns `true` if both errors are the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Access the underlying error.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.inner
    }
}

impl fmt::Debug for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderError").field(&self.inner).finish()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl StdError for ProviderError {
    // Display already renders `inner`, so the chain continues below it.
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

impl From<BoxError> for ProviderError {
    fn from(err: BoxError) -> Self {
        Self::new(err)
    }
}

/// Standard interface for classifying errors by their characteristics.
pub trait ErrorClassification {
    /// Check if this error is retryable
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for monitoring, alerting, and logging decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl ErrorClassification for CacheError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(_) | Self::Cancelled => true,
            Self::Disposed => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Provider(_) => ErrorSeverity::Error,
            Self::Disposed => ErrorSeverity::Warning,
            Self::Cancelled => ErrorSeverity::Info,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error.
    use super::*;

    #[test]
    fn provider_error_clones_share_identity() {
        let err = ProviderError::from_message("token endpoint unavailable");
        let clone = err.clone();
        let other = ProviderError::from_message("token endpoint unavailable");

        assert!(err.ptr_eq(&clone));
        assert!(!err.ptr_eq(&other));
    }

    #[test]
    fn provider_error_displays_inner_message() {
        let err = CacheError::from(ProviderError::from_message("boom"));
        assert_eq!(err.to_string(), "value provider failed: boom");
        assert_eq!(err.kind(), "provider_failed");
        assert!(err.provider_error().is_some());
    }

    #[derive(Debug, thiserror::Error)]
    #[error("token request failed")]
    struct RequestError(#[source] std::io::Error);

    #[test]
    fn provider_error_continues_inner_chain() {
        let message = ProviderError::from_message("boom");
        assert!(message.source().is_none());

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out");
        let wrapped = ProviderError::new(Box::new(RequestError(io)));
        let source = wrapped.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connect timed out"));
    }

    #[test]
    fn error_chain_reports_message_once() {
        let err = CacheError::from(ProviderError::from_message("boom"));

        let mut chain = vec![err.to_string()];
        let mut source = err.source();
        while let Some(next) = source {
            chain.push(next.to_string());
            source = next.source();
        }

        assert_eq!(chain, vec!["value provider failed: boom".to_string(), "boom".to_string()]);
    }

    #[test]
    fn classification_matches_variants() {
        let provider = CacheError::from(ProviderError::from_message("x"));
        assert!(provider.is_retryable());
        assert_eq!(provider.severity(), ErrorSeverity::Error);

        assert!(!CacheError::Disposed.is_retryable());
        assert_eq!(CacheError::Disposed.severity(), ErrorSeverity::Warning);

        assert!(CacheError::Cancelled.is_retryable());
        assert_eq!(CacheError::Cancelled.severity(), ErrorSeverity::Info);

        assert!(!CacheError::Disposed.is_critical());
        assert_eq!(CacheError::Cancelled.retry_after(), None);
    }

    #[test]
    fn severity_orders_and_displays() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }
}
