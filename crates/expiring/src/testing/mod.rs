//! Testing utilities and helpers
//!
//! - **[`async_utils`]**: eventual assertions and timeouts for async tests
//! - **[`mocks`]**: scripted [`ValueProvider`](crate::ValueProvider)
//!   implementations that count calls and record the hints they receive
//!
//! ## Usage
//!
//! ```rust
//! use expiring_lazy::testing::SequenceProvider;
//! use expiring_lazy::LazyExpiringCache;
//!
//! # async fn example() {
//! let provider = SequenceProvider::new(chrono::Duration::seconds(30));
//! let cache = LazyExpiringCache::new(provider.clone());
//!
//! let token = cache.get_value().await.expect("token");
//! assert_eq!(token.serial, 1);
//! assert_eq!(provider.calls(), 1);
//! # }
//! ```

pub mod async_utils;
pub mod mocks;

// Note: `assert_eventually_async!` is exported at the crate root
pub use async_utils::timeout_ok;
pub use mocks::{FailingProvider, SequenceProvider, Token};
