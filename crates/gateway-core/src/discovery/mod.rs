//! Service discovery with retry.

pub mod locator;
pub mod retry;

pub use locator::ServiceLocator;
pub use retry::{retry_until_found, RetryConfig, RetryError, RetryStats};
