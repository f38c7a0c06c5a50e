//! Policy abstractions for the delivery queue.
//!
//! - [`RetryPolicy`]: attempt limit and exponential backoff

pub mod retry;

pub use retry::RetryPolicy;
