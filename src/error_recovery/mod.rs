//! Caller-side error recovery
//!
//! Nothing in the client or the registry façade retries; wrap an operation in
//! a [`RetryExecutor`] when a retry is wanted.

pub mod retry_policy;

pub use retry_policy::{
    BackoffStrategy, JitterConfig, JitterType, RetryBuilder, RetryExecutor, RetryPolicy,
    RetryStats,
};
