//! Upstream blockchain data provider integration
//!
//! - **Client** - HTTP client for the provider's JSON API
//! - **Payload** - Normalisation of provider JSON into records
//! - **Retry** - Retry policy, backoff schedules and the sleeper seam

pub mod client;
pub mod payload;
pub mod retry;

// Re-export main types
pub use client::{BlockchainSource, RawResponse, UpstreamClient};
pub use payload::normalise;
pub use retry::{calculate_next_backoff, Backoff, RetryPolicy, Sleeper, TokioSleeper};
