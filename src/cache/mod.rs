//! # Result Cache
//!
//! Memoizes projected responses keyed by request identity.

pub mod key;
pub mod result;

pub use key::CacheKey;
pub use result::{CacheEntry, CacheMetrics, ResultCache};
