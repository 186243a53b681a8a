//! Leaf domain atoms for the complaint system.
//!
//! Each atom follows the same split: `model` (serde types), `store` (the seam to
//! the external service plus its AWS implementation) and `service` (the
//! operations callers use, routed through [`RetryPolicy`]). `http` modules turn
//! service results into lambda responses.

pub mod complaints;
pub mod error;
pub mod http;
pub mod media;
pub mod retry;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

pub use error::{AtomError, Result};
pub use retry::RetryPolicy;
