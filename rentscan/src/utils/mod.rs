//! Small helpers shared across the crate: hex formatting for log output,
//! the injectable clock, and the retry-with-backoff helper used for
//! transient transport errors.

pub mod clock;
pub mod hex;
pub mod retry;

pub use clock::*;
pub use hex::*;
pub use retry::*;
