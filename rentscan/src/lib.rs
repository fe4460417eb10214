// rentscan/src/lib.rs

//! rentscan
//!
//! BLE central for the RentScan rental gateway: finds the main device by its
//! advertisement, connects, discovers the RentScan GATT service, subscribes to
//! its TX characteristic and recovers from link and controller failures with
//! an escalating policy.
#![warn(missing_docs)]

pub mod central;
pub mod config;
pub mod constants;
pub mod error;
pub mod gatt;
pub mod prelude;
pub mod protocol;
pub mod recovery;
pub mod shell;
#[cfg(feature = "async")]
pub mod supervisor;
pub mod test_support;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export common types at crate root so `crate::Error`, `crate::Result`,
// and the newtypes in `types` are available to consumers.
pub use crate::error::*;
pub use crate::types::*;

pub use prelude::*;
