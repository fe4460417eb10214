// rentscan/src/prelude.rs
//! Common imports.

pub use crate::central::{Central, CentralBuilder, CentralStatus, Disabled, Enabled};
pub use crate::config::{CentralConfig, DiscoveryConfig, RecoveryConfig, ServiceUuids};
pub use crate::gatt::{DiscoveryEngine, DiscoveryFailure, DiscoveryStage};
pub use crate::protocol::{Command, RentalMessage, RentalStatus, TargetMatcher};
pub use crate::recovery::{Failure, RecoveryLevel, RecoveryPolicy};
pub use crate::transport::{Transport, TransportEvent};
pub use crate::{
    Address, AddressKind, ConnHandle, Error, Handle, NotifyKind, Result, TagId, TransportError,
};

// Re-export small utilities for convenience
pub use crate::utils::{Backoff, Clock, SystemClock, bytes_to_hex, ms, parse_hex};
