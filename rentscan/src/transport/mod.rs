// rentscan/src/transport/mod.rs
//! Access to the BLE host stack, plus an in-memory peer for tests.

pub mod mock;
pub mod traits;

pub use mock::{MockTransport, SharedMockTransport};
pub use traits::{
    AdvReport, Attribute, AttributeKind, ConnInfo, ConnParams, ConnState, DiscoverKind,
    DiscoverRequest, ScanParams, SubscribeParams, Transport, TransportEvent, TransportResult,
};
