// rentscan/src/gatt/mod.rs
//! GATT side of a connection: the handle table and the discovery engine.

pub mod discovery;
pub mod handles;

pub use discovery::{DiscoveryEngine, DiscoveryFailure, DiscoveryStage};
pub use handles::{
    CharacteristicHandles, HandleTable, ServiceHandleRange, SubscriptionPhase, SubscriptionState,
};
