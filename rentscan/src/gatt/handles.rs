// rentscan/src/gatt/handles.rs
//! Per-connection attribute handle bookkeeping.
//!
//! Everything here is only meaningful for the connection it was discovered
//! on. [`HandleTable::clear`] runs on every connect and disconnect.

use crate::types::{Handle, NotifyKind};
use crate::{Error, Result};

/// Handle span of the discovered primary service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServiceHandleRange {
    start: Handle,
    end: Handle,
}

impl ServiceHandleRange {
    /// Rejects ranges where `start` is not below `end`.
    pub fn new(start: Handle, end: Handle) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidHandleRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Handle {
        self.start
    }

    pub fn end(&self) -> Handle {
        self.end
    }

    pub fn contains(&self, handle: Handle) -> bool {
        (self.start..=self.end).contains(&handle)
    }
}

/// Value handles of the RX/TX characteristics. Each is written once per connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CharacteristicHandles {
    rx_value: Option<Handle>,
    tx_value: Option<Handle>,
}

impl CharacteristicHandles {
    pub fn rx_value(&self) -> Option<Handle> {
        self.rx_value
    }

    pub fn tx_value(&self) -> Option<Handle> {
        self.tx_value
    }

    /// Record the RX value handle once per connection.
    pub fn set_rx(&mut self, handle: Handle) -> Result<()> {
        Self::set_once(&mut self.rx_value, handle, "rx")
    }

    /// Record the TX value handle once per connection.
    pub fn set_tx(&mut self, handle: Handle) -> Result<()> {
        Self::set_once(&mut self.tx_value, handle, "tx")
    }

    fn set_once(slot: &mut Option<Handle>, handle: Handle, name: &'static str) -> Result<()> {
        if slot.is_some() {
            return Err(Error::HandleAlreadySet(name));
        }
        *slot = Some(handle);
        Ok(())
    }
}

/// Where the subscription stands with the peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SubscriptionPhase {
    #[default]
    Unsubscribed,
    Subscribing,
    Subscribed,
}

/// Notification subscription on the TX characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SubscriptionState {
    pub value_handle: Handle,
    pub ccc_handle: Handle,
    pub notify_kind: NotifyKind,
    pub phase: SubscriptionPhase,
    /// The CCC handle was guessed rather than discovered.
    pub degraded: bool,
}

impl SubscriptionState {
    pub fn new(value_handle: Handle, ccc_handle: Handle, notify_kind: NotifyKind) -> Self {
        Self {
            value_handle,
            ccc_handle,
            notify_kind,
            phase: SubscriptionPhase::Unsubscribed,
            degraded: false,
        }
    }

    /// Notifications are flowing.
    pub fn is_active(&self) -> bool {
        self.phase == SubscriptionPhase::Subscribed
    }
}

/// Everything discovered on the current connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleTable {
    range: Option<ServiceHandleRange>,
    chars: CharacteristicHandles,
    ccc: Option<Handle>,
    subscription: Option<SubscriptionState>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything recorded for the connection.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn range(&self) -> Option<ServiceHandleRange> {
        self.range
    }

    pub fn set_range(&mut self, range: ServiceHandleRange) -> Result<()> {
        if self.range.is_some() {
            return Err(Error::HandleAlreadySet("service"));
        }
        self.range = Some(range);
        Ok(())
    }

    pub fn characteristics(&self) -> &CharacteristicHandles {
        &self.chars
    }

    pub fn characteristics_mut(&mut self) -> &mut CharacteristicHandles {
        &mut self.chars
    }

    pub fn rx_value(&self) -> Option<Handle> {
        self.chars.rx_value()
    }

    pub fn tx_value(&self) -> Option<Handle> {
        self.chars.tx_value()
    }

    /// CCC descriptor found by canonical discovery.
    pub fn ccc(&self) -> Option<Handle> {
        self.ccc
    }

    /// Record the discovered CCC descriptor handle.
    pub fn set_ccc(&mut self, handle: Handle) -> Result<()> {
        if self.ccc.is_some() {
            return Err(Error::HandleAlreadySet("ccc"));
        }
        self.ccc = Some(handle);
        Ok(())
    }

    pub fn subscription(&self) -> Option<&SubscriptionState> {
        self.subscription.as_ref()
    }

    pub fn subscription_mut(&mut self) -> Option<&mut SubscriptionState> {
        self.subscription.as_mut()
    }

    /// Replace the subscription record. At most one exists per connection.
    pub fn set_subscription(&mut self, sub: SubscriptionState) {
        self.subscription = Some(sub);
    }

    pub fn subscription_active(&self) -> bool {
        self.subscription.is_some_and(|s| s.is_active())
    }
}
