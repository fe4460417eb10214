// rentscan/src/protocol/advert.rs
//! Advertising data parsing and target matching.

use uuid::Uuid;

use crate::config::CentralConfig;
use crate::constants::uuid_from_wire;
use crate::transport::AdvReport;

/// AD types used for matching (Core Supplement, part A).
pub const AD_UUID128_INCOMPLETE: u8 = 0x06;
pub const AD_UUID128_COMPLETE: u8 = 0x07;
pub const AD_NAME_SHORT: u8 = 0x08;
pub const AD_NAME_COMPLETE: u8 = 0x09;

/// One length-type-value element of advertising data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdStructure<'a> {
    pub ad_type: u8,
    pub data: &'a [u8],
}

/// Iterator over the AD structures in a report. Stops at the first
/// zero-length or truncated element.
#[derive(Debug, Clone)]
pub struct AdStructures<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = AdStructure<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = *self.data.get(self.pos)? as usize;
        if len == 0 || self.pos + len >= self.data.len() {
            self.pos = self.data.len();
            return None;
        }
        let item = AdStructure {
            ad_type: self.data[self.pos + 1],
            data: &self.data[self.pos + 2..self.pos + 1 + len],
        };
        self.pos += len + 1;
        Some(item)
    }
}

/// Iterate the AD structures of an advertising payload. Stops at the first malformed entry.
pub fn ad_structures(data: &[u8]) -> AdStructures<'_> {
    AdStructures { data, pos: 0 }
}

/// Complete local name, if present and valid UTF-8.
pub fn complete_name(data: &[u8]) -> Option<&str> {
    ad_structures(data)
        .find(|ad| ad.ad_type == AD_NAME_COMPLETE)
        .and_then(|ad| std::str::from_utf8(ad.data).ok())
}

/// 128-bit service UUIDs listed in the report.
pub fn service_uuids128(data: &[u8]) -> Vec<Uuid> {
    ad_structures(data)
        .filter(|ad| matches!(ad.ad_type, AD_UUID128_INCOMPLETE | AD_UUID128_COMPLETE))
        .flat_map(|ad| ad.data.chunks_exact(16))
        .filter_map(|chunk| <[u8; 16]>::try_from(chunk).ok())
        .map(uuid_from_wire)
        .collect()
}

/// Decides whether an advertising report comes from a RentScan peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMatcher {
    name: String,
    service: Uuid,
}

impl TargetMatcher {
    pub fn new(name: impl Into<String>, service: Uuid) -> Self {
        Self {
            name: name.into(),
            service,
        }
    }

    /// Match the configured device name or service UUID.
    pub fn from_config(config: &CentralConfig) -> Self {
        Self::new(config.device_name.clone(), config.uuids.service)
    }

    /// Connectable, and either the complete name or the service UUID matches.
    pub fn matches(&self, report: &AdvReport) -> bool {
        if !report.connectable {
            return false;
        }
        complete_name(&report.data) == Some(self.name.as_str())
            || service_uuids128(&report.data).contains(&self.service)
    }
}

/// Build advertising data for a name and a 128-bit service UUID list.
pub fn build_adv_data(name: Option<&str>, uuids: &[Uuid]) -> Vec<u8> {
    let mut out = vec![0x02, 0x01, 0x06];
    if !uuids.is_empty() {
        out.push((uuids.len() * 16 + 1) as u8);
        out.push(AD_UUID128_COMPLETE);
        for u in uuids {
            out.extend_from_slice(&crate::constants::uuid_to_wire(u));
        }
    }
    if let Some(name) = name {
        out.push((name.len() + 1) as u8);
        out.push(AD_NAME_COMPLETE);
        out.extend_from_slice(name.as_bytes());
    }
    out
}
