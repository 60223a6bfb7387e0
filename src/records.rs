//! DNS record payloads as stored in the tree cache and reverse index.

use serde::{Deserialize, Serialize};

use crate::util::fnv1a_32;

/// Default priority for service records.
pub const DEFAULT_PRIORITY: u16 = 10;
/// Default weight for service records.
pub const DEFAULT_WEIGHT: u16 = 10;
/// Default TTL for service records, in seconds.
pub const DEFAULT_TTL: u32 = 30;

/// An immutable record payload.
///
/// `host` is either an IPv4/IPv6 text form (A/AAAA) or an FQDN target
/// (CNAME/SRV). A port of 0 denotes an address-only record. Payloads are
/// shared between the tree cache and the reverse index behind `Arc`, so
/// they are never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordValue {
    /// IP text form or FQDN target.
    pub host: String,
    /// Service port; 0 for address-only records.
    pub port: u16,
    /// SRV priority.
    pub priority: u16,
    /// SRV weight.
    pub weight: u16,
    /// Time to live, in seconds.
    pub ttl: u32,
}

impl RecordValue {
    /// Creates a payload with the default priority, weight, and TTL.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            priority: DEFAULT_PRIORITY,
            weight: DEFAULT_WEIGHT,
            ttl: DEFAULT_TTL,
        }
    }

    /// Canonical string rendering used for leaf-key hashing and diagnostics.
    pub fn render(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.host, self.port, self.priority, self.weight, self.ttl
        )
    }

    /// Deterministic leaf key: lowercase hex FNV-1a-32 of the rendering.
    pub fn label(&self) -> String {
        format!("{:x}", fnv1a_32(self.render().as_bytes()))
    }
}
