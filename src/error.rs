//! Error types for cluster-dns.

use thiserror::Error;

/// Errors surfaced by the record engine and its server wrapper.
#[derive(Debug, Error)]
pub enum DnsError {
    /// Name is not present in the cache or reverse index.
    #[error("no records for the queried name")]
    NotFound,

    /// Query cannot be classified (wrong reverse suffix, bad pod label).
    #[error("malformed query: {0}")]
    BadRequest(String),

    /// A downstream lookup (object store, node list) failed; the query
    /// answers NotFound and the cause is logged.
    #[error("transient lookup failure: {0}")]
    Transient(String),

    /// Informer caches never reached the synced state within the startup
    /// timeout. Fatal.
    #[error("timed out waiting for initial sync after {0:?}")]
    SyncTimeout(std::time::Duration),

    /// Failed to parse an address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS protocol error from the wire front end.
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// Diagnostic serialization failure.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
