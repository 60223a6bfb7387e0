//! Small helpers shared across the record engine: reverse-name parsing,
//! leaf-key hashing, and the label grammars used by query classification.

use std::net::IpAddr;

use crate::error::DnsError;

/// Standard suffix for PTR IPv4 reverse lookups.
pub const ARPA_SUFFIX: &str = ".in-addr.arpa.";

/// Default port assumed for nameservers given without one.
pub const DEFAULT_DNS_PORT: &str = "53";

/// Turns a standard PTR reverse lookup name into an IP address string.
///
/// `"4.3.2.1.in-addr.arpa."` becomes `"1.2.3.4"`. Returns `None` when the
/// name does not carry the reverse-zone suffix. The result is not validated
/// as an IP; a nonsense name simply misses in the reverse index.
pub fn extract_ip(reverse_name: &str) -> Option<String> {
    let search = reverse_name.strip_suffix(ARPA_SUFFIX)?;
    let mut segments: Vec<&str> = search.split('.').collect();
    segments.reverse();
    Some(segments.join("."))
}

/// 32-bit FNV-1a over `data`.
///
/// Used to derive deterministic leaf keys from the canonical rendering of a
/// record payload. Kept local because the ecosystem `fnv` crate only exposes
/// the 64-bit variant and the leaf-key convention is 32-bit.
pub fn fnv1a_32(data: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 16_777_619;

    let mut hash = OFFSET_BASIS;
    for byte in data {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Splits and validates the ip and port of a nameserver address.
///
/// A bare IP gets the default DNS port. Otherwise the value must be
/// `host:port` (or `[v6]:port`) with an IP host and a port in `[1, 65535]`.
pub fn validate_nameserver(nameserver: &str) -> Result<(String, String), DnsError> {
    if let Ok(ip) = nameserver.parse::<IpAddr>() {
        return Ok((ip.to_string(), DEFAULT_DNS_PORT.to_string()));
    }

    let addr: std::net::SocketAddr = nameserver
        .parse()
        .map_err(|_| DnsError::InvalidAddress(nameserver.to_string()))?;
    if addr.port() == 0 {
        return Err(DnsError::InvalidAddress(nameserver.to_string()));
    }
    Ok((addr.ip().to_string(), addr.port().to_string()))
}

/// Joins an IP and port into a dialable address, bracketing IPv6 hosts.
pub fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Converts a dashed pod label (`"10-0-0-1"`) into a dotted IPv4 string,
/// or `None` when the label does not encode a valid address.
pub fn pod_label_ip(label: &str) -> Option<String> {
    let candidate = label.replace('-', ".");
    candidate.parse::<std::net::Ipv4Addr>().ok()?;
    Some(candidate)
}

const MAX_LABEL_LEN: usize = 63;
const MAX_SUBDOMAIN_LEN: usize = 253;

/// RFC 1035 label: starts with a letter, ends alphanumeric, interior may
/// include dashes. Service names follow this grammar.
pub fn is_rfc1035_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_LABEL_LEN {
        return false;
    }
    if !bytes[0].is_ascii_lowercase() {
        return false;
    }
    if !bytes[bytes.len() - 1].is_ascii_lowercase() && !bytes[bytes.len() - 1].is_ascii_digit() {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

/// RFC 1123 label: like RFC 1035 but may start with a digit. Namespaces and
/// federation names follow this grammar.
pub fn is_rfc1123_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_LABEL_LEN {
        return false;
    }
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

/// RFC 1123 subdomain: dot-separated RFC 1123 labels. Federation parent
/// domains must pass this check before CNAME synthesis.
pub fn is_rfc1123_subdomain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_SUBDOMAIN_LEN {
        return false;
    }
    domain.split('.').all(is_rfc1123_label)
}
