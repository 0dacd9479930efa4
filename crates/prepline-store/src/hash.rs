//! Blake3 content hashes for raw documents

/// Hex blake3 hash of raw bytes.
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// First 8 hex characters, for log lines.
pub fn short_hash(hex: &str) -> &str {
    &hex[..hex.len().min(8)]
}
