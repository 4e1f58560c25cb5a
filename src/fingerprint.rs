use sha2::Digest as _;

/// Length of a rendered digest (SHA-256, lowercase hex).
pub const DIGEST_HEX_LEN: usize = 64;

/// Digest of normalized page text, used only as a cheap equality gate.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
