//! Stable digests for change detection and cross-source deduplication.

use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Change-detection digest over the canonicalized posting text.
/// Lowercased so casing-only edits do not trigger re-classification.
pub fn content_hash(title: &str, raw_text: &str) -> String {
    let canonical = format!("{}|{}", title.to_lowercase(), raw_text.to_lowercase());
    sha256_hex(canonical.as_bytes())
}

/// Cross-source dedup key over `(company, title, location)`.
pub fn dedup_key(company: &str, title: &str, location: &str) -> String {
    let canonical = format!(
        "{}|{}|{}",
        company.to_lowercase(),
        title.to_lowercase(),
        location.to_lowercase()
    );
    sha256_hex(canonical.as_bytes())
}
