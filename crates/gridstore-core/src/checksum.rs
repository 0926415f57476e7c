//! Content checksums

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Checksum over a set of `(path, checksum)` pairs, independent of input order.
///
/// Used as the namespace-level checksum of a workspace.
pub fn aggregate_checksum<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut entries: Vec<_> = entries.into_iter().collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (path, checksum) in entries {
        hasher.update(path.as_bytes());
        hasher.update(b":");
        hasher.update(checksum.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let a = aggregate_checksum([("a.txt", "111"), ("b.txt", "222")]);
        let b = aggregate_checksum([("b.txt", "222"), ("a.txt", "111")]);
        assert_eq!(a, b);
        assert_ne!(a, aggregate_checksum([("a.txt", "111")]));
    }
}
