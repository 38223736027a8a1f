use sha2::{Sha256, Digest};

/// Length of the fingerprint appended to clashing upload names.
pub const SHORT_LEN: usize = 7;

pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn short_fingerprint(data: &[u8]) -> String {
    let mut full = fingerprint(data);
    full.truncate(SHORT_LEN);
    full
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_known_value() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(short_fingerprint(b"abc"), "ba7816b");
    }
}
