use sha2::{Digest, Sha256};

/// Assigns the correlation id used to match outputs back to inputs.
pub trait CorrelationProvider: Send + Sync {
    fn correlation_id(&self, data: &[u8]) -> String;
}

/// Lower-case SHA-256 hex of the item bytes. Identical images share an id.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashCorrelationProvider;

impl CorrelationProvider for HashCorrelationProvider {
    fn correlation_id(&self, data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }
}

/// A random v4 UUID per item.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidCorrelationProvider;

impl CorrelationProvider for UuidCorrelationProvider {
    fn correlation_id(&self, _data: &[u8]) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ids_are_stable_sha256_hex() {
        let provider = HashCorrelationProvider;
        assert_eq!(
            provider.correlation_id(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            provider.correlation_id(b"abc"),
            provider.correlation_id(b"abc")
        );
    }

    #[test]
    fn uuid_ids_are_unique() {
        let provider = UuidCorrelationProvider;
        let a = provider.correlation_id(b"same");
        let b = provider.correlation_id(b"same");
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
