//! Deterministic bucketing of identifiers into rollout buckets.
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Number of buckets an identifier can land in. Bucket indices are `0..TOTAL_BUCKETS`.
pub const TOTAL_BUCKETS: u8 = 100;

pub trait Sharder {
    /// Map `identifier` to a bucket in `0..TOTAL_BUCKETS`, using `salt` to make the mapping
    /// independent between flags.
    fn bucket_index(&self, identifier: &str, salt: &str) -> u8;
}

/// The default sharder.
///
/// Computes HMAC-SHA256 of the identifier keyed by the salt and derives the bucket from the tail
/// of the hex digest: the last two hex digits are read as an integer and the last two digits of
/// that integer's decimal representation form the bucket. Buckets previously assigned to users
/// depend on this exact derivation, so it must not change.
#[derive(Debug, Default, Clone, Copy)]
pub struct HmacSha256Sharder;

impl Sharder for HmacSha256Sharder {
    fn bucket_index(&self, identifier: &str, salt: &str) -> u8 {
        let mut mac =
            HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC can take any size key");
        mac.update(identifier.as_bytes());
        let hex_digest = hex::encode(mac.finalize().into_bytes());

        let tail = u8::from_str_radix(&hex_digest[hex_digest.len() - 2..], 16)
            .expect("hex digest contains only hex digits");
        let decimal = tail.to_string();
        decimal[decimal.len().saturating_sub(2)..]
            .parse()
            .expect("decimal representation contains only digits")
    }
}

#[cfg(test)]
pub struct FixedSharder(pub u8);

#[cfg(test)]
impl Sharder for FixedSharder {
    fn bucket_index(&self, _identifier: &str, _salt: &str) -> u8 {
        self.0 % TOTAL_BUCKETS
    }
}
