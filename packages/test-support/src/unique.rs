//! Unique test data, so parallel tests against a shared database never collide
//! on keys they did not mean to share.

use ulid::Ulid;

/// A random code of exactly `len` characters (at most 16), for fixed-width
/// key columns such as `char(5)`.
///
/// Taken from the random half of a ULID, so codes generated in the same
/// millisecond still differ.
pub fn unique_code(len: usize) -> String {
    let encoded = Ulid::new().to_string();
    let start = encoded.len() - len.min(16);
    encoded[start..].to_string()
}
