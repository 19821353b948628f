// File: codec.rs
//
// The purpose of this file is to define the pluggable codec that stored
// values pass through on their way in and out of the overlay.

/// Transforms values at the storage boundary. The overlay calls `wrap`
/// on every value it places and `unwrap` on every value it returns, and
/// otherwise treats the bytes as opaque. An at-rest encryption layer is
/// one implementation; the default is no codec at all.
pub trait ValueCodec: Send + Sync {
    fn wrap(&self, value: &[u8]) -> Vec<u8>;
    fn unwrap(&self, value: &[u8]) -> Vec<u8>;
}
