/* src/build/core/src/hash.rs */

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`, truncated to `hex_len` characters.
pub fn content_hash(data: &[u8], hex_len: usize) -> String {
  let mut hex = hex::encode(Sha256::digest(data));
  hex.truncate(hex_len);
  hex
}
