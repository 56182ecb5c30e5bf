//! Salted SHA-256 password hashing

use rand::RngCore;
use sha2::{Digest, Sha256};

/// 16 random bytes, hex encoded (32 characters)
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

/// Hex SHA-256 of `password || salt`
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    to_hex(&hasher.finalize())
}

pub fn verify_password(password: &str, hash: &str, salt: &str) -> bool {
    hash_password(password, salt) == hash
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
