// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! mysql_native_password
//!
//! client sends:  SHA1(password) XOR SHA1(salt + SHA1(SHA1(password)))
//! server stores: SHA1(SHA1(password))

use sha1::{Digest, Sha1};

pub const SCRAMBLE_LENGTH: usize = 20;

fn sha1(parts: &[&[u8]]) -> [u8; SCRAMBLE_LENGTH] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// The value a server keeps for a plaintext password.
pub fn double_sha1(password: &str) -> [u8; SCRAMBLE_LENGTH] {
    let stage1 = sha1(&[password.as_bytes()]);
    sha1(&[&stage1])
}

/// What a client computes from `password` and the server's `salt`.
pub fn scramble_password(password: &str, salt: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    // SHA1(password)
    let hash1 = sha1(&[password.as_bytes()]);

    // SHA1(SHA1(password))
    let hash2 = sha1(&[&hash1]);

    // SHA1(salt + SHA1(SHA1(password)))
    let hash3 = sha1(&[salt, &hash2]);

    // XOR hash1 and hash3
    hash1.iter()
        .zip(hash3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// Verify a client proof against the stored double hash without knowing the
/// plaintext password.
pub fn check_scramble(auth_response: &[u8], salt: &[u8], stored: &[u8; SCRAMBLE_LENGTH]) -> bool {
    if auth_response.len() != SCRAMBLE_LENGTH {
        return false;
    }

    let hash3 = sha1(&[salt, stored]);
    let candidate: Vec<u8> = auth_response.iter()
        .zip(hash3.iter())
        .map(|(a, b)| a ^ b)
        .collect();

    sha1(&[&candidate]) == *stored
}
