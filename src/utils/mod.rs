//! Utility functions and helpers
//!
//! Cryptographic primitives and timestamp helpers used throughout the node.

pub mod crypto;

pub use crypto::{
    current_timestamp, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, new_key_pair,
    public_key_from_pkcs8, sha256_digest, sha256_hex,
};
