//! Per-tenant authenticated encryption at rest (§4.2): HKDF-SHA256 derives
//! one ChaCha20-Poly1305 key per (tenant, column family, key version) from a
//! tenant's master key, so a leaked CF key never exposes another tenant's or
//! another CF's data. [Author fengyang]

pub mod aead;
pub mod engine;
pub mod kdf;
pub mod key;
pub mod keyring;

pub use aead::Cipher;
pub use engine::EncryptingEngine;
pub use kdf::MasterKey;
pub use key::Key;
pub use keyring::KeyRing;
