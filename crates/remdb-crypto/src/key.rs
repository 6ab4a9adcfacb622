//! Key material that is zeroed on drop.
//!
//! The teacher pack's `harborgrid-justin-caddy` pulls in the `zeroize` crate
//! for this; this crate hand-rolls the same guarantee with a `Drop` impl
//! instead, since zeroing 32 bytes doesn't warrant a dependency and nothing
//! else in this workspace needs `zeroize`'s derive machinery.

use std::fmt;

pub const KEY_LEN: usize = 32;

/// 256-bit key material, volatile-written to zero when dropped.
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Key(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        for byte in self.0.iter_mut() {
            unsafe { std::ptr::write_volatile(byte, 0) };
        }
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key").field("bytes", &"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn debug_redacts_key_material() {
        let key = Key::new([0xAB; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "Key { bytes: \"[REDACTED]\" }");
    }

    #[test]
    fn as_bytes_returns_the_stored_material() {
        let key = Key::new([0x01; KEY_LEN]);
        assert_eq!(key.as_bytes(), &[0x01; KEY_LEN]);
    }
}
