//! VNC authentication cipher.
//!
//! The password is truncated or zero-padded to 8 bytes and every byte has its
//! bit order reversed before it is used as a DES key. The 16-byte challenge
//! is then encrypted as two independent 8-byte ECB blocks.

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;
use rfb_core::CHALLENGE_SIZE;
use zeroize::{Zeroize, ZeroizeOnDrop};

const DES_BLOCK_SIZE: usize = 8;

/// A DES key ready for the VNC challenge transform. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DesKey([u8; 8]);

impl DesKey {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl std::fmt::Debug for DesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DesKey(..)")
    }
}

/// Reverse the bit order of a byte (bit 7 becomes bit 0).
pub fn reverse_bits(byte: u8) -> u8 {
    byte.reverse_bits()
}

/// Build the DES key for a VNC password.
pub fn derive_key(password: &[u8]) -> DesKey {
    let mut key = [0u8; 8];
    for (slot, &byte) in key.iter_mut().zip(password.iter()) {
        *slot = reverse_bits(byte);
    }
    DesKey(key)
}

/// Encrypt a challenge with `key`, one DES-ECB block at a time.
pub fn encrypt_challenge(key: &DesKey, challenge: &[u8; CHALLENGE_SIZE]) -> [u8; CHALLENGE_SIZE] {
    let cipher = Des::new(GenericArray::from_slice(key.as_bytes()));

    let mut out = *challenge;
    for chunk in out.chunks_exact_mut(DES_BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
    out
}
