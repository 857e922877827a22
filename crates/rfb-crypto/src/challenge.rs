//! Authentication challenges and response checking.

use rand::{rngs::OsRng, RngCore};
use rfb_core::CHALLENGE_SIZE;
use subtle::ConstantTimeEq;

use crate::credential::derive_credential_with_label;
use crate::vnc_des::encrypt_challenge;
use crate::CryptoError;

/// A 16-byte challenge. Generate a fresh one for every connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge([u8; CHALLENGE_SIZE]);

impl Challenge {
    /// Draw a new challenge from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; CHALLENGE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHALLENGE_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Challenge(..)")
    }
}

/// The response an identity holding `secret` must give to `challenge`.
pub fn expected_response(
    secret: &[u8],
    label: &str,
    challenge: &Challenge,
) -> Result<[u8; CHALLENGE_SIZE], CryptoError> {
    let credential = derive_credential_with_label(secret, label)?;
    Ok(encrypt_challenge(&credential.des_key(), challenge.as_bytes()))
}

/// Constant-time comparison of two challenge responses.
pub fn responses_match(expected: &[u8; CHALLENGE_SIZE], presented: &[u8; CHALLENGE_SIZE]) -> bool {
    expected[..].ct_eq(&presented[..]).into()
}
