//! Per-identity session credentials.
//!
//! A backend's VNC password is not stored anywhere. It is recomputed from the
//! identity's secret as the first 8 hex characters of
//! `HMAC-SHA256(key = secret, message = label)`. Whatever provisions the
//! backend computes the same value, so the label is a contract between the
//! two systems: changing it locks every existing identity out.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::vnc_des::{derive_key, DesKey};
use crate::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Label used when provisioning desktop backends.
pub const DEFAULT_CREDENTIAL_LABEL: &str = "desktop-interact";

/// Length of a derived credential in ASCII characters.
pub const CREDENTIAL_LEN: usize = 8;

/// An 8-character VNC password derived from an identity secret.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedCredential([u8; CREDENTIAL_LEN]);

impl DerivedCredential {
    pub fn as_bytes(&self) -> &[u8; CREDENTIAL_LEN] {
        &self.0
    }

    /// The DES key this credential selects for VNC authentication.
    pub fn des_key(&self) -> DesKey {
        derive_key(&self.0)
    }
}

impl std::fmt::Debug for DerivedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedCredential(..)")
    }
}

/// Derive the credential for `secret` using [`DEFAULT_CREDENTIAL_LABEL`].
pub fn derive_credential(secret: &[u8]) -> Result<DerivedCredential, CryptoError> {
    derive_credential_with_label(secret, DEFAULT_CREDENTIAL_LABEL)
}

/// Derive the credential for `secret` under an explicit label.
pub fn derive_credential_with_label(
    secret: &[u8],
    label: &str,
) -> Result<DerivedCredential, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .map_err(|e| CryptoError::InvalidMacKey(e.to_string()))?;
    mac.update(label.as_bytes());
    let digest = mac.finalize().into_bytes();

    // 4 digest bytes hex-encode to exactly 8 characters.
    let mut hex_prefix = hex::encode(&digest[..CREDENTIAL_LEN / 2]).into_bytes();
    let mut out = [0u8; CREDENTIAL_LEN];
    out.copy_from_slice(&hex_prefix);
    hex_prefix.zeroize();

    Ok(DerivedCredential(out))
}
