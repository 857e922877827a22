//! Identity matching.
//!
//! A viewer never says who it is. It only answers the challenge, so the
//! relay recomputes the expected answer for every identity on the roster and
//! picks the one that fits. Cost is one HMAC and two DES blocks per identity
//! per connection.

use rfb_core::CHALLENGE_SIZE;
use rfb_crypto::{expected_response, responses_match, Challenge};
use tracing::{debug, warn};

use crate::roster::Identity;

/// Find the identity whose derived credential produced `response`.
///
/// Identities without a secret are skipped. The first match in roster order
/// wins; two identities answering the same challenge identically would
/// require a credential collision.
pub fn match_identity<'a>(
    challenge: &Challenge,
    response: &[u8; CHALLENGE_SIZE],
    roster: &'a [Identity],
    label: &str,
) -> Option<&'a Identity> {
    for identity in roster {
        let Some(secret) = identity.secret.as_ref() else {
            debug!(identity_id = identity.id, "no backend credential, skipping");
            continue;
        };

        let expected = match expected_response(secret.as_bytes(), label, challenge) {
            Ok(expected) => expected,
            Err(e) => {
                warn!(identity_id = identity.id, "credential derivation failed: {}", e);
                continue;
            }
        };

        if responses_match(&expected, response) {
            return Some(identity);
        }
    }
    None
}
