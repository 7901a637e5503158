//! Signed public stream tokens.
//!
//! A token is `<job id>.<signature>` where the signature is an HMAC-SHA256 of
//! the id's text form, encoded as unpadded URL-safe base64. The key is drawn
//! at random when the codec is created and never leaves the process, so
//! tokens die with the orchestrator just like the jobs they name.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hlsrelay_common::{Error, JobId, Result};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;
const DELIMITER: char = '.';

/// Issues and verifies stream tokens with a per-process key.
pub struct TokenCodec {
    key: [u8; KEY_LEN],
}

impl TokenCodec {
    /// Create a codec with a freshly generated random key.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        Self { key: rng.gen() }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.key).expect("HMAC key of any size is valid")
    }

    /// Derive the public token for `id`.
    pub fn issue(&self, id: JobId) -> String {
        let id = id.to_string();
        let mut mac = self.mac();
        mac.update(id.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{id}{DELIMITER}{signature}")
    }

    /// Verify `token` and return the job id it was issued for.
    ///
    /// Malformed tokens (wrong segment count, bad id, undecodable signature)
    /// and signature mismatches all yield [`Error::InvalidToken`]. The
    /// signature comparison is constant-time.
    pub fn verify(&self, token: &str) -> Result<JobId> {
        let mut parts = token.split(DELIMITER);
        let (Some(id_part), Some(sig_part), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidToken);
        };

        let id: JobId = id_part.parse().map_err(|_| Error::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(sig_part)
            .map_err(|_| Error::InvalidToken)?;

        let mut mac = self.mac();
        mac.update(id_part.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| Error::InvalidToken)?;

        Ok(id)
    }
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn issued_token_verifies() {
        let codec = TokenCodec::new();
        let id = JobId::new();
        let token = codec.issue(id);
        assert_eq!(codec.verify(&token).unwrap(), id);
    }

    #[test]
    fn token_shape() {
        let codec = TokenCodec::new();
        let id = JobId::new();
        let token = codec.issue(id);
        let (id_part, sig_part) = token.split_once('.').unwrap();
        assert_eq!(id_part, id.to_string());
        // 32 byte MAC -> 43 unpadded base64 chars
        assert_eq!(sig_part.len(), 43);
        assert!(!sig_part.contains('='));
        assert!(!sig_part.contains('+') && !sig_part.contains('/'));
    }

    #[test]
    fn issue_is_deterministic_per_key() {
        let codec = TokenCodec::new();
        let id = JobId::new();
        assert_eq!(codec.issue(id), codec.issue(id));
    }

    #[test]
    fn other_key_rejects() {
        let id = JobId::new();
        let token = TokenCodec::new().issue(id);
        assert_matches!(TokenCodec::new().verify(&token), Err(Error::InvalidToken));
    }

    #[test]
    fn every_single_char_signature_mutation_is_rejected() {
        let codec = TokenCodec::new();
        let token = codec.issue(JobId::new());
        let sig_start = token.find('.').unwrap() + 1;

        for pos in sig_start..token.len() {
            let original = token.as_bytes()[pos];
            for replacement in [b'A', b'z', b'0', b'-', b'_'] {
                if replacement == original {
                    continue;
                }
                let mut mutated = token.clone().into_bytes();
                mutated[pos] = replacement;
                let mutated = String::from_utf8(mutated).unwrap();
                assert_matches!(
                    codec.verify(&mutated),
                    Err(Error::InvalidToken),
                    "mutation at {pos} accepted"
                );
            }
        }
    }

    #[test]
    fn mutated_id_is_rejected() {
        let codec = TokenCodec::new();
        let token = codec.issue(JobId::new());
        let first = token.as_bytes()[0];
        let swapped = if first == b'a' { 'b' } else { 'a' };
        let mutated = format!("{swapped}{}", &token[1..]);
        assert_matches!(codec.verify(&mutated), Err(Error::InvalidToken));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let codec = TokenCodec::new();
        let token = codec.issue(JobId::new());
        let (id_part, sig_part) = token.split_once('.').unwrap();

        let cases = [
            String::new(),
            id_part.to_string(),
            format!("{id_part}."),
            format!("{token}.extra"),
            format!("{}.{sig_part}", &id_part[1..]),
            format!("{id_part}0.{sig_part}"),
            format!("{id_part}.{sig_part}=="),
            format!("{id_part}.!!!"),
            format!(".{sig_part}"),
        ];

        for case in &cases {
            assert_matches!(codec.verify(case), Err(Error::InvalidToken), "{case:?}");
        }
    }
}
