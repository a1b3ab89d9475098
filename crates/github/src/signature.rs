//! Webhook delivery signature verification. Deliveries carry
//! `X-Hub-Signature-256: sha256=<hex hmac>` computed over the raw body with
//! the shared webhook secret; anything that fails here is rejected at the
//! HTTP boundary and never reaches the ingest layer.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is missing")]
    MissingHeader,
    #[error("signature header is malformed")]
    MalformedHeader,
    #[error("signature does not match the delivery body")]
    Mismatch,
}

pub fn verify_signature(
    secret: &str,
    body: &[u8],
    signature_header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = signature_header.ok_or(SignatureError::MissingHeader)?;
    let hex_digest =
        header.strip_prefix("sha256=").ok_or(SignatureError::MalformedHeader)?;
    let expected = decode_hex(hex_digest).ok_or(SignatureError::MalformedHeader)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MalformedHeader)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256=");
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }

    (0..input.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(input.get(index..index + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{sign_body, verify_signature, SignatureError};

    const SECRET: &str = "hook-secret";
    const BODY: &[u8] = br#"{"action":"closed"}"#;

    #[test]
    fn accepts_a_correctly_signed_body() {
        let header = sign_body(SECRET, BODY);
        assert_eq!(verify_signature(SECRET, BODY, Some(&header)), Ok(()));
    }

    #[test]
    fn rejects_missing_and_malformed_headers() {
        assert_eq!(verify_signature(SECRET, BODY, None), Err(SignatureError::MissingHeader));
        assert_eq!(
            verify_signature(SECRET, BODY, Some("sha1=abcd")),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            verify_signature(SECRET, BODY, Some("sha256=not-hex")),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn rejects_a_tampered_body() {
        let header = sign_body(SECRET, BODY);
        assert_eq!(
            verify_signature(SECRET, br#"{"action":"opened"}"#, Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_a_signature_from_another_secret() {
        let header = sign_body("other-secret", BODY);
        assert_eq!(verify_signature(SECRET, BODY, Some(&header)), Err(SignatureError::Mismatch));
    }
}
