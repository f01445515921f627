use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

const SESSION_TOKEN_BYTES: usize = 32;
const REFERRAL_CODE_BYTES: usize = 4;

fn random_bytes<const N: usize>() -> anyhow::Result<[u8; N]> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf)
        .map_err(|e| anyhow::anyhow!("Failed to read OS randomness: {}", e))?;
    Ok(buf)
}

/// Opaque session token handed to the client. Only its hash is persisted.
pub fn generate_session_token() -> anyhow::Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<SESSION_TOKEN_BYTES>()?))
}

/// Eight upper-case hex characters.
pub fn generate_referral_code() -> anyhow::Result<String> {
    Ok(to_hex(&random_bytes::<REFERRAL_CODE_BYTES>()?).to_ascii_uppercase())
}

/// Random URL-safe nonce for the OAuth round trip.
pub fn generate_nonce() -> anyhow::Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<16>()?))
}

/// Hex-encoded SHA-256 of a session token.
pub fn hash_token(token: &str) -> String {
    to_hex(&Sha256::digest(token.as_bytes()))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
