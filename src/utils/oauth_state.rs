use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried through Discord in the `state` query parameter.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthState {
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral: Option<String>,
    pub iat: usize,
    pub exp: usize,
}

pub fn encode_state(
    secret: &str,
    nonce: &str,
    referral: Option<&str>,
    ttl_seconds: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = OAuthState {
        nonce: nonce.to_string(),
        referral: referral
            .map(|code| code.trim().to_ascii_uppercase())
            .filter(|code| !code.is_empty()),
        iat: now,
        exp: now + ttl_seconds as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verifies signature and expiry, then checks the nonce against the cookie copy.
pub fn verify_state(
    secret: &str,
    token: &str,
    expected_nonce: &str,
) -> Result<OAuthState, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.leeway = 0;

    let claims = decode::<OAuthState>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?
    .claims;

    if claims.nonce != expected_nonce {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "oauth_state_test_secret_of_32_chars_min";

    #[test]
    fn state_carries_referral_code() {
        let token = encode_state(SECRET, "nonce-1", Some(" ab12cd34 "), 600).unwrap();
        let state = verify_state(SECRET, &token, "nonce-1").unwrap();
        assert_eq!(state.referral.as_deref(), Some("AB12CD34"));
    }

    #[test]
    fn nonce_mismatch_rejected() {
        let token = encode_state(SECRET, "nonce-1", None, 600).unwrap();
        assert!(verify_state(SECRET, &token, "other").is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = encode_state(SECRET, "n", None, 600).unwrap();
        assert!(verify_state("another_secret_that_is_also_32_chars!", &token, "n").is_err());
    }

    #[test]
    fn expired_state_rejected() {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = OAuthState {
            nonce: "n".into(),
            referral: None,
            iat: now - 1200,
            exp: now - 600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(verify_state(SECRET, &token, "n").is_err());
    }
}
