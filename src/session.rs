//! Signed, time-boxed session tokens.
//!
//! Replaces ambient client-side auth state with an explicit
//! [`SessionContext`] handed to request handlers, and a dedicated
//! refresh boundary instead of silent expiry. Tokens are
//! `base64url(claims JSON) + "." + base64url(HMAC-SHA256 signature)`
//! with a 2-hour expiry claim by default.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SessionConfig;
use crate::users::UserData;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session token is malformed")]
    Malformed,

    #[error("session token signature does not verify")]
    BadSignature,

    #[error("session token expired")]
    Expired,

    #[error("session secret is not configured")]
    MissingSecret,
}

/// Environment variable holding the signing secret.
pub const SECRET_ENV: &str = "COLAUNCH_SESSION_SECRET";

pub fn secret_from_env() -> Result<String, SessionError> {
    match std::env::var(SECRET_ENV) {
        Ok(secret) if !secret.trim().is_empty() => Ok(secret),
        _ => Err(SessionError::MissingSecret),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user: UserData,
    /// Issued-at, unix seconds
    pub iat: i64,
    /// Expiry, unix seconds
    pub exp: i64,
}

/// A verified session: the claims plus the encoded token they came from.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub claims: SessionClaims,
    pub token: String,
}

impl SessionContext {
    /// Issue a fresh session for a user.
    pub fn issue(user: UserData, secret: &str, config: &SessionConfig) -> SessionContext {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            user,
            iat: now,
            exp: now + config.ttl_secs,
        };
        let token = encode(&claims, secret);
        SessionContext { claims, token }
    }

    /// Verify a token: signature first, then expiry, then claims shape.
    pub fn verify(token: &str, secret: &str) -> Result<SessionContext, SessionError> {
        let (payload_b64, sig_b64) = token.split_once('.').ok_or(SessionError::Malformed)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| SessionError::Malformed)?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| SessionError::Malformed)?;

        let expected = hmac_sha256(secret.as_bytes(), &payload);
        if !constant_time_eq(&sig, &expected) {
            return Err(SessionError::BadSignature);
        }

        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| SessionError::Malformed)?;

        if claims.exp <= chrono::Utc::now().timestamp() {
            return Err(SessionError::Expired);
        }

        Ok(SessionContext {
            claims,
            token: token.to_string(),
        })
    }

    /// Whether the token is inside the refresh window before expiry.
    pub fn needs_refresh(&self, config: &SessionConfig) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.claims.exp - now <= config.refresh_window_secs
    }

    /// Reissue with a fresh expiry. The refresh boundary: callers check
    /// [`needs_refresh`](Self::needs_refresh) and swap the stored token.
    pub fn refresh(&self, secret: &str, config: &SessionConfig) -> SessionContext {
        SessionContext::issue(self.claims.user.clone(), secret, config)
    }
}

fn encode(claims: &SessionClaims, secret: &str) -> String {
    let payload = serde_json::to_vec(claims).expect("session claims serialize");
    let sig = hmac_sha256(secret.as_bytes(), &payload);
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload),
        URL_SAFE_NO_PAD.encode(sig)
    )
}

const SHA256_BLOCK: usize = 64;

/// HMAC-SHA256 per RFC 2104.
fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut block = [0u8; SHA256_BLOCK];
    if key.len() > SHA256_BLOCK {
        block[..32].copy_from_slice(&Sha256::digest(key));
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let mut ipad = [0x36u8; SHA256_BLOCK];
    let mut opad = [0x5cu8; SHA256_BLOCK];
    for i in 0..SHA256_BLOCK {
        ipad[i] ^= block[i];
        opad[i] ^= block[i];
    }

    let mut inner = Sha256::new();
    inner.update(ipad);
    inner.update(message);
    let inner = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(opad);
    outer.update(inner);
    outer.finalize().into()
}

/// Constant-time byte comparison. Length mismatch still walks the
/// shorter input before failing.
fn constant_time_eq(provided: &[u8], expected: &[u8]) -> bool {
    if provided.is_empty() || expected.is_empty() {
        return false;
    }

    let len_match = provided.len() == expected.len();

    let mut diff: u8 = 0;
    for (a, b) in provided.iter().zip(expected.iter()) {
        diff |= a ^ b;
    }

    len_match && diff == 0
}

/// Extracts the bearer token from an Authorization header value.
///
/// Expected format: "Bearer <token>"
/// Returns `None` if the header doesn't match the expected format.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();

    // Case-insensitive "Bearer " prefix check (RFC 6750 allows case-insensitive)
    if header.len() < 7 {
        return None;
    }

    let (prefix, token) = header.split_at(7);
    if prefix.eq_ignore_ascii_case("Bearer ") {
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    } else {
        None
    }
}

/// Validates a provided token against the expected token using
/// constant-time comparison.
pub fn validate_token(provided: &str, expected: &str) -> bool {
    constant_time_eq(provided.as_bytes(), expected.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eid::Eid;
    use crate::users::UserType;

    const SECRET: &str = "test-secret";

    fn user() -> UserData {
        UserData {
            id: Eid::new(),
            email: "founder@example.com".to_string(),
            name: "Founder".to_string(),
            user_type: UserType::Founder,
            ..Default::default()
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            ttl_secs: 7200,
            refresh_window_secs: 600,
        }
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let session = SessionContext::issue(user(), SECRET, &config());
        let verified = SessionContext::verify(&session.token, SECRET).unwrap();
        assert_eq!(verified.claims.user.email, "founder@example.com");
        assert_eq!(verified.claims.exp - verified.claims.iat, 7200);
    }

    #[test]
    fn test_tampered_payload_fails() {
        let session = SessionContext::issue(user(), SECRET, &config());

        let mut claims = session.claims.clone();
        claims.user.email = "attacker@example.com".to_string();
        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let original_sig = session.token.split_once('.').unwrap().1;
        let forged = format!("{forged_payload}.{original_sig}");

        assert!(matches!(
            SessionContext::verify(&forged, SECRET),
            Err(SessionError::BadSignature)
        ));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let session = SessionContext::issue(user(), SECRET, &config());
        assert!(matches!(
            SessionContext::verify(&session.token, "other-secret"),
            Err(SessionError::BadSignature)
        ));
    }

    #[test]
    fn test_expired_token_fails() {
        let expired = SessionContext::issue(
            user(),
            SECRET,
            &SessionConfig {
                ttl_secs: -1,
                refresh_window_secs: 0,
            },
        );
        assert!(matches!(
            SessionContext::verify(&expired.token, SECRET),
            Err(SessionError::Expired)
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            SessionContext::verify("not-a-token", SECRET),
            Err(SessionError::Malformed)
        ));
        assert!(matches!(
            SessionContext::verify("a.b", SECRET),
            Err(SessionError::Malformed)
        ));
    }

    #[test]
    fn test_refresh_window() {
        let config = config();

        let fresh = SessionContext::issue(user(), SECRET, &config);
        assert!(!fresh.needs_refresh(&config));

        let near_expiry = SessionContext::issue(
            user(),
            SECRET,
            &SessionConfig {
                ttl_secs: 60,
                refresh_window_secs: 600,
            },
        );
        assert!(near_expiry.needs_refresh(&config));

        let refreshed = near_expiry.refresh(SECRET, &config);
        assert!(!refreshed.needs_refresh(&config));
        assert!(SessionContext::verify(&refreshed.token, SECRET).is_ok());
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer secret123"), Some("secret123"));
        assert_eq!(extract_bearer_token("bearer secret123"), Some("secret123"));
        assert_eq!(extract_bearer_token("Basic secret123"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token(""), None);
    }

    #[test]
    fn test_validate_token_constant_time_compare() {
        assert!(validate_token("secret123", "secret123"));
        assert!(!validate_token("secret123", "SECRET123"));
        assert!(!validate_token("short", "longer"));
        assert!(!validate_token("", ""));
    }

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2
        let sig = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig.to_vec(),
            hex("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
    }

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }
}
