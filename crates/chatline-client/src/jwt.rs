//! Read-only access to the claims of the bearer token.
//!
//! Signatures are never checked here; the backend is the authority. The
//! claims are only used to show who is signed in and to skip requests with a
//! token that has visibly expired.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
    pub nickname: Option<String>,
    /// Expiry as Unix seconds.
    pub exp: Option<i64>,
}

/// Decode the payload segment of a JWT. Returns `None` for anything that is
/// not a three-part token with a base64url JSON payload.
pub fn parse_claims(token: &str) -> Option<Claims> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        debug!("Token is not a three-part JWT");
        return None;
    };

    let bytes = match URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "JWT payload is not base64url");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!(error = %e, "JWT payload is not a JSON object");
            None
        }
    }
}

/// A token without a readable `exp` claim counts as expired.
pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, chrono::Utc::now().timestamp())
}

fn is_token_expired_at(token: &str, now: i64) -> bool {
    match parse_claims(token).and_then(|c| c.exp) {
        Some(exp) => exp < now,
        None => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub email: Option<String>,
    pub name: String,
}

impl UserProfile {
    pub fn from_claims(claims: &Claims) -> Self {
        let name = claims
            .name
            .clone()
            .or_else(|| claims.preferred_username.clone())
            .or_else(|| claims.nickname.clone())
            .unwrap_or_else(|| "User".to_string());

        Self {
            email: claims.sub.clone().or_else(|| claims.email.clone()),
            name,
        }
    }
}

#[cfg(test)]
pub(crate) fn make_token(payload: &serde_json::Value) -> String {
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
    format!("eyJhbGciOiJIUzI1NiJ9.{}.c2ln", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_claims() {
        let token = make_token(&json!({"sub": "ada@example.com", "name": "Ada", "exp": 42}));
        let claims = parse_claims(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("ada@example.com"));
        assert_eq!(claims.name.as_deref(), Some("Ada"));
        assert_eq!(claims.exp, Some(42));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_claims(""), None);
        assert_eq!(parse_claims("only.two"), None);
        assert_eq!(parse_claims("a.!!!.c"), None);
        assert_eq!(parse_claims("a.b.c.d"), None);
    }

    #[test]
    fn test_expiry() {
        let token = make_token(&json!({"exp": 1_000}));
        assert!(!is_token_expired_at(&token, 999));
        assert!(is_token_expired_at(&token, 1_001));

        let no_exp = make_token(&json!({"sub": "x"}));
        assert!(is_token_expired_at(&no_exp, 0));
        assert!(is_token_expired("not-a-jwt"));
    }

    #[test]
    fn test_profile_name_fallbacks() {
        let claims = Claims {
            email: Some("bo@example.com".into()),
            nickname: Some("bo".into()),
            ..Default::default()
        };
        let profile = UserProfile::from_claims(&claims);
        assert_eq!(profile.name, "bo");
        assert_eq!(profile.email.as_deref(), Some("bo@example.com"));

        assert_eq!(UserProfile::from_claims(&Claims::default()).name, "User");
    }
}
