use chrono::Duration;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use flock_types::Id;
use flock_types::api::Claims;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication token required")]
    Missing,

    #[error("invalid or expired token")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

/// The user a request or gateway connection is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Id,
    pub username: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
        }
    }
}

/// Verify an HS256 token. REST and the gateway both go through here so a
/// token minted at login is accepted by either.
pub fn verify_token(secret: &str, token: &str) -> Result<Identity, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims.into())
}

pub fn issue_token(secret: &str, user_id: Id, username: &str, ttl: Duration) -> Result<String, AuthError> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Pull the token out of an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::Missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_with_same_secret_only() {
        let token = issue_token("s3cret", 7, "alice", Duration::hours(1)).unwrap();

        let identity = verify_token("s3cret", &token).unwrap();
        assert_eq!(identity, Identity { user_id: 7, username: "alice".into() });

        assert!(matches!(verify_token("other", &token), Err(AuthError::Invalid(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token("s3cret", 7, "alice", Duration::hours(-2)).unwrap();
        assert!(verify_token("s3cret", &token).is_err());
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert!(bearer_token(Some("abc")).is_err());
        assert!(bearer_token(Some("Bearer ")).is_err());
        assert!(bearer_token(None).is_err());
    }
}
