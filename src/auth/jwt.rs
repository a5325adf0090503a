use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{AuthError, TOKEN_AUDIENCE};

/// The subset of Supabase access-token claims the backend reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub aud: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidSubject(self.sub.clone()))
    }
}

#[cfg(test)]
fn now() -> usize {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or_default()
}

/// Issues a token shaped like the ones Supabase Auth hands out. Production
/// tokens come from Supabase.
#[cfg(test)]
pub fn generate_token(
    secret: &str,
    user_id: Uuid,
    email: Option<&str>,
    expires_in: usize,
) -> Result<String, AuthError> {
    let iat = now();
    let claims = Claims {
        sub: user_id.to_string(),
        aud: TOKEN_AUDIENCE.to_string(),
        exp: iat + expires_in,
        iat,
        email: email.map(str::to_string),
        role: Some(TOKEN_AUDIENCE.to_string()),
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::TokenCreation(e.to_string()))
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[TOKEN_AUDIENCE]);

    match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
        Ok(data) => Ok(data.claims),
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature => Err(AuthError::TokenExpired),
            _ => Err(AuthError::TokenVerification(e.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test_secret_for_testing_only";

    #[test]
    fn test_generate_and_verify_token() {
        let user_id = Uuid::new_v4();
        let token = generate_token(SECRET, user_id, Some("a@minato.test"), 3600)
            .expect("Token generation should succeed");
        assert!(!token.is_empty(), "Token should not be empty");

        let claims = verify_token(SECRET, &token).expect("Token should be valid");
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.email.as_deref(), Some("a@minato.test"));
        assert_eq!(claims.aud, TOKEN_AUDIENCE);
    }

    #[test]
    fn test_verify_invalid_token() {
        match verify_token(SECRET, "invalid.token.here") {
            Err(AuthError::TokenVerification(_)) => (),
            other => panic!("Expected TokenVerification error, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = generate_token("another_secret", Uuid::new_v4(), None, 3600).unwrap();
        assert!(matches!(
            verify_token(SECRET, &token),
            Err(AuthError::TokenVerification(_))
        ));
    }

    #[test]
    fn test_expired_token() {
        let iat = now() - 7200;
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            exp: iat + 60,
            iat,
            email: None,
            role: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(verify_token(SECRET, &token).unwrap_err(), AuthError::TokenExpired);
    }

    #[test]
    fn test_non_uuid_subject() {
        let claims = Claims {
            sub: "service".to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            exp: now() + 60,
            iat: now(),
            email: None,
            role: None,
        };
        assert!(matches!(claims.user_id(), Err(AuthError::InvalidSubject(_))));
    }
}
