use std::fmt;

/// Cookie set by the Supabase helpers when the session is stored flat.
pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";
/// Supabase access tokens are issued for this audience.
pub const TOKEN_AUDIENCE: &str = "authenticated";

#[derive(Debug, PartialEq)]
pub enum AuthError {
    MissingToken,
    TokenCreation(String),
    TokenVerification(String),
    TokenExpired,
    InvalidSubject(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Authentication required"),
            AuthError::TokenCreation(e) => write!(f, "Failed to create token: {}", e),
            AuthError::TokenVerification(e) => write!(f, "Failed to verify token: {}", e),
            AuthError::TokenExpired => write!(f, "Session expired"),
            AuthError::InvalidSubject(sub) => write!(f, "Invalid token subject: {}", sub),
        }
    }
}

impl std::error::Error for AuthError {}
