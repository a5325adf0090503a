mod extract;
mod jwt;
mod types;

pub use extract::{token_from_headers, AuthUser};
#[cfg(test)]
pub use jwt::generate_token;
pub use jwt::{verify_token, Claims};
pub use types::*;
