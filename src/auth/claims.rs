use serde::{Deserialize, Serialize};

/// Identity-provider token payload. Read only; this service never issues tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,          // opaque user ID
    pub name: Option<String>, // display name
    pub iat: usize,           // issued at (unix timestamp)
    pub exp: usize,           // expires at (unix timestamp)
    pub iss: String,          // issuer
    pub aud: String,          // audience
}
