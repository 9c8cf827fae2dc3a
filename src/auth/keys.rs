use axum::extract::FromRef;
use jsonwebtoken::{decode, DecodingKey, Validation};
use tracing::debug;

use super::claims::Claims;
use crate::{config::IdentityConfig, state::AppState};

/// Verification half of the identity provider's signing setup.
#[derive(Clone)]
pub struct IdentityKeys {
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
}

impl IdentityKeys {
    pub fn from_config(cfg: &IdentityConfig) -> Self {
        Self {
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        if data.claims.sub.trim().is_empty() {
            anyhow::bail!("token has an empty subject");
        }
        debug!(user_id = %data.claims.sub, "identity token verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for IdentityKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.identity)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use time::OffsetDateTime;

    pub(crate) fn sign(cfg: &IdentityConfig, sub: &str, name: Option<&str>) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = Claims {
            sub: sub.into(),
            name: name.map(str::to_string),
            iat: now,
            exp: now + 300,
            iss: cfg.issuer.clone(),
            aud: cfg.audience.clone(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(cfg.secret.as_bytes()),
        )
        .expect("sign test token")
    }

    fn identity(issuer: &str, audience: &str) -> IdentityConfig {
        IdentityConfig {
            secret: "same-secret".into(),
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    #[test]
    fn verify_accepts_matching_token() {
        let cfg = identity("test-issuer", "test-aud");
        let token = sign(&cfg, "idp-uid-1", Some("Ada"));
        let claims = IdentityKeys::from_config(&cfg).verify(&token).expect("verify token");
        assert_eq!(claims.sub, "idp-uid-1");
        assert_eq!(claims.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let token = sign(&identity("good-iss", "good-aud"), "uid", None);
        let err = IdentityKeys::from_config(&identity("bad-iss", "bad-aud"))
            .verify(&token)
            .unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn verify_rejects_empty_subject() {
        let cfg = identity("iss", "aud");
        let token = sign(&cfg, " ", None);
        let err = IdentityKeys::from_config(&cfg).verify(&token).unwrap_err();
        assert!(err.to_string().contains("empty subject"));
    }
}
