use super::error::ApiError;
use super::App;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use models::ErrorCode;
use std::sync::Arc;

/// Claims the identity provider signs into its bearer tokens. No token
/// state is stored here; every request re-verifies signature, expiry, and
/// issuer.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

pub struct AuthVerifier {
    decoding: jsonwebtoken::DecodingKey,
    validation: jsonwebtoken::Validation,
}

impl AuthVerifier {
    /// Shared-secret verification (HS256).
    pub fn hs256(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            decoding: jsonwebtoken::DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Public-key verification (RS256 PEM) for external identity providers.
    pub fn rs256_pem(pem: &[u8], issuer: Option<&str>) -> anyhow::Result<Self> {
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        Ok(Self {
            decoding: jsonwebtoken::DecodingKey::from_rsa_pem(pem)?,
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, "token verification failed");
                ApiError::new(ErrorCode::Authentication, "invalid or expired token")
            })
    }
}

/// Extractor for routes that require a verified bearer token.
pub struct Authenticated(pub Claims);

impl FromRequestParts<Arc<App>> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<App>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ApiError::new(ErrorCode::Authentication, "missing authorization header")
            })?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::new(ErrorCode::Authentication, "authorization must be a bearer token")
        })?;

        state.auth.verify(token).map(Authenticated)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn token(secret: &str, issuer: &str, exp_offset: i64) -> String {
        let claims = serde_json::json!({
            "sub": "user-1",
            "role": "admin",
            "iss": issuer,
            "exp": chrono::Utc::now().timestamp() + exp_offset,
        });
        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_tokens_yield_claims() {
        let verifier = AuthVerifier::hs256("test-secret", Some("docket-idp"));
        let claims = verifier
            .verify(&token("test-secret", "docket-idp", 600))
            .unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role.as_deref(), Some("admin"));
    }

    #[test]
    fn wrong_secret_expired_or_wrong_issuer_are_rejected() {
        let verifier = AuthVerifier::hs256("test-secret", Some("docket-idp"));
        assert!(verifier
            .verify(&token("other-secret", "docket-idp", 600))
            .is_err());
        assert!(verifier
            .verify(&token("test-secret", "docket-idp", -600))
            .is_err());
        assert!(verifier
            .verify(&token("test-secret", "someone-else", 600))
            .is_err());
    }
}
