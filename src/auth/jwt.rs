//! HMAC-SHA256 access/refresh token issuance and verification.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use super::{AuthError, Claims, Role, TokenPair};

#[derive(Clone)]
pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: i64,
    refresh_ttl: i64,
}

impl JwtCodec {
    pub fn new(secret: &str, token_ttl: i64, refresh_ttl: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl,
            refresh_ttl,
        }
    }

    fn issue(&self, subject: &str, username: &str, role: Role, ttl: i64) -> Result<String, AuthError> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            username: username.to_string(),
            role: role.as_str().to_string(),
            issued_at: now,
            expires_at: now + ttl,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AuthError::Sign(e.to_string()))
    }

    pub fn issue_pair(&self, subject: &str, username: &str, role: Role) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue(subject, username, role, self.token_ttl)?,
            refresh_token: self.issue(subject, username, role, self.refresh_ttl)?,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        // `expires_at`/`issued_at` are custom field names, not the registered
        // `exp`/`iat` claims, so jsonwebtoken's built-in expiry check does
        // not apply here; it is enforced by hand below.
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature
                | jsonwebtoken::errors::ErrorKind::InvalidToken => AuthError::TokenInvalid,
                _ => AuthError::TokenInvalid,
            }
        })?;

        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        if data.claims.expires_at <= now {
            return Err(AuthError::TokenExpired);
        }
        Ok(data.claims)
    }
}
