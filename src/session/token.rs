use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Lifetime of an issued cookie token; matches the cookie max-age.
pub const TOKEN_LIFETIME_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sid: String, // session token
    pub iat: i64,
    pub exp: i64,
}

/// HS256 codec for the cookie value.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn encode(&self, session_token: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sid: session_token.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_token_decodes_to_the_same_session() {
        let codec = TokenCodec::new("secret");
        let token = codec.encode("abc123").unwrap();
        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.sid, "abc123");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = TokenCodec::new("one").encode("abc123").unwrap();
        assert!(TokenCodec::new("two").decode(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let codec = TokenCodec::new("secret");
        let claims = Claims {
            sid: "abc123".into(),
            iat: Utc::now().timestamp() - 7200,
            exp: Utc::now().timestamp() - 3600,
        };
        let token = encode(&Header::default(), &claims, &codec.encoding).unwrap();
        assert!(codec.decode(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(TokenCodec::new("secret").decode("not-a-token").is_err());
    }
}
