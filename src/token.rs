//! Manage session tokens.
//!
//! Tokens are HS256 JSON web tokens. They are stateless: nothing is stored
//! server-side and they expire purely by elapsed time.

use std::sync::Arc;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::identity::{Identity, IdentityId};

const MIN_SECRET_LENGTH: usize = 32;

type Result<T> = std::result::Result<T, TokenError>;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Bad signature, malformed payload or expired token.
    #[error("invalid token")]
    InvalidToken,
    #[error("signing secret must be at least {MIN_SECRET_LENGTH} bytes")]
    WeakSecret,
    #[error("token expiry overflows")]
    Lifetime,
    #[error("cannot sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Pieces of information asserted on a token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the token is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the token must not
    /// be accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the token was issued.
    pub iat: u64,
    /// Identifies the instance that issued the token.
    pub iss: String,
    /// Identity ID.
    pub sub: String,
}

/// Issue and verify session tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    lifetime: u64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a new [`TokenManager`] signing with `secret`.
    ///
    /// `issuer` also serves as audience until [`TokenManager::audience`] is
    /// called.
    pub fn new(
        secret: &[u8],
        issuer: &str,
        lifetime: u64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(TokenError::WeakSecret);
        }

        Ok(Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.to_owned(),
            audience: issuer.to_owned(),
            lifetime,
            clock,
        })
    }

    /// Set `audience` field on tokens.
    pub fn audience(&mut self, audience: &str) {
        self.audience = audience.to_owned();
    }

    /// Seconds a token stays valid.
    pub fn lifetime(&self) -> u64 {
        self.lifetime
    }

    /// Create a signed token for `identity`.
    pub fn issue(&self, identity: &Identity) -> Result<String> {
        let now = self.clock.now();
        let exp = now.checked_add(self.lifetime).ok_or(TokenError::Lifetime)?;
        let claims = Claims {
            aud: self.audience.clone(),
            exp,
            iat: now,
            iss: self.issuer.clone(),
            sub: identity.id.to_string(),
        };

        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?)
    }

    /// Check signature and expiry, returning the claims.
    ///
    /// Account state is not consulted here.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        // Expiry is checked against our own clock, without leeway.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iat", "sub", "aud", "iss"]);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| TokenError::InvalidToken)?
            .claims;

        if self.clock.now() >= claims.exp {
            return Err(TokenError::InvalidToken);
        }

        Ok(claims)
    }

    /// Verify a token and extract the identity it is bound to.
    pub fn verify(&self, token: &str) -> Result<IdentityId> {
        let claims = self.decode(token)?;
        IdentityId::parse(&claims.sub).ok_or(TokenError::InvalidToken)
    }
}
