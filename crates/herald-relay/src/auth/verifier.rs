//! Command token verification.
//!
//! The relay treats verification as an opaque capability: anything that turns
//! a token string into an [`Identity`] can guard membership commands. The
//! bundled implementation checks JWS-signed JWTs against a configured key.

use std::fs;
use std::str::FromStr;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use herald_core::error::{HeraldError, Result};

use crate::config::AuthSection;

/// Verified claims from a command token. Lives for one command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Identity {
    claims: Map<String, Value>,
}

impl Identity {
    pub fn from_claims(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// The `sub` claim, when it is a string.
    pub fn subject(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }
}

/// Turns a token into a verified identity.
pub trait TokenVerifier: Send + Sync {
    /// Fails with `HeraldError::InvalidToken` for malformed, expired, or
    /// badly signed tokens.
    fn verify(&self, token: &str) -> Result<Identity>;
}

/// JWT verifier bound to one algorithm and public key (or HMAC secret).
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// `exp` is enforced when present but not required; audience is not
    /// checked unless configured.
    pub fn new(algorithm: Algorithm, key: DecodingKey) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims::<&str>(&[]);
        validation.validate_aud = false;
        Self { key, validation }
    }

    /// Build from a PEM-encoded public key, choosing the key family from the
    /// algorithm.
    pub fn from_public_pem(algorithm: Algorithm, pem: &[u8]) -> Result<Self> {
        let key = match algorithm {
            Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                return Err(HeraldError::Config(
                    "HS* algorithms take a secret, not a public key".into(),
                ))
            }
        }
        .map_err(|e| HeraldError::Config(format!("invalid public key: {e}")))?;
        Ok(Self::new(algorithm, key))
    }

    pub fn from_secret(algorithm: Algorithm, secret: &[u8]) -> Self {
        Self::new(algorithm, DecodingKey::from_secret(secret))
    }

    pub fn from_config(cfg: &AuthSection) -> Result<Self> {
        let algorithm = Algorithm::from_str(&cfg.algorithm).map_err(|_| {
            HeraldError::Config(format!("unknown auth.algorithm: {}", cfg.algorithm))
        })?;

        let mut verifier = if let Some(secret) = &cfg.secret {
            Self::from_secret(algorithm, secret.as_bytes())
        } else if let Some(pem) = &cfg.public_key_pem {
            Self::from_public_pem(algorithm, pem.as_bytes())?
        } else if let Some(path) = &cfg.public_key_file {
            let pem = fs::read(path)
                .map_err(|e| HeraldError::Config(format!("read {path} failed: {e}")))?;
            Self::from_public_pem(algorithm, &pem)?
        } else {
            return Err(HeraldError::Config("auth has no key source".into()));
        };

        verifier.validation.leeway = cfg.leeway_secs;
        if let Some(aud) = &cfg.audience {
            verifier = verifier.with_audience(aud);
        }
        if let Some(iss) = &cfg.issuer {
            verifier = verifier.with_issuer(iss);
        }
        Ok(verifier)
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity> {
        let data = decode::<Map<String, Value>>(token, &self.key, &self.validation)
            .map_err(|e| HeraldError::InvalidToken(e.to_string()))?;
        Ok(Identity::from_claims(data.claims))
    }
}
