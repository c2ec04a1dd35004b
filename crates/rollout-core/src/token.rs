//! Approval token issuance and validation.
//!
//! A token is an ed25519 signature over the canonical message
//! `(plan_id, created_by, issued_at, expires_at)`, hex-encoded. Validation
//! re-derives the message and verifies the signature, so a token only ever
//! validates for the exact `(plan_id, created_by)` pair it was issued for,
//! and the comparison is constant-time with respect to the token value.
//!
//! Tokens are single-purpose: once a plan moves into `executing` the
//! lifecycle manager never consults the token again, so a replayed token
//! cannot trigger a second execution.

use crate::error::TokenError;
use crate::model::PlanId;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Default token validity window: 15 minutes
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Token issuance configuration
#[derive(Debug, Clone, Copy)]
pub struct TokenConfig {
    /// Validity window from issuance to expiry
    pub ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
        }
    }
}

/// A freshly issued approval token with its validity window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Opaque high-entropy credential; never log in full
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates approval tokens.
///
/// Holds the signing key for the lifetime of the process; tokens from a
/// previous process cannot validate, which is acceptable for an in-memory
/// plan store whose plans share the same fate.
pub struct TokenIssuer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    config: TokenConfig,
}

impl TokenIssuer {
    /// Create an issuer with a fresh random key and the default TTL
    pub fn generate() -> Self {
        Self::with_config(TokenConfig::default())
    }

    /// Create an issuer with a fresh random key and a custom configuration
    pub fn with_config(config: TokenConfig) -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            config,
        }
    }

    /// Issue a token bound to `(plan_id, created_by)`
    pub fn issue(&self, plan_id: PlanId, created_by: &str) -> IssuedToken {
        let issued_at = Utc::now();
        let expires_at = issued_at + self.config.ttl;

        let message = token_message(
            plan_id,
            created_by,
            issued_at.timestamp(),
            expires_at.timestamp(),
        );
        let signature: Signature = self.signing_key.sign(&message);

        IssuedToken {
            token: hex::encode(signature.to_bytes()),
            issued_at,
            expires_at,
        }
    }

    /// Validate a supplied token against the pair and window it claims.
    ///
    /// Signature verification is checked before expiry so a forged token is
    /// always reported as a mismatch, never as merely expired.
    pub fn validate(
        &self,
        plan_id: PlanId,
        created_by: &str,
        supplied: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), TokenError> {
        let raw = hex::decode(supplied).map_err(|_| TokenError::Mismatch)?;
        let signature = Signature::from_slice(&raw).map_err(|_| TokenError::Mismatch)?;

        let message = token_message(
            plan_id,
            created_by,
            issued_at.timestamp(),
            expires_at.timestamp(),
        );
        self.verifying_key
            .verify(&message, &signature)
            .map_err(|_| TokenError::Mismatch)?;

        if now >= expires_at {
            return Err(TokenError::Expired);
        }
        Ok(())
    }

    /// Configured validity window
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never expose key material
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.config.ttl)
            .finish_non_exhaustive()
    }
}

fn token_message(
    plan_id: PlanId,
    created_by: &str,
    issued_at: i64,
    expires_at: i64,
) -> Vec<u8> {
    let mut msg = Vec::with_capacity(16 + created_by.len() + 8 + 8 + 2);
    msg.extend_from_slice(plan_id.0.as_bytes());
    msg.extend_from_slice(created_by.as_bytes());
    msg.push(0);
    msg.extend_from_slice(&issued_at.to_le_bytes());
    msg.extend_from_slice(&expires_at.to_le_bytes());
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates_for_its_pair() {
        let issuer = TokenIssuer::generate();
        let plan_id = PlanId::new();

        let issued = issuer.issue(plan_id, "alice");
        let result = issuer.validate(
            plan_id,
            "alice",
            &issued.token,
            issued.issued_at,
            issued.expires_at,
            Utc::now(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn token_rejected_for_wrong_plan() {
        let issuer = TokenIssuer::generate();
        let issued = issuer.issue(PlanId::new(), "alice");

        let result = issuer.validate(
            PlanId::new(),
            "alice",
            &issued.token,
            issued.issued_at,
            issued.expires_at,
            Utc::now(),
        );
        assert_eq!(result, Err(TokenError::Mismatch));
    }

    #[test]
    fn token_rejected_for_wrong_creator() {
        let issuer = TokenIssuer::generate();
        let plan_id = PlanId::new();
        let issued = issuer.issue(plan_id, "alice");

        let result = issuer.validate(
            plan_id,
            "bob",
            &issued.token,
            issued.issued_at,
            issued.expires_at,
            Utc::now(),
        );
        assert_eq!(result, Err(TokenError::Mismatch));
    }

    #[test]
    fn expired_token_rejected() {
        let issuer = TokenIssuer::generate();
        let plan_id = PlanId::new();
        let issued = issuer.issue(plan_id, "alice");

        let after_expiry = issued.expires_at + Duration::seconds(1);
        let result = issuer.validate(
            plan_id,
            "alice",
            &issued.token,
            issued.issued_at,
            issued.expires_at,
            after_expiry,
        );
        assert_eq!(result, Err(TokenError::Expired));
    }

    #[test]
    fn garbage_token_is_a_mismatch() {
        let issuer = TokenIssuer::generate();
        let plan_id = PlanId::new();
        let issued = issuer.issue(plan_id, "alice");

        let wrong_but_well_formed = "0".repeat(128);
        for garbage in ["", "zz", "00ff", wrong_but_well_formed.as_str()] {
            let result = issuer.validate(
                plan_id,
                "alice",
                garbage,
                issued.issued_at,
                issued.expires_at,
                Utc::now(),
            );
            assert_eq!(result, Err(TokenError::Mismatch), "token: {garbage:?}");
        }
    }

    #[test]
    fn custom_ttl_respected() {
        let issuer = TokenIssuer::with_config(TokenConfig {
            ttl: Duration::seconds(60),
        });
        let issued = issuer.issue(PlanId::new(), "alice");
        assert_eq!(issued.expires_at - issued.issued_at, Duration::seconds(60));
    }
}
