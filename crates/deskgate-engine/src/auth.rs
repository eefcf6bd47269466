//! Credential verification and session-token minting.
//!
//! Each identity carries its own shared secret (no single global bearer
//! token). Secret comparison is constant-time, and an unknown identity is
//! indistinguishable from a wrong secret.

use std::collections::HashMap;

use deskgate_types::{Identity, SessionToken};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::warn;

use crate::config::IdentityConfig;
use crate::error::EngineError;

/// Verifies credentials and mints session tokens.
pub struct CredentialRegistry {
    secrets: HashMap<String, Vec<u8>>,
    rng: SystemRandom,
    /// Compared against when the identity is unknown, to keep timing flat.
    decoy: Vec<u8>,
}

impl CredentialRegistry {
    /// Build a registry from configured identities.
    #[must_use]
    pub fn new(identities: &[IdentityConfig]) -> Self {
        let secrets = identities
            .iter()
            .map(|i| (i.name.clone(), i.secret.as_bytes().to_vec()))
            .collect();
        Self {
            secrets,
            rng: SystemRandom::new(),
            decoy: vec![0u8; 32],
        }
    }

    /// Verify an identity's secret.
    pub fn verify(&self, identity: &Identity, secret: &str) -> Result<(), EngineError> {
        let stored = self.secrets.get(identity.as_str()).unwrap_or(&self.decoy);
        let presented = secret.as_bytes();
        // Length-equal compare first keeps verify_slices_are_equal applicable;
        // a length mismatch is already public information.
        let matches = stored.len() == presented.len()
            && ring::constant_time::verify_slices_are_equal(stored, presented).is_ok();
        if matches && self.secrets.contains_key(identity.as_str()) {
            Ok(())
        } else {
            warn!(identity = %identity, "authentication failed");
            Err(EngineError::Authentication)
        }
    }

    /// Mint a fresh 256-bit session token.
    pub fn mint_token(&self) -> Result<SessionToken, EngineError> {
        let mut bytes = [0u8; 32];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| EngineError::Other(anyhow::anyhow!("system RNG unavailable")))?;
        Ok(SessionToken::from_bytes(bytes))
    }
}
