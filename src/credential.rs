//! Password hashing
//!
//! `PasswordHasher` is a plain value carried in the application state.
//! Stored credentials that are not bcrypt hashes are legacy plaintext; they
//! are accepted once and handed back upgraded for the caller to persist.

use crate::error::{AppError, AppResult};

#[derive(Clone, Copy, Debug)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Outcome of a login credential check
#[derive(Debug, PartialEq, Eq)]
pub struct Verification {
    pub ok: bool,
    /// Replacement hash to store when the stored credential was legacy
    pub upgraded: Option<String>,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, plain: &str) -> AppResult<String> {
        bcrypt::hash(plain, self.cost)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    }

    fn is_hashed(stored: &str) -> bool {
        stored.starts_with("$2")
    }

    pub fn verify_and_maybe_upgrade(&self, stored: &str, attempt: &str) -> AppResult<Verification> {
        if Self::is_hashed(stored) {
            // a malformed hash simply fails to verify
            let ok = bcrypt::verify(attempt, stored).unwrap_or(false);
            return Ok(Verification { ok, upgraded: None });
        }

        if stored.is_empty() || stored != attempt {
            return Ok(Verification {
                ok: false,
                upgraded: None,
            });
        }

        tracing::info!("Upgrading legacy plaintext credential");
        Ok(Verification {
            ok: true,
            upgraded: Some(self.hash(attempt)?),
        })
    }
}
