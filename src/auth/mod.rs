//! Acting identity for vault operations.
//!
//! Two signing modes:
//! - `Account`: an address the remote node manages; the node signs.
//! - `PrivateKey`: a local key; this process signs and broadcasts the raw
//!   payload, so the node never sees the credential.
//!
//! The mode is decided once, when the operator string is parsed, and carried
//! as a tagged value from then on.

use crate::config::parse_address;
use crate::gateway::{ChainGateway, GatewayError};

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no account given and the node manages none")]
    MissingIdentity,
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("failed to list node accounts: {0}")]
    Gateway(#[from] GatewayError),
}

#[derive(Clone)]
pub enum Identity {
    Account(Address),
    PrivateKey(PrivateKeySigner),
}

impl Identity {
    /// `0x` + 40 hex chars is an account reference; anything else is a key.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let trimmed = raw.trim();
        if looks_like_address(trimmed) {
            let address =
                parse_address("account", trimmed).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
            return Ok(Identity::Account(address));
        }
        let signer = PrivateKeySigner::from_str(trimmed)
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        Ok(Identity::PrivateKey(signer))
    }

    /// Parse the configured identity, or fall back to the node's first account.
    pub async fn resolve<G: ChainGateway>(raw: Option<&str>, gateway: &G) -> Result<Self, AuthError> {
        if let Some(raw) = raw.filter(|s| !s.trim().is_empty()) {
            let identity = Self::parse(raw)?;
            debug!(identity = ?identity, "using configured identity");
            return Ok(identity);
        }

        let accounts = gateway.accounts().await?;
        let first = accounts.first().copied().ok_or(AuthError::MissingIdentity)?;
        info!(account = %first, "no identity configured, using first node account");
        Ok(Identity::Account(first))
    }

    pub fn address(&self) -> Address {
        match self {
            Identity::Account(address) => *address,
            Identity::PrivateKey(signer) => signer.address(),
        }
    }

    pub fn signs_locally(&self) -> bool {
        matches!(self, Identity::PrivateKey(_))
    }
}

// Never print key material.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Account(address) => write!(f, "Account({address})"),
            Identity::PrivateKey(signer) => write!(f, "PrivateKey({})", signer.address()),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address())
    }
}

fn looks_like_address(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}
