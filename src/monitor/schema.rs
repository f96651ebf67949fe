//! Event schemas: which vault events exist and how to decode their logs.

use crate::vault::abi::VAULT_EVENTS;

use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::json_abi::{Event, JsonAbi};
use alloy::primitives::B256;
use alloy::rpc::types::Log;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("failed to read ABI file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid ABI JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid event signature {signature:?}: {reason}")]
    Signature { signature: String, reason: String },
    #[error("event {0:?} is not declared by the vault interface")]
    UnknownEvent(String),
    #[error("the vault interface declares no events")]
    NoEvents,
}

/// One event declared by the vault: name, ordered typed fields, topic0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventKind {
    event: Event,
    topic: B256,
}

impl EventKind {
    /// Parse a human-readable signature such as
    /// `event Deposit(address indexed sender, uint256 assets)`.
    pub fn parse(signature: &str) -> Result<Self, SchemaError> {
        let event = Event::parse(signature).map_err(|e| SchemaError::Signature {
            signature: signature.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_event(event))
    }

    pub fn from_event(event: Event) -> Self {
        let topic = event.selector();
        Self { event, topic }
    }

    pub fn name(&self) -> &str {
        &self.event.name
    }

    pub fn topic(&self) -> B256 {
        self.topic
    }

    /// `(name, solidity type, indexed)` in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str, bool)> {
        self.event
            .inputs
            .iter()
            .map(|p| (p.name.as_str(), p.ty.as_str(), p.indexed))
    }

    /// Decode a log into `(field name, value)` pairs in declaration order.
    /// Indexed fields come from the topics, the rest from the data.
    pub fn decode(&self, log: &Log) -> Result<Vec<(String, DynSolValue)>, String> {
        let decoded = self.event.decode_log(log.data()).map_err(|e| e.to_string())?;

        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        self.event
            .inputs
            .iter()
            .enumerate()
            .map(|(i, param)| {
                let value = if param.indexed {
                    indexed.next()
                } else {
                    body.next()
                };
                let name = if param.name.is_empty() {
                    format!("arg{i}")
                } else {
                    param.name.clone()
                };
                value
                    .map(|v| (name, v))
                    .ok_or_else(|| format!("missing value for field {}", param.name))
            })
            .collect()
    }
}

/// The vault's built-in event set, in declaration order.
pub fn builtin_vault_events() -> Result<Vec<EventKind>, SchemaError> {
    VAULT_EVENTS.iter().map(|sig| EventKind::parse(sig)).collect()
}

/// Events declared in an ABI file: a hardhat artifact (`{"abi": [...]}`) or
/// a bare ABI array.
pub fn load_abi_events(path: &Path) -> Result<Vec<EventKind>, SchemaError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let json_err = |source| SchemaError::Json {
        path: path.to_path_buf(),
        source,
    };

    let mut value: serde_json::Value = serde_json::from_str(&contents).map_err(json_err)?;
    if let Some(abi) = value.get_mut("abi") {
        value = abi.take();
    }
    let abi: JsonAbi = serde_json::from_value(value).map_err(json_err)?;

    let kinds: Vec<EventKind> = abi
        .events()
        .filter(|e| !e.anonymous)
        .cloned()
        .map(EventKind::from_event)
        .collect();
    if kinds.is_empty() {
        return Err(SchemaError::NoEvents);
    }
    Ok(kinds)
}

/// Narrow `kinds` to `names` (case-sensitive, as declared). Empty `names`
/// keeps everything.
pub fn select(kinds: Vec<EventKind>, names: &[String]) -> Result<Vec<EventKind>, SchemaError> {
    if names.is_empty() {
        return Ok(kinds);
    }
    names
        .iter()
        .map(|name| {
            kinds
                .iter()
                .find(|k| k.name() == name)
                .cloned()
                .ok_or_else(|| SchemaError::UnknownEvent(name.clone()))
        })
        .collect()
}
