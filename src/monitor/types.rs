//! Events delivered by the monitor.

use crate::amount::format_units;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{B256, U256};
use alloy::rpc::types::Log;
use std::fmt;

/// Integers above this are also shown scaled by 10^18.
const SCALE_DISPLAY_THRESHOLD: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub kind: String,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    /// Field name to value, in declaration order.
    pub fields: Vec<(String, DynSolValue)>,
}

impl DecodedEvent {
    pub fn field(&self, name: &str) -> Option<&DynSolValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// A log that did not match its schema, delivered with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: String,
    pub log: Log,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Decoded(DecodedEvent),
    Raw(RawEvent),
}

impl MonitorEvent {
    pub fn kind(&self) -> &str {
        match self {
            MonitorEvent::Decoded(e) => &e.kind,
            MonitorEvent::Raw(e) => &e.kind,
        }
    }

    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            MonitorEvent::Decoded(e) => e.tx_hash,
            MonitorEvent::Raw(e) => e.log.transaction_hash,
        }
    }

    pub fn block_number(&self) -> Option<u64> {
        match self {
            MonitorEvent::Decoded(e) => e.block_number,
            MonitorEvent::Raw(e) => e.log.block_number,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, MonitorEvent::Raw(_))
    }
}

fn opt<T: fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "pending".to_string())
}

impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} ---", self.kind)?;
        writeln!(f, "  tx:    {}", opt(self.tx_hash))?;
        writeln!(f, "  block: {}", opt(self.block_number))?;
        for (name, value) in &self.fields {
            writeln!(f, "  {name}: {}", render_value(name, value))?;
        }
        Ok(())
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} (undecoded) ---", self.kind)?;
        writeln!(f, "  tx:     {}", opt(self.log.transaction_hash))?;
        writeln!(f, "  block:  {}", opt(self.log.block_number))?;
        for (i, topic) in self.log.topics().iter().enumerate() {
            writeln!(f, "  topic{i}: {topic}")?;
        }
        writeln!(f, "  data:   {}", self.log.data().data)?;
        writeln!(f, "  error:  {}", self.error)
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorEvent::Decoded(e) => e.fmt(f),
            MonitorEvent::Raw(e) => e.fmt(f),
        }
    }
}

/// `signalType` reads as BUY (0) / SELL; large integers also get an
/// 18-decimal rendering.
fn render_value(name: &str, value: &DynSolValue) -> String {
    match value {
        DynSolValue::Uint(v, _) if name == "signalType" => {
            let label = if v.is_zero() { "BUY" } else { "SELL" };
            format!("{label} ({v})")
        }
        DynSolValue::Uint(v, _) if *v > U256::from(SCALE_DISPLAY_THRESHOLD) => {
            format!("{} (raw: {v})", format_units(*v, 18))
        }
        DynSolValue::Uint(v, _) => v.to_string(),
        DynSolValue::Int(v, _) => v.to_string(),
        DynSolValue::Address(a) => a.to_string(),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::FixedBytes(w, size) => format!("0x{}", alloy::hex::encode(&w[..*size])),
        DynSolValue::Bytes(b) => format!("0x{}", alloy::hex::encode(b)),
        DynSolValue::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn signal(signal_type: u8) -> DecodedEvent {
        DecodedEvent {
            kind: "SignalReceived".to_string(),
            tx_hash: Some(B256::repeat_byte(0xab)),
            block_number: Some(7),
            log_index: Some(0),
            fields: vec![
                (
                    "signalType".to_string(),
                    DynSolValue::Uint(U256::from(signal_type), 8),
                ),
                (
                    "token".to_string(),
                    DynSolValue::Address(address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512")),
                ),
                (
                    "amount".to_string(),
                    DynSolValue::Uint(U256::from(2_500_000_000_000_000_000u128), 256),
                ),
            ],
        }
    }

    #[test]
    fn test_signal_type_labels() {
        assert!(signal(0).to_string().contains("signalType: BUY (0)"));
        assert!(signal(1).to_string().contains("signalType: SELL (1)"));
    }

    #[test]
    fn test_large_integers_scaled() {
        let rendered = signal(0).to_string();
        assert!(rendered.contains("amount: 2.5 (raw: 2500000000000000000)"));
        assert!(rendered.contains("block: 7"));
    }

    #[test]
    fn test_small_integers_verbatim() {
        assert_eq!(
            render_value("count", &DynSolValue::Uint(U256::from(42u64), 256)),
            "42"
        );
    }

    #[test]
    fn test_field_lookup() {
        let event = signal(1);
        assert_eq!(
            event.field("signalType"),
            Some(&DynSolValue::Uint(U256::from(1u64), 8))
        );
        assert!(event.field("missing").is_none());
    }
}
